//! Render the committed strokes of a room stored on disk to a PNG file.

use clap::Parser;
use inkshare_core::{CommittedHistory, FileStrokeLog, FrameInput, RemoteCursors, RoomId, StrokeLog};
use inkshare_render::{FrameStyle, RasterSurface, compose_frame};
use kurbo::Size;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "inkshare-snapshot", about = "Render a stored InkShare room to PNG")]
struct Args {
    /// Directory holding the room logs
    #[arg(env = "INKSHARE_DATA_DIR")]
    data_dir: PathBuf,

    /// Room to render
    room: String,

    /// Output PNG path
    output: PathBuf,

    #[arg(long, default_value_t = 1280, value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    #[arg(long, default_value_t = 720, value_parser = clap::value_parser!(u32).range(1..))]
    height: u32,
}

fn run(args: Args) -> Result<(), String> {
    let log = FileStrokeLog::new(args.data_dir).map_err(|e| e.to_string())?;
    let room = RoomId::new(args.room);
    let strokes = pollster::block_on(log.load_all(&room)).map_err(|e| e.to_string())?;
    log::info!("Loaded {} strokes of room {}", strokes.len(), room);

    let history = CommittedHistory::from_strokes(strokes);
    let cursors = RemoteCursors::default();
    let input = FrameInput {
        history: &history,
        local: None,
        cursors: &cursors,
    };
    let size = Size::new(args.width as f64, args.height as f64);
    let frame = compose_frame(&input, size, &FrameStyle::default());

    let mut surface = RasterSurface::new(args.width, args.height).map_err(|e| e.to_string())?;
    frame.replay(&mut surface);
    let png = surface.encode_png().map_err(|e| e.to_string())?;
    std::fs::write(&args.output, png).map_err(|e| format!("Failed to write {}: {}", args.output.display(), e))?;
    log::info!("Wrote {}", args.output.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
