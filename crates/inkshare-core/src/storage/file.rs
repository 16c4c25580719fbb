//! File-based stroke log.

use super::{BoxFuture, StorageError, StorageResult, StrokeLog};
use crate::model::{CommitOrder, NewStroke, RoomId, Stroke, StrokeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One line of a room file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogRecord {
    Insert { stroke: Stroke },
    /// Everything before this record was deleted. Keeps the order high-water mark.
    Clear { high_water: CommitOrder },
}

/// Replayed state of a room file.
#[derive(Debug, Default)]
struct Replay {
    strokes: Vec<Stroke>,
    high_water: CommitOrder,
    /// The last line was cut short and must be dropped before appending.
    torn_tail: bool,
}

/// Append bookkeeping for a room, built lazily from its file.
#[derive(Debug, Default)]
struct RoomIndex {
    high_water: CommitOrder,
    ids: HashSet<StrokeId>,
}

/// Stroke log storing one JSON-lines file per room.
///
/// Appends add an `insert` line. A clear rewrites the file to a single
/// `clear` line so the file does not grow without bound.
pub struct FileStrokeLog {
    /// Base directory for room files.
    base_path: PathBuf,
    /// Serializes writers and caches per-room append state.
    index: Mutex<HashMap<RoomId, RoomIndex>>,
}

/// File name for a room id, distinct for distinct ids.
///
/// ASCII letters, digits and `-` are kept. Every other byte, `_` included,
/// becomes `_` followed by two lowercase hex digits.
fn file_stem(room: &RoomId) -> String {
    let id = room.as_str();
    if id.is_empty() {
        return "_".to_string();
    }
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{:02x}", byte));
        }
    }
    stem
}

impl FileStrokeLog {
    /// Create a log in the given directory, creating it if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self {
            base_path,
            index: Mutex::new(HashMap::new()),
        })
    }

    /// Create a log in the default location.
    ///
    /// On Unix: `~/.local/share/inkshare/rooms/`
    /// On Windows: `%LOCALAPPDATA%\inkshare\rooms\`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;

        Self::new(base.join("inkshare").join("rooms"))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a room.
    fn room_path(&self, room: &RoomId) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", file_stem(room)))
    }

    fn replay(path: &Path) -> StorageResult<Replay> {
        let mut replay = Replay::default();
        if !path.exists() {
            return Ok(replay);
        }

        let text = fs::read_to_string(path)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();

        for (number, line) in lines.iter().enumerate() {
            let record = match serde_json::from_str::<LogRecord>(line) {
                Ok(record) => record,
                // A torn final line is what an interrupted append leaves behind.
                Err(e) if number + 1 == lines.len() => {
                    log::warn!("Ignoring truncated record at end of {}: {}", path.display(), e);
                    replay.torn_tail = true;
                    break;
                }
                Err(e) => {
                    return Err(StorageError::Serialization(format!(
                        "Failed to parse {} line {}: {}",
                        path.display(),
                        number + 1,
                        e
                    )));
                }
            };

            match record {
                LogRecord::Insert { stroke } => {
                    replay.high_water = replay.high_water.max(stroke.commit_order);
                    replay.strokes.push(stroke);
                }
                LogRecord::Clear { high_water } => {
                    replay.high_water = replay.high_water.max(high_water);
                    replay.strokes.clear();
                }
            }
        }

        replay.strokes.sort_by_key(|stroke| stroke.commit_order);
        Ok(replay)
    }

    fn write_line(path: &Path, record: &LogRecord) -> StorageResult<()> {
        let mut line = serde_json::to_string(record).map_err(|e| StorageError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StorageError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))
    }

    /// Atomically replace the file with a compacted copy of `replay`.
    fn rewrite(path: &Path, replay: &Replay) -> StorageResult<()> {
        let mut records = vec![LogRecord::Clear {
            high_water: replay.high_water,
        }];
        records.extend(replay.strokes.iter().cloned().map(|stroke| LogRecord::Insert { stroke }));

        let mut text = String::new();
        for record in &records {
            text.push_str(&serde_json::to_string(record).map_err(|e| StorageError::Serialization(e.to_string()))?);
            text.push('\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        fs::write(&tmp, text)
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .map_err(|e| StorageError::Io(format!("Failed to replace {}: {}", path.display(), e)))
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<RoomId, RoomIndex>>> {
        self.index
            .lock()
            .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))
    }
}

impl StrokeLog for FileStrokeLog {
    fn load_all(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        let path = self.room_path(room);
        Box::pin(async move {
            let _guard = self.lock()?;
            Ok(Self::replay(&path)?.strokes)
        })
    }

    fn append(&self, room: &RoomId, stroke: NewStroke) -> BoxFuture<'_, StorageResult<Stroke>> {
        let room = room.clone();
        let path = self.room_path(&room);
        Box::pin(async move {
            stroke.validate().map_err(StorageError::Rejected)?;

            let mut index = self.lock()?;
            if !index.contains_key(&room) {
                let replay = Self::replay(&path)?;
                if replay.torn_tail {
                    Self::rewrite(&path, &replay)?;
                }
                index.insert(
                    room.clone(),
                    RoomIndex {
                        high_water: replay.high_water,
                        ids: replay.strokes.iter().map(|s| s.id).collect(),
                    },
                );
            }
            let Some(entry) = index.get_mut(&room) else {
                return Err(StorageError::Other("room index missing".to_string()));
            };

            if entry.ids.contains(&stroke.id) {
                return Self::replay(&path)?
                    .strokes
                    .into_iter()
                    .find(|s| s.id == stroke.id)
                    .ok_or_else(|| StorageError::NotFound(stroke.id.to_string()));
            }

            let committed = stroke.commit(entry.high_water.next());
            Self::write_line(&path, &LogRecord::Insert { stroke: committed.clone() })?;
            entry.high_water = committed.commit_order;
            entry.ids.insert(committed.id);
            Ok(committed)
        })
    }

    fn clear_room(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<()>> {
        let room = room.clone();
        let path = self.room_path(&room);
        Box::pin(async move {
            let mut index = self.lock()?;
            let high_water = match index.get(&room) {
                Some(entry) => entry.high_water,
                None => Self::replay(&path)?.high_water,
            };

            Self::rewrite(
                &path,
                &Replay {
                    high_water,
                    ..Replay::default()
                },
            )?;

            index.insert(
                room,
                RoomIndex {
                    high_water,
                    ids: HashSet::new(),
                },
            );
            Ok(())
        })
    }
}
