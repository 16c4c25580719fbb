//! Room session: the engine that merges committed history, the local stroke
//! and remote cursors.
//!
//! All state lives on the caller's thread. Network steps are handed out as
//! owned request values ([`CommitRequest`], [`ClearRequest`], [`LoadRequest`])
//! that the host runs on whatever executor it likes and feeds back through
//! the matching `apply_*` method. Change-feed and presence events are pulled
//! with [`RoomSession::pump`].

use crate::error::{Channel, SyncError};
use crate::feed::{ChangeFeed, FeedEvent, FeedSubscription};
use crate::history::{CommittedHistory, FoldOutcome};
use crate::input::PointerEvent;
use crate::model::{Brush, Identity, NewStroke, RoomId, Stroke, StrokeId, StrokeView};
use crate::presence::{
    Cursor, Participant, PresenceChannel, PresenceEvent, PresenceSnapshot, PresenceSubscription, RemoteCursors,
};
use crate::session::LocalDrawSession;
use crate::storage::{BoxFuture, StorageResult, StrokeLog};
use std::fmt;

/// Everything a frame is drawn from.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    /// Committed strokes, ascending by commit order.
    pub history: &'a CommittedHistory,
    /// The stroke being drawn locally, drawn after the history.
    pub local: Option<StrokeView<'a>>,
    /// Everyone else's cursor, drawn after all strokes.
    pub cursors: &'a RemoteCursors,
}

/// A finalized stroke on its way to the log.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    room: RoomId,
    stroke: NewStroke,
    /// History epoch the stroke was finished in.
    epoch: u64,
}

impl CommitRequest {
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn stroke(&self) -> &NewStroke {
        &self.stroke
    }

    /// Append the stroke.
    pub async fn send(self, log: &dyn StrokeLog) -> CommitResult {
        let stroke_id = self.stroke.id;
        let result = log.append(&self.room, self.stroke).await;
        CommitResult {
            room: self.room,
            stroke_id,
            result,
            epoch: self.epoch,
        }
    }
}

/// Outcome of a [`CommitRequest`].
#[derive(Debug)]
pub struct CommitResult {
    pub room: RoomId,
    pub stroke_id: StrokeId,
    pub result: StorageResult<Stroke>,
    epoch: u64,
}

/// A room-wide clear on its way to the log.
#[derive(Debug, Clone)]
pub struct ClearRequest {
    room: RoomId,
}

impl ClearRequest {
    pub async fn send(self, log: &dyn StrokeLog) -> ClearResult {
        let result = log.clear_room(&self.room).await;
        ClearResult { room: self.room, result }
    }
}

/// Outcome of a [`ClearRequest`].
#[derive(Debug)]
pub struct ClearResult {
    pub room: RoomId,
    pub result: StorageResult<()>,
}

/// A full history fetch.
///
/// The fetch starts once the change feed it belongs to is live, so no
/// commit can slip between the snapshot and the first feed event.
pub struct LoadRequest {
    room: RoomId,
    generation: u64,
    feed_ready: Option<BoxFuture<'static, ()>>,
}

impl fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadRequest")
            .field("room", &self.room)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl LoadRequest {
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub async fn send(self, log: &dyn StrokeLog) -> LoadResult {
        if let Some(feed_ready) = self.feed_ready {
            feed_ready.await;
        }
        let result = log.load_all(&self.room).await;
        LoadResult {
            room: self.room,
            generation: self.generation,
            result,
        }
    }
}

/// Outcome of a [`LoadRequest`].
#[derive(Debug)]
pub struct LoadResult {
    pub room: RoomId,
    pub result: StorageResult<Vec<Stroke>>,
    generation: u64,
}

/// A participant's live view of one room.
///
/// Owns both channel subscriptions; dropping the session (or calling
/// [`RoomSession::leave`]) unsubscribes from both.
pub struct RoomSession {
    room: RoomId,
    identity: Identity,
    draw: LocalDrawSession,
    history: CommittedHistory,
    presence: PresenceSnapshot,
    cursors: RemoteCursors,
    feed: Option<Box<dyn FeedSubscription>>,
    presence_sub: Option<Box<dyn PresenceSubscription>>,
    /// A history load is in flight; feed events stay queued until it lands.
    awaiting_load: bool,
    /// Bumped by every (re)subscribe. Only the latest load is applied.
    load_generation: u64,
    /// Bumped whenever the history is replaced or cleared. Commit results
    /// from an older epoch are left to the feed.
    history_epoch: u64,
    errors: Vec<SyncError>,
    dirty: bool,
}

impl RoomSession {
    /// Enter a room.
    ///
    /// Both channels are subscribed before the history is fetched, so no
    /// commit can fall between the load and the first feed event. Failures
    /// do not prevent entering: they are queued for [`RoomSession::take_errors`]
    /// and the room starts with whatever could be obtained.
    pub async fn enter(
        room: RoomId,
        identity: Identity,
        brush: Brush,
        log: &dyn StrokeLog,
        feed: &dyn ChangeFeed,
        presence: &dyn PresenceChannel,
    ) -> Self {
        let mut session = Self {
            draw: LocalDrawSession::new(identity.author_id.clone(), brush),
            room,
            identity,
            history: CommittedHistory::new(),
            presence: PresenceSnapshot::new(),
            cursors: RemoteCursors::default(),
            feed: None,
            presence_sub: None,
            awaiting_load: false,
            load_generation: 0,
            history_epoch: 0,
            errors: Vec::new(),
            dirty: true,
        };

        let request = session.subscribe(feed, presence);
        let loaded = request.send(log).await;
        session.apply_load(loaded);
        log::info!(
            "{} entered room {} with {} strokes",
            session.identity.author_id,
            session.room,
            session.history.len()
        );
        session
    }

    /// Replace both subscriptions and start a history reload.
    fn subscribe(&mut self, feed: &dyn ChangeFeed, presence: &dyn PresenceChannel) -> LoadRequest {
        // Release the old links before opening new ones.
        self.feed = None;
        self.presence_sub = None;

        match feed.subscribe(&self.room) {
            Ok(subscription) => self.feed = Some(subscription),
            Err(e) => {
                log::warn!("Change feed unavailable: {}", e);
                self.errors.push(e);
            }
        }
        match presence.join(&self.room, &self.identity) {
            Ok(subscription) => self.presence_sub = Some(subscription),
            Err(e) => {
                log::warn!("Presence unavailable: {}", e);
                self.errors.push(e);
            }
        }

        self.awaiting_load = true;
        self.load_generation += 1;
        LoadRequest {
            room: self.room.clone(),
            generation: self.load_generation,
            feed_ready: self.feed.as_ref().map(|feed| feed.ready()),
        }
    }

    /// Resubscribe after a disconnect. Run the returned request and pass its
    /// result to [`RoomSession::apply_load`]; strokes missed while offline are
    /// only recovered by that reload.
    pub fn reconnect(&mut self, feed: &dyn ChangeFeed, presence: &dyn PresenceChannel) -> LoadRequest {
        log::info!("Reconnecting to room {}", self.room);
        self.subscribe(feed, presence)
    }

    /// Seed the history from a full load.
    ///
    /// On failure the history is emptied and a `LoadFailure` is queued. Either
    /// way the feed events received since subscribing are folded on top.
    /// Results of a load superseded by a later [`RoomSession::reconnect`] are ignored.
    pub fn apply_load(&mut self, loaded: LoadResult) {
        if loaded.room != self.room {
            log::warn!("Ignoring history of room {} in room {}", loaded.room, self.room);
            return;
        }
        if loaded.generation != self.load_generation {
            log::debug!(
                "Ignoring outdated load {} of room {}, waiting for {}",
                loaded.generation,
                self.room,
                self.load_generation
            );
            return;
        }
        match loaded.result {
            Ok(strokes) => self.history.seed(strokes),
            Err(e) => {
                log::warn!("Failed to load room {}: {}", self.room, e);
                self.history.clear();
                self.errors.push(SyncError::LoadFailure {
                    room: self.room.clone(),
                    reason: e.to_string(),
                });
            }
        }
        self.history_epoch += 1;
        self.awaiting_load = false;
        self.dirty = true;
        self.pump_feed();
    }

    /// Feed a pointer event.
    ///
    /// Every move publishes the cursor, drawing or not. Releasing or leaving
    /// the canvas finalizes the stroke and returns it for commit; the local
    /// buffer is cleared right away so drawing can continue.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Option<CommitRequest> {
        match event {
            PointerEvent::Down { position } => {
                self.draw.begin(position);
                self.publish_cursor(position.x, position.y);
                self.dirty = true;
                None
            }
            PointerEvent::Move { position } => {
                self.publish_cursor(position.x, position.y);
                if self.draw.is_active() {
                    self.draw.extend(position);
                    self.dirty = true;
                }
                None
            }
            PointerEvent::Up | PointerEvent::Leave => {
                let stroke = self.draw.end()?;
                self.dirty = true;
                log::debug!("Finished stroke {} with {} points", stroke.id, stroke.points.len());
                Some(CommitRequest {
                    room: self.room.clone(),
                    stroke,
                    epoch: self.history_epoch,
                })
            }
        }
    }

    fn publish_cursor(&mut self, x: f64, y: f64) {
        let Some(subscription) = self.presence_sub.as_mut() else {
            return;
        };
        if let Err(e) = subscription.publish(Cursor::at(&self.identity, x, y)) {
            log::warn!("Cursor publish failed: {}", e);
            self.presence_sub = None;
            self.errors.push(e);
        }
    }

    /// Change tool, color or size. Applies to the stroke being drawn too.
    pub fn set_brush(&mut self, brush: Brush) {
        self.draw.set_brush(brush);
        if self.draw.is_active() {
            self.dirty = true;
        }
    }

    pub fn brush(&self) -> &Brush {
        self.draw.brush()
    }

    /// Record the outcome of a commit. Failed strokes are dropped, not retried.
    ///
    /// If the history was cleared or reloaded since the stroke was finished,
    /// the result is not folded: the stroke may already be gone from the log,
    /// and if it is not, the feed still delivers it.
    pub fn apply_commit(&mut self, committed: CommitResult) {
        if committed.room != self.room {
            log::warn!("Ignoring commit for room {} in room {}", committed.room, self.room);
            return;
        }
        match committed.result {
            Ok(stroke) if committed.epoch != self.history_epoch => {
                log::debug!("Stroke {} committed before a clear or reload, left to the feed", stroke.id);
            }
            Ok(stroke) => {
                // The feed echo of this stroke is then a duplicate.
                if self.history.fold_insert(stroke) == FoldOutcome::Inserted {
                    self.dirty = true;
                }
            }
            Err(e) => {
                log::warn!("Failed to commit stroke {}: {}", committed.stroke_id, e);
                self.errors.push(SyncError::CommitFailure {
                    stroke_id: committed.stroke_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Request a room-wide clear.
    pub fn clear_request(&self) -> ClearRequest {
        ClearRequest { room: self.room.clone() }
    }

    /// Record the outcome of a clear.
    ///
    /// Local history is only emptied by the feed's clear event, so strokes
    /// committed right after the clear are not lost. On failure nothing changes.
    pub fn apply_clear(&mut self, cleared: ClearResult) {
        if cleared.room != self.room {
            return;
        }
        if let Err(e) = cleared.result {
            log::warn!("Failed to clear room {}: {}", self.room, e);
            self.errors.push(SyncError::ClearFailure {
                room: self.room.clone(),
                reason: e.to_string(),
            });
        }
    }

    /// Drain both channels. Returns whether anything visible changed.
    pub fn pump(&mut self) -> bool {
        let feed_changed = self.pump_feed();
        let presence_changed = self.pump_presence();
        feed_changed || presence_changed
    }

    fn pump_feed(&mut self) -> bool {
        if self.awaiting_load {
            return false;
        }
        let Some(subscription) = self.feed.as_mut() else {
            return false;
        };

        let mut changed = false;
        for event in subscription.poll_events() {
            match event {
                FeedEvent::Insert(stroke) => {
                    if self.history.fold_insert(stroke) == FoldOutcome::Inserted {
                        changed = true;
                    }
                }
                FeedEvent::Clear => {
                    log::info!("Room {} was cleared", self.room);
                    self.history.clear();
                    self.history_epoch += 1;
                    changed = true;
                }
                FeedEvent::Disconnected { reason } => {
                    log::warn!("Change feed of room {} dropped: {}", self.room, reason);
                    self.errors
                        .push(SyncError::disconnect(&self.room, Channel::Strokes, reason));
                    self.feed = None;
                    break;
                }
            }
        }
        self.dirty |= changed;
        changed
    }

    fn pump_presence(&mut self) -> bool {
        let Some(subscription) = self.presence_sub.as_mut() else {
            return false;
        };

        let mut changed = false;
        for event in subscription.poll_events() {
            match event {
                PresenceEvent::Sync(snapshot) => {
                    // Rebuilt from the full snapshot every time, never merged.
                    let cursors = RemoteCursors::from_snapshot(&snapshot, &self.identity.author_id);
                    changed |= cursors != self.cursors || snapshot != self.presence;
                    self.cursors = cursors;
                    self.presence = snapshot;
                }
                PresenceEvent::Disconnected { reason } => {
                    log::warn!("Presence of room {} dropped: {}", self.room, reason);
                    self.errors
                        .push(SyncError::disconnect(&self.room, Channel::Cursors, reason));
                    self.presence_sub = None;
                    break;
                }
            }
        }
        self.dirty |= changed;
        changed
    }

    /// Errors queued since the last call.
    pub fn take_errors(&mut self) -> Vec<SyncError> {
        std::mem::take(&mut self.errors)
    }

    /// Whether the frame needs redrawing since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn frame(&self) -> FrameInput<'_> {
        FrameInput {
            history: &self.history,
            local: self.draw.in_progress(),
            cursors: &self.cursors,
        }
    }

    /// The user list, including the local participant.
    pub fn participants(&self) -> Vec<Participant> {
        self.presence.participants(&self.identity.author_id)
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn history(&self) -> &CommittedHistory {
        &self.history
    }

    pub fn remote_cursors(&self) -> &RemoteCursors {
        &self.cursors
    }

    pub fn is_drawing(&self) -> bool {
        self.draw.is_active()
    }

    /// Both channels are up and no reload is pending.
    pub fn is_live(&self) -> bool {
        self.feed.is_some() && self.presence_sub.is_some() && !self.awaiting_load
    }

    /// Leave the room, releasing both subscriptions.
    pub fn leave(self) {
        log::info!("{} left room {}", self.identity.author_id, self.room);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::LocalHub;
    use crate::model::{AuthorId, ToolKind};
    use crate::storage::{BoxFuture, MemoryStrokeLog, StorageError, block_on};
    use kurbo::Point;
    use std::sync::Arc;

    /// A log whose every call fails.
    struct FailingLog;

    impl StrokeLog for FailingLog {
        fn load_all(&self, _room: &RoomId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
            Box::pin(async { Err(StorageError::Transport("offline".to_string())) })
        }

        fn append(&self, _room: &RoomId, _stroke: NewStroke) -> BoxFuture<'_, StorageResult<Stroke>> {
            Box::pin(async { Err(StorageError::Transport("offline".to_string())) })
        }

        fn clear_room(&self, _room: &RoomId) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Err(StorageError::Transport("offline".to_string())) })
        }
    }

    fn hub() -> LocalHub {
        LocalHub::new(Arc::new(MemoryStrokeLog::new()))
    }

    fn room() -> RoomId {
        RoomId::from("main-room")
    }

    fn enter(hub: &LocalHub, name: &str) -> RoomSession {
        let identity = Identity::new(name, name, "#06b6d4");
        block_on(RoomSession::enter(room(), identity, Brush::default(), hub, hub, hub))
    }

    fn draw(session: &mut RoomSession, points: &[(f64, f64)]) -> CommitRequest {
        let (first, rest) = points.split_first().unwrap();
        session.handle_pointer(PointerEvent::Down {
            position: Point::new(first.0, first.1),
        });
        for &(x, y) in rest {
            session.handle_pointer(PointerEvent::Move {
                position: Point::new(x, y),
            });
        }
        session.handle_pointer(PointerEvent::Up).unwrap()
    }

    fn commit(session: &mut RoomSession, log: &dyn StrokeLog, points: &[(f64, f64)]) -> StrokeId {
        let request = draw(session, points);
        let id = request.stroke().id;
        let result = block_on(request.send(log));
        session.apply_commit(result);
        id
    }

    fn ids(session: &RoomSession) -> Vec<StrokeId> {
        session.history().iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_participants_converge() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let mut bob = enter(&hub, "bob");

        let first = commit(&mut alice, &hub, &[(0.0, 0.0), (10.0, 10.0)]);
        let second = commit(&mut bob, &hub, &[(5.0, 5.0), (6.0, 6.0)]);
        alice.pump();
        bob.pump();

        assert_eq!(ids(&alice), vec![first, second]);
        assert_eq!(ids(&bob), vec![first, second]);
        assert!(alice.take_errors().is_empty());
    }

    #[test]
    fn test_enter_loads_existing_history() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let id = commit(&mut alice, &hub, &[(0.0, 0.0), (1.0, 1.0)]);

        let late = enter(&hub, "carol");
        assert_eq!(ids(&late), vec![id]);
    }

    #[test]
    fn test_redelivered_insert_is_folded_once() {
        let hub = hub();
        hub.set_redelivery(true);
        let mut alice = enter(&hub, "alice");
        let mut bob = enter(&hub, "bob");

        commit(&mut alice, &hub, &[(0.0, 0.0), (1.0, 1.0)]);
        alice.pump();
        bob.pump();
        assert_eq!(alice.history().len(), 1);
        assert_eq!(bob.history().len(), 1);
    }

    #[test]
    fn test_local_stroke_is_in_frame_until_release() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        alice.take_dirty();

        alice.handle_pointer(PointerEvent::Down {
            position: Point::new(1.0, 1.0),
        });
        alice.handle_pointer(PointerEvent::Move {
            position: Point::new(2.0, 2.0),
        });
        assert!(alice.take_dirty());
        let local = alice.frame().local.unwrap();
        assert_eq!(local.points.len(), 2);

        // A brush change shows up on the live stroke.
        alice.set_brush(Brush::eraser(16.0));
        assert!(alice.take_dirty());
        assert_eq!(alice.frame().local.unwrap().brush.tool, ToolKind::Eraser);

        let request = alice.handle_pointer(PointerEvent::Leave).unwrap();
        assert_eq!(request.stroke().brush.tool, ToolKind::Eraser);
        assert!(alice.frame().local.is_none());
        assert!(!alice.is_drawing());
    }

    #[test]
    fn test_click_commits_single_point_stroke() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let id = commit(&mut alice, &hub, &[(3.0, 3.0)]);
        assert_eq!(alice.history().get(id).map(|s| s.points.len()), Some(1));
    }

    #[test]
    fn test_release_without_press_commits_nothing() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        assert!(alice.handle_pointer(PointerEvent::Up).is_none());
        assert!(alice.handle_pointer(PointerEvent::Leave).is_none());
    }

    #[test]
    fn test_clear_waits_for_feed() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        commit(&mut alice, &hub, &[(0.0, 0.0), (1.0, 1.0)]);

        let result = block_on(alice.clear_request().send(&hub));
        alice.apply_clear(result);
        assert_eq!(alice.history().len(), 1);

        assert!(alice.pump());
        assert!(alice.history().is_empty());

        // Drawing after a clear works normally.
        let id = commit(&mut alice, &hub, &[(0.0, 0.0), (2.0, 2.0)]);
        alice.pump();
        assert_eq!(ids(&alice), vec![id]);
    }

    #[test]
    fn test_insert_after_clear_in_same_batch() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let mut bob = enter(&hub, "bob");
        commit(&mut alice, &hub, &[(0.0, 0.0), (1.0, 1.0)]);
        block_on(hub.clear_room(&room())).unwrap();
        let id = commit(&mut alice, &hub, &[(4.0, 4.0), (5.0, 5.0)]);

        bob.pump();
        assert_eq!(ids(&bob), vec![id]);
    }

    #[test]
    fn test_commit_result_after_clear_is_not_folded() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");

        let request = draw(&mut alice, &[(0.0, 0.0), (1.0, 1.0)]);
        let result = block_on(request.send(&hub));
        block_on(hub.clear_room(&room())).unwrap();

        // The feed delivers insert and clear before the append reply lands.
        alice.pump();
        alice.apply_commit(result);

        assert!(alice.history().is_empty());
        assert!(block_on(hub.load_all(&room())).unwrap().is_empty());
        assert!(alice.take_errors().is_empty());
    }

    #[test]
    fn test_commit_result_before_clear_event_is_cleared_by_it() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");

        let request = draw(&mut alice, &[(0.0, 0.0), (1.0, 1.0)]);
        let result = block_on(request.send(&hub));
        alice.apply_commit(result);
        assert_eq!(alice.history().len(), 1);

        block_on(hub.clear_room(&room())).unwrap();
        alice.pump();
        assert!(alice.history().is_empty());
    }

    #[test]
    fn test_clear_failure_keeps_history() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        commit(&mut alice, &hub, &[(0.0, 0.0), (1.0, 1.0)]);

        let result = block_on(alice.clear_request().send(&FailingLog));
        alice.apply_clear(result);
        alice.pump();

        assert_eq!(alice.history().len(), 1);
        assert!(matches!(alice.take_errors().as_slice(), [SyncError::ClearFailure { .. }]));
    }

    #[test]
    fn test_commit_failure_is_surfaced_and_not_retried() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let id = commit(&mut alice, &FailingLog, &[(0.0, 0.0), (1.0, 1.0)]);
        alice.pump();

        assert!(alice.history().is_empty());
        let errors = alice.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], SyncError::CommitFailure { stroke_id, .. } if *stroke_id == id));

        // The session is free for the next stroke.
        assert!(!alice.is_drawing());
        commit(&mut alice, &hub, &[(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(alice.history().len(), 1);
    }

    #[test]
    fn test_load_failure_enters_empty() {
        let hub = hub();
        block_on(hub.append(
            &room(),
            NewStroke::new(AuthorId::from("x"), vec![Point::ZERO, Point::new(1.0, 1.0)], Brush::default()),
        ))
        .unwrap();

        let identity = Identity::new("alice", "Alice", "#06b6d4");
        let mut alice = block_on(RoomSession::enter(room(), identity, Brush::default(), &FailingLog, &hub, &hub));
        assert!(alice.history().is_empty());
        assert!(matches!(alice.take_errors().as_slice(), [SyncError::LoadFailure { .. }]));

        // Live inserts still arrive.
        let mut bob = enter(&hub, "bob");
        let id = commit(&mut bob, &hub, &[(0.0, 0.0), (1.0, 1.0)]);
        alice.pump();
        assert_eq!(ids(&alice), vec![id]);
    }

    #[test]
    fn test_cursors_exclude_self() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let mut bob = enter(&hub, "bob");

        bob.handle_pointer(PointerEvent::Move {
            position: Point::new(40.0, 50.0),
        });
        alice.handle_pointer(PointerEvent::Move {
            position: Point::new(1.0, 2.0),
        });
        alice.pump();

        let cursors: Vec<_> = alice.frame().cursors.iter().cloned().collect();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].author_id, AuthorId::from("bob"));
        assert_eq!((cursors[0].x, cursors[0].y), (40.0, 50.0));

        let participants = alice.participants();
        assert_eq!(participants.len(), 2);
        assert!(participants.iter().any(|p| p.is_local && p.author_id == AuthorId::from("alice")));
    }

    #[test]
    fn test_alone_in_room_renders_no_cursors() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        alice.handle_pointer(PointerEvent::Move {
            position: Point::new(1.0, 2.0),
        });
        alice.pump();
        assert!(alice.frame().cursors.is_empty());
        assert_eq!(alice.participants().len(), 1);
    }

    #[test]
    fn test_departed_cursor_disappears() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let bob = enter(&hub, "bob");
        alice.pump();
        assert_eq!(alice.remote_cursors().len(), 1);

        bob.leave();
        assert!(alice.pump());
        assert!(alice.remote_cursors().is_empty());
    }

    #[test]
    fn test_leave_releases_subscriptions() {
        let hub = hub();
        let alice = enter(&hub, "alice");
        assert_eq!(hub.subscriber_count(&room()), 2);
        alice.leave();
        assert_eq!(hub.subscriber_count(&room()), 0);
    }

    #[test]
    fn test_disconnect_then_resync() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let mut bob = enter(&hub, "bob");

        hub.disconnect_room(&room());
        alice.pump();
        let errors = alice.take_errors();
        assert!(errors.iter().any(|e| e.requires_resync()));
        assert!(!alice.is_live());

        // Committed while alice is offline.
        let missed = commit(&mut bob, &hub, &[(0.0, 0.0), (1.0, 1.0)]);
        alice.pump();
        assert!(alice.history().is_empty());

        let request = alice.reconnect(&hub, &hub);
        // Feed events wait for the reload.
        let during = commit(&mut bob, &hub, &[(2.0, 2.0), (3.0, 3.0)]);
        alice.pump();
        assert!(alice.history().is_empty());

        alice.apply_load(block_on(request.send(&hub)));
        assert!(alice.is_live());
        assert_eq!(ids(&alice), vec![missed, during]);
    }

    #[test]
    fn test_superseded_load_is_ignored() {
        let hub = hub();
        let mut alice = enter(&hub, "alice");
        let mut bob = enter(&hub, "bob");
        hub.disconnect_room(&room());
        alice.pump();
        alice.take_errors();

        let first = alice.reconnect(&hub, &hub);
        let second = alice.reconnect(&hub, &hub);
        let first = block_on(first.send(&hub));
        let second = block_on(second.send(&hub));
        let id = commit(&mut bob, &hub, &[(0.0, 0.0), (1.0, 1.0)]);

        alice.apply_load(first);
        assert!(!alice.is_live());
        alice.apply_load(second);
        alice.pump();

        assert!(alice.is_live());
        assert_eq!(ids(&alice), vec![id]);
        assert_eq!(block_on(hub.load_all(&room())).unwrap().len(), 1);
    }
}
