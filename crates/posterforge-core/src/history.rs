//! Snapshot-based undo/redo with commit coalescing.

use crate::config::EditorConfig;
use crate::events::{Mailbox, Subscription};
use crate::scene::{Scene, SceneEvent};
use crate::scheduler::{IdleTask, Throttle};
use crate::storage::PersistRecord;
use crate::thumbnail::Thumbnailer;
use std::rc::Rc;
use std::time::Instant;

/// Linear history of full-scene snapshots with a cursor.
///
/// `entries[cursor]` always matches the live scene after a commit, undo or redo.
/// Structural scene events commit on the next idle poll; modification events
/// commit at most once per coalescing window.
pub struct History {
    entries: Vec<String>,
    cursor: usize,
    max_entries: usize,
    /// Set while a snapshot is being loaded back into the scene.
    restoring: bool,
    suspended: bool,
    mailbox: Option<Mailbox<SceneEvent>>,
    subscription: Option<Subscription>,
    structural: IdleTask,
    continuous: Throttle,
    thumbnails: Throttle,
    thumbnail_scale: f64,
    thumbnailer: Option<Rc<dyn Thumbnailer>>,
}

impl History {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            max_entries: config.max_history.max(1),
            restoring: false,
            suspended: false,
            mailbox: None,
            subscription: None,
            structural: IdleTask::new(),
            continuous: Throttle::new(config.commit_coalesce()),
            thumbnails: Throttle::new(config.thumbnail_interval()),
            thumbnail_scale: config.thumbnail_scale,
            thumbnailer: None,
        }
    }

    pub fn set_thumbnailer(&mut self, thumbnailer: Option<Rc<dyn Thumbnailer>>) {
        self.thumbnailer = thumbnailer;
    }

    /// Start listening to `scene`. Attaching twice keeps a single listener.
    pub fn attach(&mut self, scene: &Scene) {
        if self.subscription.as_ref().is_some_and(Subscription::is_active) {
            return;
        }
        let (subscription, mailbox) = scene.events().mailbox();
        self.subscription = Some(subscription);
        self.mailbox = Some(mailbox);
    }

    pub fn detach(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.dispose();
        }
        self.mailbox = None;
        self.cancel_pending();
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Drop all entries and start over from the current scene.
    pub fn reset(&mut self, scene: &Scene) {
        self.entries.clear();
        self.cursor = 0;
        self.cancel_pending();
        self.discard_events();
        match scene.to_json() {
            Ok(json) => self.entries.push(json),
            Err(e) => log::error!("Failed to snapshot scene for history: {}", e),
        }
    }

    /// Snapshot the scene.
    ///
    /// With `record` set (and history not suspended) the snapshot becomes a new
    /// entry after the cursor, discarding any redo entries. Always returns the
    /// persistence record for the snapshot, unless serialization failed or a
    /// restore is in progress.
    pub fn commit(&mut self, scene: &Scene, now: Instant, record: bool) -> Option<PersistRecord> {
        if self.restoring {
            return None;
        }
        let json = match scene.to_json() {
            Ok(json) => json,
            Err(e) => {
                log::error!("Dropping history commit: {}", e);
                return None;
            }
        };

        if record && !self.suspended {
            self.push(json.clone());
        }

        let (width, height) = scene
            .workspace_bounds()
            .map(|r| (r.width(), r.height()))
            .unwrap_or((0.0, 0.0));
        let thumbnail = self.thumbnail(scene, now);
        Some(PersistRecord {
            json,
            width,
            height,
            thumbnail,
        })
    }

    fn push(&mut self, json: String) {
        if self.entries.get(self.cursor) == Some(&json) {
            log::trace!("Snapshot unchanged, not recording");
            return;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(json);
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
        self.cursor = self.entries.len() - 1;
        log::debug!("History commit {}/{}", self.cursor + 1, self.entries.len());
    }

    fn thumbnail(&mut self, scene: &Scene, now: Instant) -> Option<crate::Thumbnail> {
        let thumbnailer = self.thumbnailer.as_ref()?;
        if !self.thumbnails.try_fire(now) {
            return None;
        }
        match thumbnailer.scene_thumbnail(scene, self.thumbnail_scale) {
            Ok(thumbnail) => Some(thumbnail),
            Err(e) => {
                log::debug!("Skipping history thumbnail: {}", e);
                None
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Step back one entry and reload it into the scene.
    pub fn undo(&mut self, scene: &mut Scene) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.restore(scene, self.cursor - 1)
    }

    /// Step forward one entry and reload it into the scene.
    pub fn redo(&mut self, scene: &mut Scene) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.restore(scene, self.cursor + 1)
    }

    fn restore(&mut self, scene: &mut Scene, index: usize) -> bool {
        let Some(json) = self.entries.get(index) else {
            return false;
        };
        self.restoring = true;
        let result = scene.load_json(json);
        self.restoring = false;
        // The reload's own events must not turn into commits.
        self.discard_events();
        self.cancel_pending();

        match result {
            Ok(()) => {
                self.cursor = index;
                true
            }
            Err(e) => {
                log::error!("Failed to restore history entry {}: {}", index, e);
                false
            }
        }
    }

    /// Classify queued scene events into pending commits.
    pub fn process_events(&mut self, now: Instant) {
        let Some(mailbox) = &self.mailbox else {
            return;
        };
        let events = mailbox.drain();
        if self.restoring || self.suspended {
            return;
        }
        for event in events {
            match event {
                event if event.is_structural() => self.structural.request(),
                SceneEvent::ObjectModified(_) => self.continuous.request(now),
                _ => {}
            }
        }
    }

    /// Run any commit that is due. Call on every idle tick.
    pub fn poll(&mut self, scene: &Scene, now: Instant) -> Option<PersistRecord> {
        self.process_events(now);
        if self.structural.take() {
            // One snapshot covers a pending continuous commit as well.
            self.continuous.cancel();
            return self.commit(scene, now, true);
        }
        if self.continuous.poll(now) {
            return self.commit(scene, now, true);
        }
        None
    }

    /// Commit whatever is pending now, without waiting for idle or the window.
    pub fn flush(&mut self, scene: &Scene, now: Instant) -> Option<PersistRecord> {
        self.process_events(now);
        if !self.has_pending() {
            return None;
        }
        self.cancel_pending();
        self.commit(scene, now, true)
    }

    /// When a coalesced commit will next become due.
    pub fn next_due(&self) -> Option<Instant> {
        self.continuous.due_at()
    }

    pub fn has_pending(&self) -> bool {
        self.structural.is_pending() || self.continuous.is_pending()
    }

    /// Stop recording. Pending commits and events observed while suspended are
    /// dropped, so callers that care about earlier edits [`flush`](Self::flush) first.
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.cancel_pending();
    }

    pub fn resume(&mut self) {
        self.discard_events();
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn discard_events(&self) {
        if let Some(mailbox) = &self.mailbox {
            mailbox.clear();
        }
    }

    fn cancel_pending(&mut self) {
        self.structural.cancel();
        self.continuous.cancel();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Snapshot at the cursor.
    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(String::as_str)
    }
}
