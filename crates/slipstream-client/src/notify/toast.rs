// Transient toast queue with two-phase dismissal.
//
// Toasts are ephemeral copies of notifications with a local-only expiry; they
// never persist and never touch the server. Removal is always two-phase
// (Visible -> Exiting -> removed) so a view layer can run an exit transition
// before the entry disappears.

use std::time::{Duration, Instant};

use super::Notification;

/// Default display duration for a toast.
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastPhase {
    Visible,
    Exiting,
}

#[derive(Debug, Clone)]
pub struct ToastEntry {
    pub notification: Notification,
    pub phase: ToastPhase,
    expires_at: Instant,
}

impl ToastEntry {
    pub fn id(&self) -> &str {
        &self.notification.id
    }
}

/// The visible toast queue.
///
/// Capacity-unbounded: a burst of notifications displays all at once. If
/// bursts become real, cap the visible set (3-5 entries) and queue the
/// remainder FIFO behind expiring slots.
#[derive(Debug)]
pub struct ToastQueue {
    entries: Vec<ToastEntry>,
    duration: Duration,
}

impl Default for ToastQueue {
    fn default() -> Self {
        ToastQueue::new(DEFAULT_TOAST_DURATION)
    }
}

impl ToastQueue {
    pub fn new(duration: Duration) -> Self {
        ToastQueue {
            entries: Vec::new(),
            duration,
        }
    }

    pub fn entries(&self) -> &[ToastEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a toast that will expire after the configured duration.
    pub fn show(&mut self, notification: Notification, now: Instant) {
        self.entries.push(ToastEntry {
            notification,
            phase: ToastPhase::Visible,
            expires_at: now + self.duration,
        });
    }

    /// Move expired entries into the exiting phase. Returns the ids that
    /// newly started exiting so the view layer can animate them out.
    pub fn tick(&mut self, now: Instant) -> Vec<String> {
        let mut exiting = Vec::new();
        for entry in &mut self.entries {
            if entry.phase == ToastPhase::Visible && now >= entry.expires_at {
                entry.phase = ToastPhase::Exiting;
                exiting.push(entry.notification.id.clone());
            }
        }
        exiting
    }

    /// Dismiss a toast early. Like expiry, this only marks the entry as
    /// exiting; the exit transition runs before removal.
    pub fn dismiss(&mut self, id: &str) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.notification.id == id && e.phase == ToastPhase::Visible)
        {
            Some(entry) => {
                entry.phase = ToastPhase::Exiting;
                true
            }
            None => false,
        }
    }

    /// Remove an entry whose exit transition has finished. Entries still
    /// visible are left alone.
    pub fn finish_exit(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.notification.id == id && e.phase == ToastPhase::Exiting));
        self.entries.len() < before
    }

    /// Drop everything, e.g. on sign-out.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use chrono::Utc;

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationKind::Success,
            title: "saved".into(),
            message: "all good".into(),
            timestamp: Utc::now(),
            read: true,
            action_url: None,
            action_label: None,
            league_id: None,
            race_id: None,
        }
    }

    #[test]
    fn show_appends_visible_entry() {
        let mut queue = ToastQueue::default();
        let now = Instant::now();
        queue.show(notification("a"), now);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries()[0].phase, ToastPhase::Visible);
        assert_eq!(queue.entries()[0].id(), "a");
    }

    #[test]
    fn tick_before_expiry_changes_nothing() {
        let mut queue = ToastQueue::default();
        let now = Instant::now();
        queue.show(notification("a"), now);

        let exiting = queue.tick(now + Duration::from_secs(4));
        assert!(exiting.is_empty());
        assert_eq!(queue.entries()[0].phase, ToastPhase::Visible);
    }

    #[test]
    fn tick_after_expiry_marks_exiting_but_keeps_entry() {
        let mut queue = ToastQueue::default();
        let now = Instant::now();
        queue.show(notification("a"), now);

        let exiting = queue.tick(now + Duration::from_secs(5));
        assert_eq!(exiting, vec!["a".to_string()]);
        // Still present: removal waits for the exit transition.
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries()[0].phase, ToastPhase::Exiting);

        // A second tick does not report the same entry again.
        assert!(queue.tick(now + Duration::from_secs(6)).is_empty());
    }

    #[test]
    fn entries_expire_independently() {
        let mut queue = ToastQueue::default();
        let now = Instant::now();
        queue.show(notification("a"), now);
        queue.show(notification("b"), now + Duration::from_secs(3));

        let exiting = queue.tick(now + Duration::from_secs(5));
        assert_eq!(exiting, vec!["a".to_string()]);
        assert_eq!(queue.entries()[1].phase, ToastPhase::Visible);

        let exiting = queue.tick(now + Duration::from_secs(8));
        assert_eq!(exiting, vec!["b".to_string()]);
    }

    #[test]
    fn dismiss_marks_exiting_early() {
        let mut queue = ToastQueue::default();
        let now = Instant::now();
        queue.show(notification("a"), now);

        assert!(queue.dismiss("a"));
        assert_eq!(queue.entries()[0].phase, ToastPhase::Exiting);

        // Already exiting: dismiss again is a no-op.
        assert!(!queue.dismiss("a"));
        assert!(!queue.dismiss("ghost"));
    }

    #[test]
    fn finish_exit_removes_only_exiting_entries() {
        let mut queue = ToastQueue::default();
        let now = Instant::now();
        queue.show(notification("a"), now);

        // Visible entries cannot be removed directly.
        assert!(!queue.finish_exit("a"));
        assert_eq!(queue.len(), 1);

        queue.dismiss("a");
        assert!(queue.finish_exit("a"));
        assert!(queue.is_empty());
    }

    #[test]
    fn custom_duration_respected() {
        let mut queue = ToastQueue::new(Duration::from_secs(2));
        let now = Instant::now();
        queue.show(notification("a"), now);

        assert!(queue.tick(now + Duration::from_secs(1)).is_empty());
        assert_eq!(queue.tick(now + Duration::from_secs(2)), vec!["a".to_string()]);
    }

    #[test]
    fn clear_drops_everything() {
        let mut queue = ToastQueue::default();
        let now = Instant::now();
        queue.show(notification("a"), now);
        queue.show(notification("b"), now);
        queue.clear();
        assert!(queue.is_empty());
    }
}
