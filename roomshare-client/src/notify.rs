//! Transient status line. Exactly one notification is current at a time;
//! a new one displaces the old, and each auto-dismisses after its TTL plus
//! a short exit transition.

use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3);
pub const EXIT_TRANSITION: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

impl NotificationKind {
    pub fn label(self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "ok",
            NotificationKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPhase {
    Visible,
    /// Past its TTL and playing the exit transition.
    Leaving,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub text: String,
    pub phase: NotificationPhase,
}

#[derive(Debug)]
pub struct NotificationSink {
    current: Option<Notification>,
    ttl: Duration,
    next_id: u64,
}

impl NotificationSink {
    pub fn new(ttl: Duration) -> Self {
        Self {
            current: None,
            ttl,
            next_id: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn show(&mut self, text: impl Into<String>, kind: NotificationKind) -> &Notification {
        self.next_id = self.next_id.wrapping_add(1);
        self.current.insert(Notification {
            id: self.next_id,
            kind,
            text: text.into(),
            phase: NotificationPhase::Visible,
        })
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref()
    }

    /// Moves notification `id` into its exit transition. Returns it when it
    /// is still the current one.
    pub fn begin_exit(&mut self, id: u64) -> Option<&Notification> {
        let notification = self.current.as_mut().filter(|n| n.id == id)?;
        notification.phase = NotificationPhase::Leaving;
        Some(notification)
    }

    /// Drops notification `id` if it is still the current one. A stale
    /// expiry for a displaced notification is a no-op.
    pub fn expire(&mut self, id: u64) -> bool {
        if self.current.as_ref().is_some_and(|n| n.id == id) {
            self.current = None;
            return true;
        }
        false
    }
}

impl Default for NotificationSink {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
