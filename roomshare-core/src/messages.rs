use std::collections::VecDeque;

use crate::{MAX_CHAT_HISTORY, protocol::ChatMessage};

#[derive(Debug, Clone, PartialEq)]
pub struct LatestView {
    pub message: ChatMessage,
    pub pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryUpdate {
    Hidden,
    Appended,
    Rebuilt,
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
    history_visible: bool,
    rendered: Vec<ChatMessage>,
    latest_view: Option<LatestView>,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_CHAT_HISTORY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity + 1),
            capacity,
            history_visible: false,
            rendered: Vec::new(),
            latest_view: None,
        }
    }

    pub fn append(&mut self, message: ChatMessage) -> HistoryUpdate {
        let evicted = self.push_bounded(message.clone());
        self.latest_view = Some(LatestView {
            message: message.clone(),
            pending: false,
        });

        if !self.history_visible {
            return HistoryUpdate::Hidden;
        }
        if evicted {
            self.rebuild_rendered();
            HistoryUpdate::Rebuilt
        } else {
            self.rendered.push(message);
            HistoryUpdate::Appended
        }
    }

    /// Replaces the whole log, e.g. from a welcome backfill. An empty batch
    /// clears the log but leaves the latest-message banner untouched.
    pub fn bulk_replace<I>(&mut self, messages: I) -> HistoryUpdate
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        self.messages.clear();
        for message in messages {
            self.push_bounded(message);
        }

        if let Some(last) = self.messages.back() {
            self.latest_view = Some(LatestView {
                message: last.clone(),
                pending: false,
            });
        }

        if self.history_visible {
            self.rebuild_rendered();
            HistoryUpdate::Rebuilt
        } else {
            HistoryUpdate::Hidden
        }
    }

    pub fn latest(&self) -> Option<&ChatMessage> {
        self.messages.back()
    }

    pub fn latest_view(&self) -> Option<&LatestView> {
        self.latest_view.as_ref()
    }

    pub fn all(&self) -> impl ExactSizeIterator<Item = &ChatMessage> + DoubleEndedIterator {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn history_visible(&self) -> bool {
        self.history_visible
    }

    pub fn rendered_history(&self) -> &[ChatMessage] {
        &self.rendered
    }

    pub fn toggle_history_visible(&mut self) -> HistoryUpdate {
        self.history_visible = !self.history_visible;
        if self.history_visible {
            self.rebuild_rendered();
            HistoryUpdate::Rebuilt
        } else {
            self.rendered.clear();
            HistoryUpdate::Hidden
        }
    }

    pub fn show_pending(&mut self, message: ChatMessage) {
        self.latest_view = Some(LatestView {
            message,
            pending: true,
        });
    }

    /// Drops a pending banner, falling back to the newest stored message.
    /// Returns true when the banner changed.
    pub fn drop_pending(&mut self) -> bool {
        if !self.latest_view.as_ref().is_some_and(|view| view.pending) {
            return false;
        }
        self.latest_view = self.messages.back().map(|message| LatestView {
            message: message.clone(),
            pending: false,
        });
        true
    }

    fn push_bounded(&mut self, message: ChatMessage) -> bool {
        self.messages.push_back(message);
        if self.messages.len() > self.capacity {
            self.messages.pop_front();
            return true;
        }
        false
    }

    fn rebuild_rendered(&mut self) {
        self.rendered.clear();
        self.rendered.extend(self.messages.iter().cloned());
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
