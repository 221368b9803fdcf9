//! Process-wide conversation buffer.
//!
//! Holds recently added messages together with the current conversation
//! tag and the tagging mode, all behind one lock. Full buffers are handed
//! off as a unit to a channel drained by the categorizer workers.

use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::models::{Message, TaggingMode};

/// Snapshot of buffered messages, in append order.
pub type Batch = Vec<Message>;

struct BufferState {
    entries: Vec<Message>,
    current_tag: String,
    mode: TaggingMode,
    dispatcher: Option<UnboundedSender<Batch>>,
}

impl BufferState {
    /// Swap the entries out and queue them. Must run under the lock.
    fn flush(&mut self) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        let batch = std::mem::take(&mut self.entries);
        let size = batch.len();

        match &self.dispatcher {
            Some(tx) => {
                if tx.send(batch).is_err() {
                    warn!("Categorizer queue closed, dropping batch of {}", size);
                } else {
                    debug!("Dispatched batch of {} messages", size);
                }
            }
            None => warn!("Buffer closed, dropping batch of {}", size),
        }
        size
    }
}

pub struct ConversationBuffer {
    state: Mutex<BufferState>,
    threshold: usize,
}

impl ConversationBuffer {
    pub fn new(
        threshold: usize,
        mode: TaggingMode,
        current_tag: impl Into<String>,
        dispatcher: UnboundedSender<Batch>,
    ) -> Self {
        Self {
            state: Mutex::new(BufferState {
                entries: Vec::new(),
                current_tag: current_tag.into(),
                mode,
                dispatcher: Some(dispatcher),
            }),
            threshold: threshold.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Apply the current tag to `message` without buffering it.
    pub fn stamp(&self, message: &mut Message) {
        let state = self.lock();
        message.add_tag(&state.current_tag);
    }

    /// Buffer a message, tagging it with the current tag first.
    ///
    /// In automatic mode a buffer that reaches the threshold is flushed to
    /// the categorizer before the lock is released. Returns the message as
    /// buffered.
    pub fn append(&self, mut message: Message) -> Message {
        let mut state = self.lock();
        message.add_tag(&state.current_tag);
        self.push(&mut state, message)
    }

    /// Buffer a message already passed through [`stamp`](Self::stamp),
    /// leaving its tags as they are.
    pub fn append_stamped(&self, message: Message) -> Message {
        let mut state = self.lock();
        self.push(&mut state, message)
    }

    fn push(&self, state: &mut BufferState, message: Message) -> Message {
        state.entries.push(message.clone());
        if state.mode == TaggingMode::Automatic && state.entries.len() >= self.threshold {
            state.flush();
        }
        message
    }

    /// Switch mode. Entering automatic mode flushes whatever is buffered.
    /// Returns the number of messages dispatched.
    pub fn set_mode(&self, mode: TaggingMode) -> usize {
        let mut state = self.lock();
        let previous = state.mode;
        state.mode = mode;

        if previous != TaggingMode::Automatic && mode == TaggingMode::Automatic {
            return state.flush();
        }
        0
    }

    pub fn mode(&self) -> TaggingMode {
        self.lock().mode
    }

    pub fn set_tag(&self, tag: impl Into<String>) {
        self.lock().current_tag = tag.into().trim().to_string();
    }

    pub fn tag(&self) -> String {
        self.lock().current_tag.clone()
    }

    pub fn pending(&self) -> usize {
        self.lock().entries.len()
    }

    /// Stop dispatching. Workers finish the batches already queued.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.dispatcher.take().is_some() && !state.entries.is_empty() {
            debug!(
                "Closing buffer with {} undispatched messages",
                state.entries.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Role;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn buffer(mode: TaggingMode) -> (ConversationBuffer, UnboundedReceiver<Batch>) {
        let (tx, rx) = unbounded_channel();
        (ConversationBuffer::new(5, mode, "", tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Batch>) -> Vec<Batch> {
        let mut batches = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            batches.push(batch);
        }
        batches
    }

    #[test]
    fn test_dispatches_every_threshold_in_order() {
        let (buffer, mut rx) = buffer(TaggingMode::Automatic);
        let sent: Vec<String> = (0..13)
            .map(|i| buffer.append(Message::new(Role::User, format!("m{i}"))).content)
            .collect();

        let batches = drain(&mut rx);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 5));
        let received: Vec<String> = batches.iter().flatten().map(|m| m.content.clone()).collect();
        assert_eq!(received, sent[..10].to_vec());
        assert_eq!(buffer.pending(), 3);
    }

    #[test]
    fn test_manual_mode_never_dispatches() {
        let (buffer, mut rx) = buffer(TaggingMode::Manual);
        for i in 0..12 {
            buffer.append(Message::new(Role::User, format!("m{i}")));
        }
        assert!(drain(&mut rx).is_empty());
        assert_eq!(buffer.pending(), 12);
    }

    #[test]
    fn test_switch_to_automatic_flushes_partial_buffer() {
        let (buffer, mut rx) = buffer(TaggingMode::Manual);
        for i in 0..3 {
            buffer.append(Message::new(Role::Assistant, format!("m{i}")));
        }

        assert_eq!(buffer.set_mode(TaggingMode::Automatic), 3);
        let batches = drain(&mut rx);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(buffer.pending(), 0);

        // Re-asserting automatic is not a transition.
        buffer.append(Message::new(Role::User, "x"));
        assert_eq!(buffer.set_mode(TaggingMode::Automatic), 0);
        assert_eq!(buffer.pending(), 1);
    }

    #[test]
    fn test_switch_with_empty_buffer_dispatches_nothing() {
        let (buffer, mut rx) = buffer(TaggingMode::Manual);
        assert_eq!(buffer.set_mode(TaggingMode::Automatic), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_current_tag_applied_on_append() {
        let (buffer, _rx) = buffer(TaggingMode::Manual);
        buffer.set_tag("  release-2  ");
        assert_eq!(buffer.tag(), "release-2");

        let tagged = buffer.append(Message::new(Role::User, "hello"));
        assert_eq!(tagged.tags, vec!["release-2".to_string()]);

        buffer.set_tag("");
        let untagged = buffer.append(Message::new(Role::User, "again"));
        assert!(untagged.tags.is_empty());
    }

    #[test]
    fn test_stamped_message_keeps_its_tag() {
        let (buffer, _rx) = buffer(TaggingMode::Manual);
        buffer.set_tag("sprint-1");
        let mut message = Message::new(Role::User, "hello");
        buffer.stamp(&mut message);

        buffer.set_tag("sprint-2");
        let buffered = buffer.append_stamped(message);
        assert_eq!(buffered.tags, vec!["sprint-1".to_string()]);
        assert_eq!(buffer.pending(), 1);
    }

    #[test]
    fn test_closed_buffer_drops_batches() {
        let (buffer, mut rx) = buffer(TaggingMode::Automatic);
        buffer.close();
        for i in 0..5 {
            buffer.append(Message::new(Role::User, format!("m{i}")));
        }
        assert!(drain(&mut rx).is_empty());
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let (tx, mut rx) = unbounded_channel();
        let buffer = Arc::new(ConversationBuffer::new(5, TaggingMode::Automatic, "", tx));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        buffer.append(Message::new(Role::User, format!("t{t}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let batches = drain(&mut rx);
        assert_eq!(batches.len(), 40);
        assert!(batches.iter().all(|b| b.len() == 5));
        assert_eq!(buffer.pending(), 0);
    }
}
