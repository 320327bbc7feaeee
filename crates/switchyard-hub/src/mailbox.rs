use parking_lot::Mutex;
use std::collections::VecDeque;
use switchyard_core::Message;

/// A per-agent FIFO message buffer.
///
/// Messages are appended in arrival order and removed all at once by
/// [`Mailbox::drain`]. Both operations run under a short mutex that is never
/// held across an await point, so a drain is atomic with respect to
/// concurrent pushes and other drains.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the back of the buffer.
    pub fn push(&self, message: Message) {
        self.queue.lock().push_back(message);
    }

    /// Removes and returns every queued message, oldest first.
    ///
    /// The removal happens in one critical section: of two racing drains,
    /// one gets all pending messages and the other gets an empty `Vec`.
    pub fn drain(&self) -> Vec<Message> {
        let mut queue = self.queue.lock();
        queue.drain(..).collect()
    }

    /// Number of messages currently waiting.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the buffer holds no messages.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
