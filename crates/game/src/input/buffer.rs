use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::command::InputCommand;

/// FIFO of sampled inputs shared between the game thread and the sender
/// thread.
#[derive(Debug, Default)]
pub struct InputBuffer {
    queue: Mutex<VecDeque<InputCommand>>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<InputCommand>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, command: InputCommand) {
        self.lock().push_back(command);
    }

    /// Takes the oldest command without waiting for one to arrive.
    pub fn try_pop(&self) -> Option<InputCommand> {
        self.lock().pop_front()
    }

    pub fn pop(&self) -> Option<InputCommand> {
        self.try_pop()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
