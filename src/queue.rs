use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::CompletionEvent;

#[derive(Default)]
struct QueueState {
    events: VecDeque<CompletionEvent>,

    /// Completions registered through `increment` that were not consumed yet
    outstanding: usize,
    stopped: bool,
}

///
/// Blocking queue of completion events shared by every request of one session.
///
/// Producers never block. Consumers block in [`CompletionQueue::pop`] until an
/// event arrives, and are handed a `FinishedError` event instead once the queue
/// is stopped or nothing registered is left to wait for.
#[derive(Default)]
pub struct CompletionQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl CompletionQueue {
    pub fn new(expected: usize) -> Self {
        let queue = Self::default();
        queue.increment(expected);
        queue
    }

    /// Registers `n` more completions to wait for
    #[inline]
    pub fn increment(&self, n: usize) {
        self.state.lock().outstanding += n;
    }

    #[inline]
    pub fn push(&self, event: CompletionEvent) {
        self.state.lock().events.push_back(event);
        self.available.notify_one();
    }

    pub fn pop(&self) -> CompletionEvent {
        let mut state = self.state.lock();

        loop {
            if let Some(event) = Self::take(&mut state) {
                break event;
            }

            self.available.wait(&mut state);
        }
    }

    /// Non blocking [`CompletionQueue::pop`]; `None` means a pop would block.
    pub fn try_pop(&self) -> Option<CompletionEvent> {
        Self::take(&mut self.state.lock())
    }

    /// Idempotent. Wakes every blocked consumer.
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.available.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    fn take(state: &mut QueueState) -> Option<CompletionEvent> {
        if state.stopped {
            return Some(CompletionEvent::finished());
        }

        if let Some(event) = state.events.pop_front() {
            state.outstanding = state.outstanding.saturating_sub(1);
            return Some(event);
        }

        if state.outstanding == 0 {
            return Some(CompletionEvent::finished());
        }

        None
    }
}
