use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use crate::{queue::CompletionQueue, CompletionEvent, RequestId, ResponseCode};

///
/// Folds the chunk outcomes of one request into a single completion event.
///
/// Successful chunks count down `remaining`, failed chunks never do, so the
/// countdown reaches zero (and `Success` is pushed) only when every chunk
/// succeeded. The first failure flips `failed` and pushes `FileAccessError`;
/// later failures are absorbed.
pub(crate) struct RequestTracker {
    request_id: RequestId,
    remaining: AtomicUsize,
    failed: AtomicBool,
    queue: Arc<CompletionQueue>,
}

impl RequestTracker {
    pub(crate) fn new(request_id: RequestId, chunk_count: usize, queue: Arc<CompletionQueue>) -> Self {
        Self {
            request_id,
            remaining: AtomicUsize::new(chunk_count),
            failed: AtomicBool::new(false),
            queue,
        }
    }

    /// Reports the outcome of chunk `index` that asked for `expected` bytes.
    pub(crate) fn report(&self, index: usize, expected: usize, result: io::Result<usize>) {
        match result {
            Ok(transferred) if transferred == expected => self.chunk_succeeded(index),
            Ok(transferred) => {
                tracing::error!(
                    request_id = self.request_id,
                    chunk = index,
                    expected,
                    transferred,
                    "chunk size mismatch"
                );
                self.chunk_failed();
            }
            Err(err) => {
                tracing::error!(
                    request_id = self.request_id,
                    chunk = index,
                    error = %err,
                    "chunk transfer failed"
                );
                self.chunk_failed();
            }
        }
    }

    fn chunk_succeeded(&self, index: usize) {
        let running = self.remaining.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(
            request_id = self.request_id,
            chunk = index,
            running = running - 1,
            "chunk succeeded"
        );

        if running == 1 {
            self.queue
                .push(CompletionEvent::new(self.request_id, ResponseCode::Success));
        }
    }

    fn chunk_failed(&self) {
        if !self.failed.swap(true, Ordering::AcqRel) {
            self.queue.push(CompletionEvent::new(
                self.request_id,
                ResponseCode::FileAccessError,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc, thread};

    use super::RequestTracker;
    use crate::{queue::CompletionQueue, CompletionEvent, ResponseCode};

    fn drain(queue: &CompletionQueue) -> Vec<CompletionEvent> {
        std::iter::from_fn(|| queue.try_pop().filter(|e| !e.is_finished())).collect()
    }

    #[test]
    fn all_chunks_succeed() {
        let queue = Arc::new(CompletionQueue::new(1));
        let tracker = RequestTracker::new(5, 3, queue.clone());

        tracker.report(0, 4, Ok(4));
        tracker.report(2, 6, Ok(6));
        assert_eq!(queue.try_pop(), None);

        tracker.report(1, 4, Ok(4));
        assert_eq!(drain(&queue), [CompletionEvent::new(5, ResponseCode::Success)]);
    }

    #[test]
    fn first_failure_wins_and_late_success_is_dropped() {
        let queue = Arc::new(CompletionQueue::new(1));
        let tracker = RequestTracker::new(9, 3, queue.clone());

        tracker.report(0, 4, Ok(4));
        tracker.report(1, 4, Err(io::Error::new(io::ErrorKind::Other, "reset")));
        tracker.report(1, 4, Ok(2));
        tracker.report(2, 4, Ok(4));

        queue.increment(1);
        assert_eq!(
            drain(&queue),
            [CompletionEvent::new(9, ResponseCode::FileAccessError)]
        );
    }

    #[test]
    fn short_transfer_is_a_failure() {
        let queue = Arc::new(CompletionQueue::new(1));
        let tracker = RequestTracker::new(1, 1, queue.clone());

        tracker.report(0, 4096, Ok(4095));
        assert_eq!(
            drain(&queue),
            [CompletionEvent::new(1, ResponseCode::FileAccessError)]
        );
    }

    #[test]
    fn concurrent_reports_emit_one_event() {
        for failing in [None, Some(17)] {
            let queue = Arc::new(CompletionQueue::new(2));
            let tracker = Arc::new(RequestTracker::new(3, 64, queue.clone()));

            let workers = (0..64)
                .map(|index| {
                    let tracker = tracker.clone();
                    thread::spawn(move || {
                        let result = if failing.is_some_and(|f| index >= f && index % 2 == 1) {
                            Err(io::Error::new(io::ErrorKind::Other, "boom"))
                        } else {
                            Ok(8)
                        };
                        tracker.report(index, 8, result)
                    })
                })
                .collect::<Vec<_>>();

            for worker in workers {
                worker.join().unwrap();
            }

            let expected = if failing.is_some() {
                ResponseCode::FileAccessError
            } else {
                ResponseCode::Success
            };
            assert_eq!(drain(&queue), [CompletionEvent::new(3, expected)]);
        }
    }
}
