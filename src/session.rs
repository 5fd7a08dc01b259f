use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::{Condvar, Mutex};
use tokio::{runtime::Handle, sync::Semaphore};

use crate::{
    config::ClientConfiguration, dispatch, queue::CompletionQueue, range::BlobTransfer,
    uri::BlobLocation, CompletionEvent, DestinationBuffer, ObjectRange, RequestId, ResponseCode,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    Blocking = 0,
    NonBlocking = 1,
}

///
/// Count of chunk tasks that still reference session state or caller buffers.
#[derive(Default)]
pub(crate) struct InflightTasks {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InflightTasks {
    pub(crate) fn enter(self: &Arc<Self>) -> InflightGuard {
        *self.count.lock() += 1;
        InflightGuard(Arc::clone(self))
    }

    pub(crate) fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// Held by a chunk task until it has reported.
pub(crate) struct InflightGuard(Arc<InflightTasks>);

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;

        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

///
/// State of one client: its completion queue, cancellation flag, transfer
/// primitive and chunking parameters.
///
/// Dropping a session stops it and waits until every chunk task it launched
/// has finished.
pub struct Session {
    pub(crate) config: ClientConfiguration,
    pub(crate) transfer: Arc<dyn BlobTransfer>,
    pub(crate) runtime: Handle,
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) queue: Arc<CompletionQueue>,
    pub(crate) inflight: Arc<InflightTasks>,
    stopped: AtomicBool,
    submitted: AtomicBool,
}

impl Session {
    pub fn new(config: ClientConfiguration, transfer: Arc<dyn BlobTransfer>, runtime: Handle) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            queue: Arc::new(CompletionQueue::default()),
            inflight: Arc::default(),
            stopped: AtomicBool::new(false),
            submitted: AtomicBool::new(false),
            config,
            transfer,
            runtime,
        }
    }

    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    /// Whether `config` resolves to the credentials this session was created with.
    pub fn verify_credentials(&self, config: &ClientConfiguration) -> bool {
        self.config.same_credentials(config)
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    ///
    /// Starts reading `range` of the object at `path` into `buffer`.
    ///
    /// Returns as soon as every chunk is launched. The outcome arrives later as
    /// exactly one completion event carrying `request_id`.
    pub fn submit_read(
        &self,
        path: &str,
        range: ObjectRange,
        buffer: DestinationBuffer,
        request_id: RequestId,
    ) -> ResponseCode {
        if self.is_stopped() {
            return ResponseCode::FinishedError;
        }

        let location = match BlobLocation::parse(path) {
            Ok(location) => location,
            Err(err) => {
                tracing::warn!(request_id, error = %err, "rejecting read request");
                return ResponseCode::InvalidParameterError;
            }
        };

        if buffer.len() != range.length {
            tracing::warn!(
                request_id,
                buffer = buffer.len(),
                length = range.length,
                "destination buffer does not match the requested range"
            );
            return ResponseCode::InvalidParameterError;
        }

        if range.offset.checked_add(range.length).is_none() {
            tracing::warn!(
                request_id,
                offset = range.offset,
                length = range.length,
                "requested range overflows"
            );
            return ResponseCode::InvalidParameterError;
        }

        self.submitted.store(true, Ordering::Release);
        self.queue.increment(1);

        dispatch::dispatch(self, location, range, buffer, request_id)
    }

    /// Blocks until the next request of this session completes.
    pub fn await_next_completion(&self) -> CompletionEvent {
        if !self.has_submitted() {
            return CompletionEvent::finished();
        }

        self.queue.pop()
    }

    pub fn try_next_completion(&self) -> Option<CompletionEvent> {
        if !self.has_submitted() {
            return Some(CompletionEvent::finished());
        }

        self.queue.try_pop()
    }

    ///
    /// Fills `events` with completions.
    ///
    /// `Blocking` waits for the first event, then takes whatever else is
    /// already queued. `NonBlocking` only takes what is queued. Returns
    /// `FinishedError` when no event could be retrieved because the session is
    /// stopped or nothing is outstanding.
    pub fn wait_for_completions(
        &self,
        events: &mut [CompletionEvent],
        mode: WaitMode,
    ) -> (ResponseCode, usize) {
        if events.is_empty() {
            return (ResponseCode::Success, 0);
        }

        let mut retrieved = 0;
        let mut next = match mode {
            WaitMode::Blocking => Some(self.await_next_completion()),
            WaitMode::NonBlocking => self.try_next_completion(),
        };

        while let Some(event) = next {
            if event.is_finished() {
                if retrieved == 0 {
                    return (ResponseCode::FinishedError, 0);
                }
                break;
            }

            events[retrieved] = event;
            retrieved += 1;

            if retrieved == events.len() {
                break;
            }

            next = self.queue.try_pop();
        }

        (ResponseCode::Success, retrieved)
    }

    /// Idempotent, callable from any thread.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.queue.stop();
    }

    /// Stops the session and waits for its chunk tasks to finish.
    pub fn shutdown(&self) {
        self.stop();
        self.inflight.wait_idle();
    }

    fn has_submitted(&self) -> bool {
        let submitted = self.submitted.load(Ordering::Acquire);
        if !submitted && !self.is_stopped() {
            tracing::warn!("waiting for completions before any read was requested");
        }
        submitted
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
