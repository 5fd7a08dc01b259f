mod aggregate;
mod backend;
mod chunk;
mod config;
mod dispatch;
mod local;
mod queue;
mod range;
mod session;
mod uri;

pub mod ffi;

pub use backend::{Backend, BackendError, BackendOptions, ClientId, ShutdownPolicy};
pub use chunk::{chunk_ranges, partition, Chunk, ChunkBuffer, ChunkRange, DestinationBuffer};
pub use config::{ClientConfiguration, ConfigError, Credentials, DEFAULT_MAX_CONCURRENCY};
pub use local::LocalBlobStore;
pub use queue::CompletionQueue;
pub use range::{BlobTransfer, ObjectRange};
pub use session::{Session, WaitMode};
pub use uri::{BlobLocation, UriError};

/// Caller supplied identifier of one logical read request.
pub type RequestId = u64;

///
/// Status codes reported at the backend boundary, both as the immediate
/// return value of an operation and as the outcome of a completion event.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Success = 0,
    /// The session was stopped, or there is nothing left to wait for
    FinishedError = 1,
    /// A chunk transfer failed or delivered fewer bytes than requested
    FileAccessError = 2,
    InvalidParameterError = 3,
    UnknownError = 4,
}

///
/// Terminal outcome of one logical request.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletionEvent {
    pub request_id: RequestId,
    pub response_code: ResponseCode,
}

impl CompletionEvent {
    pub fn new(request_id: RequestId, response_code: ResponseCode) -> Self {
        Self {
            request_id,
            response_code,
        }
    }

    /// Event handed out by a stopped or exhausted queue.
    pub fn finished() -> Self {
        Self::new(0, ResponseCode::FinishedError)
    }

    /// Real outcomes are only ever `Success` or `FileAccessError`, so a
    /// `FinishedError` event always comes from the queue itself.
    pub fn is_finished(&self) -> bool {
        self.response_code == ResponseCode::FinishedError
    }
}
