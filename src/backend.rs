use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};

use crate::{config::ClientConfiguration, range::BlobTransfer, session::Session};

/// Unique within the process, never reused.
pub type ClientId = u64;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to start transfer runtime: {0}")]
    Runtime(#[from] io::Error),

    #[error("unknown client: {0}")]
    UnknownClient(ClientId),
}

/// Whether closing a backend waits for outstanding work.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownPolicy {
    DrainOnClose = 0,
    DiscardOnClose = 1,
}

#[derive(Clone, Debug, Default)]
pub struct BackendOptions {
    /// Runtime worker threads, tokio's default when `None`
    pub worker_threads: Option<usize>,
}

///
/// Owns the transfer runtime and every live client session.
pub struct Backend {
    clients: Mutex<HashMap<ClientId, Arc<Session>>>,
    runtime: Option<Runtime>,
}

impl Backend {
    pub const SHUTDOWN_POLICY: ShutdownPolicy = ShutdownPolicy::DrainOnClose;

    pub fn open(options: BackendOptions) -> Result<Self, BackendError> {
        let mut builder = Builder::new_multi_thread();
        builder.thread_name("blob-streamer-chunk").enable_all();

        if let Some(threads) = options.worker_threads {
            builder.worker_threads(threads);
        }

        Ok(Self {
            clients: Mutex::default(),
            runtime: Some(builder.build()?),
        })
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        Self::SHUTDOWN_POLICY
    }

    pub fn create_client(
        &self,
        config: ClientConfiguration,
        transfer: Arc<dyn BlobTransfer>,
    ) -> Result<ClientId, BackendError> {
        let handle = match &self.runtime {
            Some(runtime) => runtime.handle().clone(),
            None => return Err(BackendError::Runtime(io::ErrorKind::NotConnected.into())),
        };

        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            client = id,
            chunk_size = config.chunk_size,
            max_concurrency = config.max_concurrency,
            "creating client"
        );

        let session = Arc::new(Session::new(config, transfer, handle));
        self.clients.lock().insert(id, session);

        Ok(id)
    }

    pub fn client(&self, id: ClientId) -> Option<Arc<Session>> {
        self.clients.lock().get(&id).cloned()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Stops the session, waits for its chunk tasks and forgets it.
    pub fn remove_client(&self, id: ClientId) -> Result<(), BackendError> {
        let session = self
            .clients
            .lock()
            .remove(&id)
            .ok_or(BackendError::UnknownClient(id))?;

        tracing::debug!(client = id, "removing client");
        session.shutdown();

        Ok(())
    }

    /// Stops every session so callers parked on their queues wake up.
    pub fn cancel_all_reads(&self) {
        for session in self.sessions() {
            session.stop();
        }
    }

    pub fn remove_all_clients(&self) {
        let ids = self.clients.lock().keys().copied().collect::<Vec<_>>();

        for id in ids {
            if let Err(err) = self.remove_client(id) {
                tracing::warn!(client = id, error = %err, "failed to remove client");
            }
        }
    }

    /// Removes every client, then stops the runtime.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn sessions(&self) -> Vec<Arc<Session>> {
        self.clients.lock().values().cloned().collect()
    }

    fn shutdown(&mut self) {
        self.remove_all_clients();

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
