//! C boundary of the object storage backend.
//!
//! Backend handles own one [`Backend`]. Client handles are opaque client ids
//! and are resolved against every open backend, so a handle whose client was
//! already removed is reported as an invalid parameter instead of dangling.

use std::{
    ffi::{c_char, c_uint, CStr},
    panic::{catch_unwind, AssertUnwindSafe},
    slice,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use crate::{
    backend::{Backend, BackendOptions, ClientId, ShutdownPolicy},
    config::{ClientConfiguration, ConfigError},
    local::LocalBlobStore,
    session::{Session, WaitMode},
    CompletionEvent, DestinationBuffer, ObjectRange, RequestId, ResponseCode,
};

const LOG_ENV: &str = "BLOB_STREAMER_LOG";

pub enum ObjBackend {}
pub enum ObjClient {}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ObjectConfigParam {
    pub key: *const c_char,
    pub value: *const c_char,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ObjectClientConfig {
    pub initial_params: *const ObjectConfigParam,
    pub num_initial_params: usize,
    /// Optional, overrides any endpoint given in the parameters
    pub endpoint_url: *const c_char,
    pub default_storage_chunk_size: usize,
}

/// Backends the handle-less bulk operations fan out to.
static OPEN_BACKENDS: Mutex<Vec<Arc<Backend>>> = parking_lot::const_mutex(Vec::new());

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    // the host may already have installed a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn with_boundary<F>(f: F) -> ResponseCode
where
    F: FnOnce() -> Result<(), ResponseCode>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => ResponseCode::Success,
        Ok(Err(code)) => code,
        Err(_) => {
            tracing::error!("panic across FFI boundary");
            ResponseCode::UnknownError
        }
    }
}

fn invalid(what: &str) -> ResponseCode {
    tracing::warn!("{}", what);
    ResponseCode::InvalidParameterError
}

fn map_config(err: ConfigError) -> ResponseCode {
    tracing::warn!(error = %err, "invalid client configuration");
    ResponseCode::InvalidParameterError
}

/// # Safety
/// `ptr` must be null or point to a nul terminated string valid for `'a`.
unsafe fn c_str<'a>(ptr: *const c_char) -> Option<Result<&'a str, ConfigError>> {
    if ptr.is_null() {
        return None;
    }

    Some(
        unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map_err(|_| ConfigError::InvalidUtf8),
    )
}

fn open_backends() -> Vec<Arc<Backend>> {
    OPEN_BACKENDS.lock().clone()
}

fn client_id(handle: *mut ObjClient) -> ClientId {
    handle as usize as ClientId
}

fn find_client(handle: *mut ObjClient) -> Result<Arc<Session>, ResponseCode> {
    let id = client_id(handle);

    open_backends()
        .iter()
        .find_map(|backend| backend.client(id))
        .ok_or_else(|| invalid("unknown client handle"))
}

/// # Safety
/// `config` must be valid, as must every parameter it points to.
unsafe fn resolve_config(config: &ObjectClientConfig) -> Result<ClientConfiguration, ConfigError> {
    let params: &[ObjectConfigParam] = if config.num_initial_params == 0 {
        &[]
    } else if config.initial_params.is_null() {
        return Err(ConfigError::NullParameter(0));
    } else {
        unsafe { slice::from_raw_parts(config.initial_params, config.num_initial_params) }
    };

    let mut pairs = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let key = unsafe { c_str(param.key) }.ok_or(ConfigError::NullParameter(i))??;
        let value = unsafe { c_str(param.value) }.ok_or(ConfigError::NullParameter(i))??;
        pairs.push((key, value));
    }

    let endpoint_url = unsafe { c_str(config.endpoint_url) }.transpose()?;

    ClientConfiguration::from_params(pairs, endpoint_url, config.default_storage_chunk_size)
}

#[no_mangle]
/// # Safety
/// - `out_backend` must be non-null and writable.
/// - On success, `*out_backend` must be released with `obj_close_backend` exactly once.
pub unsafe extern "C" fn obj_open_backend(out_backend: *mut *mut ObjBackend) -> ResponseCode {
    init_logging();

    with_boundary(|| {
        if out_backend.is_null() {
            return Err(invalid("out_backend is null"));
        }

        let backend = Backend::open(BackendOptions::default()).map_err(|err| {
            tracing::error!(error = %err, "failed to open backend");
            ResponseCode::UnknownError
        })?;
        let backend = Arc::new(backend);

        OPEN_BACKENDS.lock().push(backend.clone());
        unsafe { *out_backend = Box::into_raw(Box::new(backend)) as *mut ObjBackend };
        Ok(())
    })
}

#[no_mangle]
/// # Safety
/// - `backend` must be a pointer returned by `obj_open_backend`.
/// - `backend` must not be used after this call, nor closed more than once.
pub unsafe extern "C" fn obj_close_backend(backend: *mut ObjBackend) -> ResponseCode {
    with_boundary(|| {
        if backend.is_null() {
            return Err(invalid("backend is null"));
        }

        let backend = *unsafe { Box::from_raw(backend as *mut Arc<Backend>) };
        OPEN_BACKENDS
            .lock()
            .retain(|open| !Arc::ptr_eq(open, &backend));

        match Arc::try_unwrap(backend) {
            Ok(backend) => backend.close(),
            // a concurrent call still holds it and closes it on release
            Err(shared) => shared.remove_all_clients(),
        }
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn obj_get_backend_shutdown_policy() -> ShutdownPolicy {
    Backend::SHUTDOWN_POLICY
}

#[no_mangle]
/// # Safety
/// - `backend` must be a live pointer returned by `obj_open_backend`.
/// - `config` must be non-null; its parameter array must hold `num_initial_params`
///   entries of nul terminated strings, and `endpoint_url` must be null or nul terminated.
/// - `out_client` must be non-null and writable.
pub unsafe extern "C" fn obj_create_client(
    backend: *mut ObjBackend,
    config: *const ObjectClientConfig,
    out_client: *mut *mut ObjClient,
) -> ResponseCode {
    with_boundary(|| {
        if backend.is_null() {
            return Err(invalid("backend is null"));
        }
        if config.is_null() {
            return Err(invalid("config is null"));
        }
        if out_client.is_null() {
            return Err(invalid("out_client is null"));
        }

        let backend = unsafe { &*(backend as *const Arc<Backend>) };
        let config = unsafe { resolve_config(&*config) }.map_err(map_config)?;
        let store = LocalBlobStore::from_endpoint(config.credentials.endpoint.as_deref())
            .map_err(map_config)?;

        let id = backend
            .create_client(config, Arc::new(store))
            .map_err(|err| {
                tracing::error!(error = %err, "failed to create client");
                ResponseCode::UnknownError
            })?;

        unsafe { *out_client = id as usize as *mut ObjClient };
        Ok(())
    })
}

#[no_mangle]
/// # Safety
/// `client` must be a handle returned by `obj_create_client`.
pub unsafe extern "C" fn obj_remove_client(client: *mut ObjClient) -> ResponseCode {
    with_boundary(|| {
        let id = client_id(client);

        if open_backends()
            .iter()
            .any(|backend| backend.remove_client(id).is_ok())
        {
            Ok(())
        } else {
            Err(invalid("unknown client handle"))
        }
    })
}

#[no_mangle]
/// # Safety
/// - `client` must be a handle returned by `obj_create_client`.
/// - `path` must be a nul terminated string.
/// - `destination_buffer` must be valid for writes of `range.length` bytes and must
///   not be touched by the caller until the completion of `request_id` is retrieved
///   or the client is removed.
pub unsafe extern "C" fn obj_request_read(
    client: *mut ObjClient,
    path: *const c_char,
    range: ObjectRange,
    destination_buffer: *mut c_char,
    request_id: RequestId,
) -> ResponseCode {
    with_boundary(|| {
        let path = match unsafe { c_str(path) } {
            Some(Ok(path)) => path,
            Some(Err(_)) => return Err(invalid("path is not valid utf-8")),
            None => return Err(invalid("path is null")),
        };

        let buffer =
            unsafe { DestinationBuffer::from_raw_parts(destination_buffer as *mut u8, range.length) }
                .ok_or_else(|| invalid("destination_buffer is null"))?;

        match find_client(client)?.submit_read(path, range, buffer, request_id) {
            ResponseCode::Success => Ok(()),
            code => Err(code),
        }
    })
}

#[no_mangle]
/// # Safety
/// - `client` must be a handle returned by `obj_create_client`.
/// - `event_buffer` must be writable for `max_events_to_retrieve` events.
/// - `out_num_events_retrieved` must be non-null and writable.
pub unsafe extern "C" fn obj_wait_for_completions(
    client: *mut ObjClient,
    event_buffer: *mut CompletionEvent,
    max_events_to_retrieve: c_uint,
    out_num_events_retrieved: *mut c_uint,
    wait_mode: WaitMode,
) -> ResponseCode {
    with_boundary(|| {
        if out_num_events_retrieved.is_null() {
            return Err(invalid("out_num_events_retrieved is null"));
        }
        unsafe { *out_num_events_retrieved = 0 };

        let events: &mut [CompletionEvent] = if max_events_to_retrieve == 0 {
            &mut []
        } else if event_buffer.is_null() {
            return Err(invalid("event_buffer is null"));
        } else {
            unsafe { slice::from_raw_parts_mut(event_buffer, max_events_to_retrieve as usize) }
        };

        let (code, retrieved) = find_client(client)?.wait_for_completions(events, wait_mode);
        unsafe { *out_num_events_retrieved = retrieved as c_uint };

        match code {
            ResponseCode::Success => Ok(()),
            code => Err(code),
        }
    })
}

/// Stops every client of every open backend, waking all waiting callers.
#[no_mangle]
pub extern "C" fn obj_cancel_all_reads() -> ResponseCode {
    with_boundary(|| {
        for backend in open_backends() {
            backend.cancel_all_reads();
        }
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn obj_remove_all_clients() -> ResponseCode {
    with_boundary(|| {
        for backend in open_backends() {
            backend.remove_all_clients();
        }
        Ok(())
    })
}
