use std::{ffi::CString, ptr};

use blob_streamer::{
    ffi::{
        obj_cancel_all_reads, obj_close_backend, obj_create_client, obj_get_backend_shutdown_policy,
        obj_open_backend, obj_remove_all_clients, obj_remove_client, obj_request_read,
        obj_wait_for_completions, ObjBackend, ObjClient, ObjectClientConfig, ObjectConfigParam,
    },
    CompletionEvent, ObjectRange, ResponseCode, ShutdownPolicy, WaitMode,
};

const BLOB_LEN: usize = 50630;

fn open_backend() -> *mut ObjBackend {
    let mut backend = ptr::null_mut();
    assert_eq!(unsafe { obj_open_backend(&mut backend) }, ResponseCode::Success);
    assert!(!backend.is_null());
    backend
}

fn create_client(
    backend: *mut ObjBackend,
    params: &[(&str, &str)],
    endpoint_url: Option<&str>,
    chunk_size: usize,
) -> (ResponseCode, *mut ObjClient) {
    let strings = params
        .iter()
        .map(|(k, v)| (CString::new(*k).unwrap(), CString::new(*v).unwrap()))
        .collect::<Vec<_>>();
    let params = strings
        .iter()
        .map(|(k, v)| ObjectConfigParam {
            key: k.as_ptr(),
            value: v.as_ptr(),
        })
        .collect::<Vec<_>>();
    let endpoint_url = endpoint_url.map(|e| CString::new(e).unwrap());

    let config = ObjectClientConfig {
        initial_params: params.as_ptr(),
        num_initial_params: params.len(),
        endpoint_url: endpoint_url.as_ref().map_or(ptr::null(), |e| e.as_ptr()),
        default_storage_chunk_size: chunk_size,
    };

    let mut client = ptr::null_mut();
    let code = unsafe { obj_create_client(backend, &config, &mut client) };
    (code, client)
}

fn request_read(client: *mut ObjClient, path: &str, data: &mut [u8], id: u64) -> ResponseCode {
    let path = CString::new(path).unwrap();
    unsafe {
        obj_request_read(
            client,
            path.as_ptr(),
            ObjectRange::new(0, data.len()),
            data.as_mut_ptr() as *mut _,
            id,
        )
    }
}

fn wait(client: *mut ObjClient, max: usize, mode: WaitMode) -> (ResponseCode, Vec<CompletionEvent>) {
    let mut events = vec![CompletionEvent::finished(); max];
    let mut retrieved = 0;

    let code = unsafe {
        obj_wait_for_completions(
            client,
            events.as_mut_ptr(),
            max as _,
            &mut retrieved,
            mode,
        )
    };

    events.truncate(retrieved as usize);
    (code, events)
}

#[test]
fn client_lifecycle_through_the_boundary() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("models")).unwrap();
    let blob = (0..BLOB_LEN as u32).map(|x| x as u8).collect::<Vec<u8>>();
    std::fs::write(dir.path().join("models/weights.bin"), &blob).unwrap();

    assert_eq!(obj_get_backend_shutdown_policy(), ShutdownPolicy::DrainOnClose);

    let backend = open_backend();
    let endpoint = format!("file://{}", dir.path().display());
    let (code, client) = create_client(
        backend,
        &[("endpoint", endpoint.as_str()), ("max_concurrency", "4")],
        None,
        1024,
    );
    assert_eq!(code, ResponseCode::Success);

    // whole blob in 49 chunks
    let mut data = vec![0u8; BLOB_LEN];
    assert_eq!(
        request_read(client, "az://models/weights.bin", &mut data, 7),
        ResponseCode::Success
    );
    let (code, events) = wait(client, 4, WaitMode::Blocking);
    assert_eq!(code, ResponseCode::Success);
    assert_eq!(events, [CompletionEvent::new(7, ResponseCode::Success)]);
    assert_eq!(data, blob);

    // transfer errors surface as one completion event
    let mut missing = vec![0u8; 4096];
    assert_eq!(
        request_read(client, "az://models/absent.bin", &mut missing, 8),
        ResponseCode::Success
    );
    let (code, events) = wait(client, 4, WaitMode::Blocking);
    assert_eq!(code, ResponseCode::Success);
    assert_eq!(events, [CompletionEvent::new(8, ResponseCode::FileAccessError)]);

    assert_eq!(
        request_read(client, "gs://models/weights.bin", &mut missing, 9),
        ResponseCode::InvalidParameterError
    );

    // nothing outstanding
    let (code, events) = wait(client, 4, WaitMode::NonBlocking);
    assert_eq!(code, ResponseCode::FinishedError);
    assert!(events.is_empty());

    assert_eq!(obj_cancel_all_reads(), ResponseCode::Success);
    assert_eq!(
        request_read(client, "az://models/weights.bin", &mut data, 10),
        ResponseCode::FinishedError
    );
    let (code, _) = wait(client, 4, WaitMode::Blocking);
    assert_eq!(code, ResponseCode::FinishedError);

    assert_eq!(obj_remove_all_clients(), ResponseCode::Success);
    assert_eq!(
        request_read(client, "az://models/weights.bin", &mut data, 11),
        ResponseCode::InvalidParameterError
    );
    assert_eq!(
        unsafe { obj_remove_client(client) },
        ResponseCode::InvalidParameterError
    );

    assert_eq!(unsafe { obj_close_backend(backend) }, ResponseCode::Success);
}

#[test]
fn malformed_configuration_is_rejected() {
    let backend = open_backend();

    let (code, _) = create_client(backend, &[], Some("/srv/blobs"), 0);
    assert_eq!(code, ResponseCode::InvalidParameterError);

    let (code, _) = create_client(
        backend,
        &[("max_concurrency", "many")],
        Some("/srv/blobs"),
        1024,
    );
    assert_eq!(code, ResponseCode::InvalidParameterError);

    let (code, _) = create_client(
        backend,
        &[],
        Some("https://account.blob.core.windows.net"),
        1024,
    );
    assert_eq!(code, ResponseCode::InvalidParameterError);

    let mut client = ptr::null_mut();
    assert_eq!(
        unsafe { obj_create_client(backend, ptr::null(), &mut client) },
        ResponseCode::InvalidParameterError
    );

    assert_eq!(unsafe { obj_close_backend(backend) }, ResponseCode::Success);
}
