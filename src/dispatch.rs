use std::{io, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;

use crate::{
    aggregate::RequestTracker, chunk, session::Session, uri::BlobLocation, DestinationBuffer,
    ObjectRange, RequestId, ResponseCode,
};

///
/// Splits one request into chunks and launches a task per chunk on the
/// session's runtime.
///
/// Each task waits for a concurrency permit, transfers its chunk straight into
/// its slice of `buffer` and reports to the request's tracker exactly once,
/// whether the transfer succeeded, failed or panicked. Launching stops as soon
/// as the session is stopped; chunks already launched still run and report.
pub(crate) fn dispatch(
    session: &Session,
    location: BlobLocation,
    range: ObjectRange,
    buffer: DestinationBuffer,
    request_id: RequestId,
) -> ResponseCode {
    let chunks = chunk::partition(range, session.config.chunk_size, buffer);
    let tracker = Arc::new(RequestTracker::new(
        request_id,
        chunks.len(),
        session.queue.clone(),
    ));
    let location = Arc::new(location);

    tracing::debug!(
        request_id,
        %location,
        offset = range.offset,
        length = range.length,
        chunks = chunks.len(),
        "dispatching read"
    );

    for chunk in chunks {
        // must precede the stop check, `Session::shutdown` relies on it
        let guard = session.inflight.enter();
        if session.is_stopped() {
            drop(guard);
            tracing::debug!(
                request_id,
                launched = chunk.index,
                "dispatch interrupted by stop"
            );
            return ResponseCode::FinishedError;
        }

        let transfer = session.transfer.clone();
        let permits = session.permits.clone();
        let tracker = tracker.clone();
        let location = location.clone();

        session.runtime.spawn(async move {
            let _guard = guard;
            let chunk::Chunk {
                index,
                range,
                mut buf,
            } = chunk;

            tracing::trace!(
                request_id,
                chunk = index,
                offset = range.offset,
                length = range.length,
                "chunk started"
            );

            let result = match permits.acquire_owned().await {
                Ok(_permit) => AssertUnwindSafe(async {
                    transfer
                        .read_range(&location, range.offset as u64, buf.as_mut_slice())
                        .await
                })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "transfer panicked"))),
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::Other,
                    "concurrency limiter closed",
                )),
            };

            tracker.report(index, range.length, result);
        });
    }

    ResponseCode::Success
}
