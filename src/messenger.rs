//! Request/response multiplexing over a single broker connection.
//!
//! Every request gets a correlation id; a background task reads size-prefixed
//! frames and routes each response to the waiting caller. Any framing error
//! poisons the connection and fails all pending and future requests.

use std::{
    collections::HashMap,
    io::Cursor,
    ops::DerefMut,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf},
    sync::{oneshot::channel, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    messages::{
        ApiVersionsRequest, ReadVersionedError, ReadVersionedType, RequestBody, RequestHeader,
        ResponseHeader, WriteVersionedError, WriteVersionedType,
    },
};

/// Request header version. None of the spoken APIs use flexible encodings.
const REQUEST_HEADER_VERSION: ApiVersion = ApiVersion(1);

/// Response header version, paired with [`REQUEST_HEADER_VERSION`].
const RESPONSE_HEADER_VERSION: ApiVersion = ApiVersion(0);

#[derive(Debug)]
struct Response {
    #[allow(dead_code)]
    header: ResponseHeader,
    data: Cursor<Vec<u8>>,
}

#[derive(Debug)]
struct ActiveRequest {
    channel: tokio::sync::oneshot::Sender<Result<Response, RequestError>>,
}

#[derive(Debug)]
enum MessengerState {
    /// Currently active requests by correlation ID.
    RequestMap(HashMap<i32, ActiveRequest>),

    /// One or our streams died and we are unable to process any more requests.
    Poison(Arc<FrameError>),
}

impl MessengerState {
    fn poison(&mut self, err: FrameError) -> Arc<FrameError> {
        let err = Arc::new(err);

        match std::mem::replace(self, Self::Poison(Arc::clone(&err))) {
            Self::RequestMap(map) => {
                for (_correlation_id, active_request) in map {
                    // it's OK if the other side is gone
                    active_request
                        .channel
                        .send(Err(RequestError::Poisoned(Arc::clone(&err))))
                        .ok();
                }
            }
            Self::Poison(e) => {
                // already poisoned, keep the original reason
                *self = Self::Poison(Arc::clone(&e));
                return e;
            }
        }

        err
    }
}

/// Failure reading or writing a length-prefixed frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Cannot read/write data: {0}")]
    IO(#[from] std::io::Error),

    #[error("Negative message size: {size}")]
    NegativeMessageSize { size: i32 },

    #[error("Message too large, limit is {limit} bytes but got {actual} bytes")]
    MessageTooLarge { limit: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Cannot find matching version for: {api_key:?}")]
    NoVersionMatch { api_key: ApiKey },

    #[error("Cannot write data: {0}")]
    WriteError(#[from] WriteVersionedError),

    #[error("Cannot write framed message: {0}")]
    IO(#[from] std::io::Error),

    #[error("Cannot read data: {0}")]
    ReadError(#[from] ReadVersionedError),

    #[error(
        "Data left at the end of the message. Got {message_size} bytes but only read {read} bytes. api_key={api_key:?} api_version={api_version}"
    )]
    TooMuchData {
        message_size: u64,
        read: u64,
        api_key: ApiKey,
        api_version: ApiVersion,
    },

    #[error("Connection is poisoned: {0}")]
    Poisoned(Arc<FrameError>),

    #[error("No response to {api_key:?} within {timeout:?}")]
    Timeout { api_key: ApiKey, timeout: Duration },
}

impl RequestError {
    /// True if the connection this error came from cannot be used any more.
    pub fn is_broken_connection(&self) -> bool {
        matches!(self, Self::IO(_) | Self::Poisoned(_) | Self::Timeout { .. })
    }
}

#[derive(Error, Debug)]
pub enum SyncVersionsError {
    #[error("Did not found a version for ApiVersion that works with that broker")]
    NoWorkingVersion,

    #[error("Request error: {0}")]
    RequestError(#[from] RequestError),

    #[error("Got flipped version from server for API key {api_key:?}: min={min} max={max}")]
    FlippedVersionRange {
        api_key: ApiKey,
        min: ApiVersion,
        max: ApiVersion,
    },
}

/// A connection to a single broker.
///
/// Note: Requests to the same [`Messenger`] will be pipelined by Kafka.
pub struct Messenger<RW> {
    /// The half of the stream that we use to send data TO the broker.
    ///
    /// This will be used by [`request`](Self::request) to queue up messages.
    stream_write: Arc<AsyncMutex<WriteHalf<RW>>>,

    /// Client ID.
    client_id: Arc<str>,

    /// The next correlation ID.
    ///
    /// This is used to map responses to active requests.
    correlation_id: AtomicI32,

    /// Version ranges that we think are supported by the broker.
    ///
    /// This needs to be bootstrapped by [`sync_versions`](Self::sync_versions).
    version_ranges: RwLock<HashMap<ApiKey, ApiVersionRange>>,

    /// Current stream state.
    ///
    /// Note that this and `stream_write` are separate struct to allow sending and receiving data concurrently.
    state: Arc<Mutex<MessengerState>>,

    /// How long a caller waits for its response.
    request_timeout: Duration,

    /// Join handle for the background worker that fetches responses.
    join_handle: JoinHandle<()>,
}

impl<RW> std::fmt::Debug for Messenger<RW> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("client_id", &self.client_id)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl<RW> Messenger<RW>
where
    RW: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(
        stream: RW,
        max_message_size: usize,
        client_id: Arc<str>,
        request_timeout: Duration,
    ) -> Self {
        let (mut stream_read, stream_write) = tokio::io::split(stream);
        let state = Arc::new(Mutex::new(MessengerState::RequestMap(HashMap::default())));
        let state_captured = Arc::clone(&state);

        let join_handle = tokio::spawn(async move {
            loop {
                match read_frame(&mut stream_read, max_message_size).await {
                    Ok(msg) => {
                        // message was read, so all subsequent errors should not poison the whole stream
                        let mut cursor = Cursor::new(msg);
                        let header =
                            match ResponseHeader::read_versioned(&mut cursor, RESPONSE_HEADER_VERSION)
                            {
                                Ok(header) => header,
                                Err(e) => {
                                    warn!(%e, "Cannot read message header, ignoring message");
                                    continue;
                                }
                            };

                        let active_request = {
                            let mut state = state_captured.lock();
                            match state.deref_mut() {
                                MessengerState::RequestMap(map) => {
                                    map.remove(&header.correlation_id)
                                }
                                MessengerState::Poison(_) => None,
                            }
                        };

                        match active_request {
                            Some(active_request) => {
                                // we don't care if the other side is gone
                                active_request
                                    .channel
                                    .send(Ok(Response {
                                        header,
                                        data: cursor,
                                    }))
                                    .ok();
                            }
                            None => {
                                warn!(
                                    correlation_id = header.correlation_id,
                                    "Got response for unknown request",
                                );
                            }
                        }
                    }
                    Err(e) => {
                        state_captured.lock().poison(e);
                        return;
                    }
                }
            }
        });

        Self {
            stream_write: Arc::new(AsyncMutex::new(stream_write)),
            client_id,
            correlation_id: AtomicI32::new(0),
            version_ranges: RwLock::new(HashMap::new()),
            state,
            request_timeout,
            join_handle,
        }
    }

    #[cfg(test)]
    fn override_version_ranges(&self, ranges: HashMap<ApiKey, ApiVersionRange>) {
        self.set_version_ranges(ranges);
    }

    fn set_version_ranges(&self, ranges: HashMap<ApiKey, ApiVersionRange>) {
        *self.version_ranges.write() = ranges;
    }

    pub async fn request<R>(&self, msg: R) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        let body_api_version = self
            .version_ranges
            .read()
            .get(&R::API_KEY)
            .and_then(|range_server| R::API_VERSION_RANGE.highest_common(range_server))
            .ok_or(RequestError::NoVersionMatch {
                api_key: R::API_KEY,
            })?;

        // determine correlation ID
        // Note: fetch_add wraps around on overflow
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst);

        let header = RequestHeader {
            request_api_key: R::API_KEY,
            request_api_version: body_api_version,
            correlation_id,
            client_id: Some(String::from(self.client_id.as_ref())),
        };

        let mut buf = Vec::new();
        header.write_versioned(&mut buf, REQUEST_HEADER_VERSION)?;
        msg.write_versioned(&mut buf, body_api_version)?;

        let (tx, rx) = channel();

        // to prevent stale data in inner state, ensure that we remove the request again if we are cancelled
        let _cleanup_on_cancel = CleanupRequestStateOnCancel {
            state: Arc::clone(&self.state),
            correlation_id,
        };

        {
            let mut state = self.state.lock();
            match state.deref_mut() {
                MessengerState::RequestMap(map) => {
                    map.insert(correlation_id, ActiveRequest { channel: tx });
                }
                MessengerState::Poison(e) => {
                    return Err(RequestError::Poisoned(Arc::clone(e)));
                }
            }
        }

        self.send_message(buf).await?;

        let mut response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(res)) => res?,
            Ok(Err(_)) => {
                // sender dropped without answering, the read loop is gone
                return Err(self.poison(FrameError::IO(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection closed",
                ))));
            }
            Err(_) => {
                return Err(RequestError::Timeout {
                    api_key: R::API_KEY,
                    timeout: self.request_timeout,
                })
            }
        };

        let body = R::ResponseBody::read_versioned(&mut response.data, body_api_version)?;

        // check if we fully consumed the message, otherwise there might be a bug in our protocol code
        let read_bytes = response.data.position();
        let message_bytes = response.data.into_inner().len() as u64;
        if read_bytes != message_bytes {
            return Err(RequestError::TooMuchData {
                message_size: message_bytes,
                read: read_bytes,
                api_key: R::API_KEY,
                api_version: body_api_version,
            });
        }

        Ok(body)
    }

    async fn send_message(&self, msg: Vec<u8>) -> Result<(), RequestError> {
        match self.send_message_inner(msg).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // a partial write leaves the stream in an unknown state
                let reason = FrameError::IO(std::io::Error::new(e.kind(), e.to_string()));
                self.poison(reason);
                Err(RequestError::IO(e))
            }
        }
    }

    async fn send_message_inner(&self, msg: Vec<u8>) -> Result<(), std::io::Error> {
        let len = i32::try_from(msg.len())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let mut stream_write = self.stream_write.lock().await;
        stream_write.write_all(&len.to_be_bytes()).await?;
        stream_write.write_all(&msg).await?;
        stream_write.flush().await?;

        Ok(())
    }

    /// Negotiates the API versions with the broker.
    ///
    /// Tries `ApiVersions` from the highest version down, since older brokers
    /// answer unknown versions with an error or a v0 body.
    pub async fn sync_versions(&self) -> Result<(), SyncVersionsError> {
        let range = ApiVersionsRequest::API_VERSION_RANGE;
        for upper_bound in (range.min().0..=range.max().0).rev() {
            self.set_version_ranges(HashMap::from([(
                ApiKey::ApiVersions,
                ApiVersionRange::new(upper_bound, upper_bound),
            )]));

            match self.request(ApiVersionsRequest).await {
                Ok(response) => {
                    if let Some(e) = response.error_code {
                        debug!(
                            %e,
                            version = upper_bound,
                            "Got error during version sync, cannot use version for ApiVersionRequest",
                        );
                        continue;
                    }

                    if let Some(k) = response
                        .api_keys
                        .iter()
                        .find(|k| k.min_version > k.max_version)
                    {
                        return Err(SyncVersionsError::FlippedVersionRange {
                            api_key: k.api_key,
                            min: k.min_version,
                            max: k.max_version,
                        });
                    }

                    let ranges: HashMap<_, _> = response.ranges().collect();
                    debug!(
                        versions = ranges.len(),
                        version = upper_bound,
                        "Detected supported broker versions",
                    );
                    self.set_version_ranges(ranges);

                    return Ok(());
                }
                Err(e @ (RequestError::ReadError(_) | RequestError::TooMuchData { .. })) => {
                    debug!(
                        %e,
                        version = upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(e) => return Err(SyncVersionsError::RequestError(e)),
            }
        }

        Err(SyncVersionsError::NoWorkingVersion)
    }

    fn poison(&self, err: FrameError) -> RequestError {
        RequestError::Poisoned(self.state.lock().poison(err))
    }
}

impl<RW> Drop for Messenger<RW> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

/// Reads one size-prefixed frame.
async fn read_frame<R>(reader: &mut R, max_message_size: usize) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let size = reader.read_i32().await?;
    let size = usize::try_from(size).map_err(|_| FrameError::NegativeMessageSize { size })?;

    if size > max_message_size {
        return Err(FrameError::MessageTooLarge {
            limit: max_message_size,
            actual: size,
        });
    }

    let mut buf = vec![0u8; size];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

struct CleanupRequestStateOnCancel {
    state: Arc<Mutex<MessengerState>>,
    correlation_id: i32,
}

impl Drop for CleanupRequestStateOnCancel {
    fn drop(&mut self) {
        if let MessengerState::RequestMap(map) = self.state.lock().deref_mut() {
            map.remove(&self.correlation_id);
        }
    }
}
