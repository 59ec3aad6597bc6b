//! Supervisor client - Unix socket client with explicit connection states

use parking_lot::Mutex;
use pmrotate_core::{constants, Error, ManagedProcess, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use crate::protocol::{Request, Response};

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How hard to try before declaring the supervisor unreachable
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Longest wait for one response; on expiry the session is dropped
    pub request_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_CONNECT_ATTEMPTS,
            delay: Duration::from_millis(constants::DEFAULT_CONNECT_DELAY_MS),
            request_timeout: Duration::from_secs(constants::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Client for the supervisor's control socket.
///
/// Holds one stream; requests are serialized over it. Any I/O or framing
/// error drops the stream, and the next request reconnects under the
/// reconnect policy.
pub struct SupervisorClient {
    socket_path: PathBuf,
    policy: ReconnectPolicy,
    state: Mutex<ConnectionState>,
    stream: tokio::sync::Mutex<Option<BufReader<UnixStream>>>,
}

impl SupervisorClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            policy: ReconnectPolicy::default(),
            state: Mutex::new(ConnectionState::Disconnected),
            stream: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!("Supervisor connection: {} -> {}", *current, state);
            *current = state;
        }
    }

    /// Establish a session, retrying per the reconnect policy
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        Ok(())
    }

    /// Drop the current session
    pub async fn disconnect(&self) {
        let mut guard = self.stream.lock().await;
        *guard = None;
        self.set_state(ConnectionState::Disconnected);
    }

    async fn open(&self) -> Result<BufReader<UnixStream>> {
        self.set_state(ConnectionState::Connecting);

        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.handshake().await {
                Ok(reader) => {
                    info!(
                        "Connected to supervisor at {} (attempt {})",
                        self.socket_path.display(),
                        attempt
                    );
                    self.set_state(ConnectionState::Connected);
                    return Ok(reader);
                }
                Err(e) => {
                    debug!("Connect attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        warn!(
            "Supervisor unreachable at {}: {}",
            self.socket_path.display(),
            last_error
        );
        self.set_state(ConnectionState::Disconnected);
        Err(Error::SupervisorUnreachable {
            attempts,
            reason: last_error,
        })
    }

    /// Connect and verify the peer answers a ping
    async fn handshake(&self) -> Result<BufReader<UnixStream>> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| Error::ipc(format!("Connect failed: {}", e)))?;

        let mut reader = BufReader::new(stream);
        match self.timed_exchange(&mut reader, &Request::Ping).await? {
            Response::Pong => Ok(reader),
            other => Err(Error::ipc(format!("Unexpected ping reply: {:?}", other))),
        }
    }

    /// Send a request and receive its response, reconnecting first if needed
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            *guard = Some(self.open().await?);
        }

        let Some(reader) = guard.as_mut() else {
            return Err(Error::ipc("No supervisor session"));
        };

        match self.timed_exchange(reader, request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("Supervisor session lost: {}", e);
                *guard = None;
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// `exchange` bounded by the request timeout
    async fn timed_exchange(
        &self,
        reader: &mut BufReader<UnixStream>,
        request: &Request,
    ) -> Result<Response> {
        let limit = self.policy.request_timeout;
        match tokio::time::timeout(limit, exchange(reader, request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ipc(format!(
                "No response to {:?} within {}ms",
                request,
                limit.as_millis()
            ))),
        }
    }

    /// Fetch the live process table
    pub async fn list_processes(&self) -> Result<Vec<ManagedProcess>> {
        match self.send(&Request::List).await? {
            Response::Processes { processes } => Ok(processes),
            Response::Error { message } => Err(Error::supervisor(message)),
            other => Err(Error::ipc(format!("Unexpected response: {:?}", other))),
        }
    }
}

/// Write one request line and read one response line
async fn exchange(reader: &mut BufReader<UnixStream>, request: &Request) -> Result<Response> {
    let mut json = serde_json::to_string(request)?;
    json.push('\n');

    let stream = reader.get_mut();
    stream
        .write_all(json.as_bytes())
        .await
        .map_err(|e| Error::ipc(format!("Write error: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::ipc(format!("Flush error: {}", e)))?;

    debug!("Sent request: {:?}", request);

    let mut line = String::new();
    let read = (&mut *reader)
        .take(constants::MAX_MESSAGE_SIZE)
        .read_line(&mut line)
        .await
        .map_err(|e| Error::ipc(format!("Read error: {}", e)))?;

    if read == 0 {
        return Err(Error::ipc("Connection closed by supervisor"));
    }
    if !line.ends_with('\n') {
        return Err(Error::ipc("Response too large or truncated"));
    }

    let response: Response = serde_json::from_str(line.trim())
        .map_err(|e| Error::ipc(format!("Invalid response: {}", e)))?;
    Ok(response)
}
