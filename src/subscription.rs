//! Realtime message subscriptions.
//!
//! [`RealtimeMessages`] is cold: it describes a room's stream but opens nothing.
//! Each [`RealtimeMessages::subscribe`] call starts an independent session with its
//! own connection, driven by a background task that forwards decoded messages to
//! the returned [`Subscription`]. Sessions are never shared, so cancelling one
//! subscription closes exactly one connection.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::GitterError;
use crate::http::TokenStore;
use crate::models::Message;
use crate::stream::{Disconnect, StreamConnection, StreamEvent, build_stream_url};
use crate::transport::Transport;

const MESSAGE_BUFFER: usize = 256;
const MIN_RECONNECT_DELAY_MS: u64 = 100;

/// Lifecycle of one realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no connection yet.
    Idle,
    /// The streaming request has been issued. Re-entered before every retry.
    Connecting,
    /// Frames are being received.
    Streaming,
    /// The connection was lost and is being re-opened.
    Reconnecting,
    /// Cancelled by the subscriber.
    Closed,
    /// Ended by an unrecoverable error.
    Faulted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }
}

/// Backoff between attempts to re-open a lost stream.
///
/// The attempt counter resets whenever a frame arrives. Once more than
/// `max_attempts` consecutive attempts fail the session faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt, doubling up to `max_delay_ms` and
    /// never below 100ms.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay.max(MIN_RECONNECT_DELAY_MS))
    }
}

/// The realtime message sequence of one room. Nothing is opened until
/// [`subscribe`](Self::subscribe) is called.
#[derive(Clone)]
pub struct RealtimeMessages {
    transport: Arc<dyn Transport>,
    room_id: String,
    url: String,
    token: TokenStore,
    keepalive: char,
    policy: ReconnectPolicy,
}

impl RealtimeMessages {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        stream_base: &str,
        room_id: &str,
        token: TokenStore,
        keepalive: char,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            room_id: room_id.to_string(),
            url: build_stream_url(stream_base, room_id),
            token,
            keepalive,
            policy,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start a new session. Must be called from within a Tokio runtime.
    ///
    /// # Example
    /// ```no_run
    /// # async fn example(client: &gitter::GitterClient) {
    /// use gitter::GitterApi;
    ///
    /// let mut sub = client.get_realtime_messages("room-id").subscribe();
    /// while let Some(event) = sub.recv().await {
    ///     match event {
    ///         Ok(message) => println!("{}", message.text),
    ///         Err(e) => eprintln!("stream ended: {e}"),
    ///     }
    /// }
    /// # }
    /// ```
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let (state, _) = watch::channel(SessionState::Idle);
        let state = Arc::new(state);

        let session = Session {
            transport: Arc::clone(&self.transport),
            room_id: self.room_id.clone(),
            url: self.url.clone(),
            token: self.token.clone(),
            keepalive: self.keepalive,
            policy: self.policy.clone(),
            tx,
            state: Arc::clone(&state),
        };
        let task = tokio::spawn(session.run());

        Subscription {
            room_id: self.room_id.clone(),
            rx,
            state,
            task: Some(task),
            cancelled: false,
        }
    }
}

/// Handle to one active session.
///
/// Yields `Ok(Message)` in wire order. A terminal failure arrives as a single
/// `Err(GitterError::StreamFault { .. })` followed by end-of-sequence. Dropping the
/// handle cancels the session.
pub struct Subscription {
    room_id: String,
    rx: mpsc::Receiver<Result<Message, GitterError>>,
    state: Arc<watch::Sender<SessionState>>,
    task: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl Subscription {
    /// Receive the next message, or `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<Result<Message, GitterError>> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions of this session.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Stop delivery and close the connection. Messages already buffered are
    /// discarded.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        set_state(&self.state, SessionState::Closed);
        tracing::debug!(room_id = %self.room_id, "realtime subscription cancelled");
    }
}

impl Stream for Subscription {
    type Item = Result<Message, GitterError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Terminal states are sticky so a cancelled session cannot be revived by a task
/// that has not yet observed its abort.
fn set_state(state: &watch::Sender<SessionState>, next: SessionState) {
    state.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            return false;
        }
        *current = next;
        true
    });
}

enum Outcome {
    /// The subscriber went away.
    Dropped,
    /// Retrying cannot help.
    Fatal(GitterError),
    /// The connection was lost and may be re-opened.
    Lost(GitterError),
}

/// Background task state for one subscription.
struct Session {
    transport: Arc<dyn Transport>,
    room_id: String,
    url: String,
    token: TokenStore,
    keepalive: char,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<Result<Message, GitterError>>,
    state: Arc<watch::Sender<SessionState>>,
}

impl Session {
    async fn run(self) {
        let mut attempts: u32 = 0;

        loop {
            set_state(&self.state, SessionState::Connecting);
            let outcome = match self.connect().await {
                Ok(conn) => {
                    set_state(&self.state, SessionState::Streaming);
                    tracing::info!(room_id = %self.room_id, attempts, "realtime stream connected");
                    self.pump(conn, &mut attempts).await
                }
                Err(e @ GitterError::Transport(_)) => Outcome::Lost(e),
                Err(e) => Outcome::Fatal(e),
            };

            match outcome {
                Outcome::Dropped => {
                    set_state(&self.state, SessionState::Closed);
                    tracing::debug!(room_id = %self.room_id, "subscriber dropped, closing stream");
                    return;
                }
                Outcome::Fatal(err) => {
                    self.fault(err).await;
                    return;
                }
                Outcome::Lost(err) => {
                    attempts += 1;
                    if attempts > self.policy.max_attempts {
                        let err = GitterError::Transport(format!(
                            "lost connection {attempts} times, giving up: {err}"
                        ));
                        self.fault(err).await;
                        return;
                    }

                    set_state(&self.state, SessionState::Reconnecting);
                    let delay = self.policy.delay_for_attempt(attempts);
                    tracing::warn!(
                        room_id = %self.room_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "realtime stream lost, reconnecting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.tx.closed() => {
                            set_state(&self.state, SessionState::Closed);
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn connect(&self) -> Result<StreamConnection, GitterError> {
        let headers = self.token.headers()?;
        StreamConnection::open(self.transport.as_ref(), &self.url, headers, self.keepalive).await
    }

    async fn pump(&self, mut conn: StreamConnection, attempts: &mut u32) -> Outcome {
        loop {
            match conn.next_event().await {
                Ok(StreamEvent::Message(message)) => {
                    *attempts = 0;
                    tracing::debug!(room_id = %self.room_id, message_id = %message.id, "realtime message");
                    if self.tx.send(Ok(message)).await.is_err() {
                        return Outcome::Dropped;
                    }
                }
                Ok(StreamEvent::KeepAlive) => {
                    *attempts = 0;
                }
                Ok(StreamEvent::Disconnected(Disconnect::Closed)) => {
                    return Outcome::Lost(GitterError::Transport(
                        "stream closed by server".to_string(),
                    ));
                }
                Ok(StreamEvent::Disconnected(Disconnect::Io(e))) => {
                    return Outcome::Lost(GitterError::Transport(e.to_string()));
                }
                Err(e) => return Outcome::Fatal(e),
            }
        }
    }

    async fn fault(&self, err: GitterError) {
        set_state(&self.state, SessionState::Faulted);
        tracing::warn!(room_id = %self.room_id, error = %err, "realtime stream faulted");
        let fault = GitterError::StreamFault {
            room_id: self.room_id.clone(),
            source: Box::new(err),
        };
        let _ = self.tx.send(Err(fault)).await;
    }
}
