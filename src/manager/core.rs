//! AMI connection manager.
//!
//! The [`Manager`] owns the connection lifecycle and wires the protocol
//! pieces together:
//!
//! 1. Connect (retrying with a fixed delay when `reopen` is set)
//! 2. Read the greeting with a [`GreetingDisassembler`]
//! 3. Switch to a [`PacketDisassembler`] and send `Login`
//! 4. Complete pending requests and publish every packet on the [`EventBus`]
//!
//! # Example
//!
//! ```no_run
//! use ami_manager::{Manager, Packet, Pattern};
//!
//! # async fn example() -> ami_manager::Result<()> {
//! let manager = Manager::builder()
//!     .host("127.0.0.1")
//!     .credentials("admin", "secret")
//!     .build()?;
//!
//! manager.when([Pattern::event("Hangup")], |packet: &Packet| {
//!     println!("hangup: {:?}", packet.get("Channel"));
//! });
//!
//! manager.serve_forever().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex as AsyncMutex, oneshot, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::events::{EventBus, Pattern, SubscriptionHandle};
use crate::identifiers::{ActionId, ActionIdSequence};
use crate::protocol::packet::ACTION_ID_KEY;
use crate::protocol::{Action, GreetingDisassembler, Packet, PacketDisassembler, PacketKind};
use crate::transport::{ConnectionReader, ConnectionWriter, connect};

use super::builder::ManagerBuilder;
use super::options::{ManagerConfig, duration_millis};
use super::state::{ConnectionState, LoopDirective, StateHolder};

// ============================================================================
// Constants
// ============================================================================

/// Maximum in-flight requests before rejecting new ones.
const MAX_PENDING_ACTIONS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Map of action IDs to response channels.
type PendingMap = FxHashMap<ActionId, oneshot::Sender<Result<Packet>>>;

/// Watches state changes so waits end early on `stop()`.
type StateWatch = watch::Receiver<ConnectionState>;

/// Which disassembler is reading the stream.
enum Mode {
    Greeting(GreetingDisassembler),
    Packets(PacketDisassembler),
}

/// Per-connection read state. Dropped wholesale on reconnect.
struct Session {
    reader: ConnectionReader,
    mode: Mode,
}

/// Internal shared state for the manager.
pub(crate) struct ManagerInner {
    config: ManagerConfig,
    state: StateHolder,
    events: EventBus,
    writer: AsyncMutex<Option<ConnectionWriter>>,
    pending: Mutex<PendingMap>,
    action_ids: ActionIdSequence,
    connected: AtomicBool,
}

// ============================================================================
// Manager
// ============================================================================

/// AMI client: connection lifecycle, action sending and event dispatch.
///
/// Cheap to clone; clones share the connection, state and event bus, so one
/// clone can run [`serve_forever`](Self::serve_forever) while others send
/// actions or call [`stop`](Self::stop).
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Manager - Public API
// ============================================================================

impl Manager {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Creates a manager from an already validated configuration.
    pub(crate) fn new(config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                state: StateHolder::new(),
                events: EventBus::new(),
                writer: AsyncMutex::new(None),
                pending: Mutex::new(PendingMap::default()),
                action_ids: ActionIdSequence::new(),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// The configuration in use.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// The event bus every inbound packet is published on.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Registers `handler` for packets matching any of `patterns`.
    pub fn when<P, F>(&self, patterns: P, handler: F) -> SubscriptionHandle
    where
        P: IntoIterator<Item = Pattern>,
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(patterns, handler, None)
    }

    /// Current serve loop state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.current()
    }

    /// Returns `true` while a socket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Resumes reading.
    pub fn play(&self) {
        self.inner.state.play();
    }

    /// Stops reading without closing the connection.
    pub fn pause(&self) {
        self.inner.state.pause();
    }

    /// Asks the serve loop to exit; it closes the socket before returning.
    pub fn stop(&self) {
        self.inner.state.stop();
    }

    /// Connects and serves until [`stop`](Self::stop) is called.
    ///
    /// The socket is always closed before this returns.
    ///
    /// # Errors
    ///
    /// Connection-level errors are returned only when `reopen` is disabled or
    /// `max_connect_attempts` is exhausted.
    pub async fn serve_forever(&self) -> Result<()> {
        let mut state_rx = self.inner.state.subscribe();
        self.inner.state.play();

        info!(
            host = %self.inner.config.host,
            port = self.inner.config.port,
            reopen = self.inner.config.reopen,
            "Serve loop starting"
        );

        let result = self.serve_loop(&mut state_rx).await;
        self.close_connection().await;

        match &result {
            Ok(()) => info!("Serve loop stopped"),
            Err(e) => error!(error = %e, "Serve loop terminated"),
        }
        result
    }

    /// Serializes and writes an action.
    ///
    /// Failures are logged and returned; they never affect the serve loop.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no socket is open
    /// - [`Error::Io`] if the write fails
    pub async fn send(&self, action: &Action) -> Result<usize> {
        let bytes = action.to_bytes();
        let mut guard = self.inner.writer.lock().await;

        let Some(writer) = guard.as_mut() else {
            warn!(action = action.name(), "Send failed: not connected");
            return Err(Error::NotConnected);
        };

        match writer.write_all(&bytes).await {
            Ok(sent) => {
                debug!(action = action.name(), id = ?action.id(), bytes = sent, "Action sent");
                Ok(sent)
            }
            Err(e) => {
                warn!(action = action.name(), error = %e, "Send failed");
                Err(e)
            }
        }
    }

    /// Assembles arbitrary field/value pairs into one packet and sends it.
    ///
    /// Pairs go on the wire in iteration order; no `Action` field is added.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_fields<I, K, V>(&self, fields: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.send(&fields.into_iter().collect()).await
    }

    /// Sends an action and waits for its response (default timeout).
    ///
    /// An `ActionID` is generated if the action has none.
    ///
    /// # Errors
    ///
    /// - [`Error::ActionTimeout`] if no response arrives in time
    /// - [`Error::ConnectionClosed`] if the connection drops first
    /// - [`Error::Protocol`] if too many requests are pending, the ID is in use,
    ///   or the ID is the one reserved for Login
    pub async fn request(&self, action: Action) -> Result<Packet> {
        self.request_with_timeout(action, self.inner.config.action_timeout)
            .await
    }

    /// Sends an action and waits for its response with a custom timeout.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn request_with_timeout(
        &self,
        mut action: Action,
        response_timeout: Duration,
    ) -> Result<Packet> {
        let action_id = match action.id() {
            Some(id) => id,
            None => {
                let id = self.inner.action_ids.next_id();
                action.set(ACTION_ID_KEY, id.as_str());
                id
            }
        };

        if action_id == ActionId::login() {
            return Err(Error::protocol(format!(
                "ActionID {action_id} is reserved for Login"
            )));
        }

        let (response_tx, response_rx) = oneshot::channel();

        {
            let mut pending = self.inner.pending.lock();
            if pending.len() >= MAX_PENDING_ACTIONS {
                warn!(
                    pending = pending.len(),
                    max = MAX_PENDING_ACTIONS,
                    "Too many pending actions"
                );
                return Err(Error::protocol(format!(
                    "Too many pending actions: {}/{}",
                    pending.len(),
                    MAX_PENDING_ACTIONS
                )));
            }
            if pending.contains_key(&action_id) {
                return Err(Error::protocol(format!(
                    "ActionID {action_id} is already pending"
                )));
            }
            pending.insert(action_id.clone(), response_tx);
        }

        if let Err(e) = self.send(&action).await {
            self.inner.pending.lock().remove(&action_id);
            return Err(e);
        }

        match timeout(response_timeout, response_rx).await {
            Ok(received) => received?,
            Err(_) => {
                self.inner.pending.lock().remove(&action_id);
                Err(Error::action_timeout(
                    action_id,
                    duration_millis(response_timeout),
                ))
            }
        }
    }

    /// Number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

// ============================================================================
// Manager - Serve Loop
// ============================================================================

impl Manager {
    async fn serve_loop(&self, state_rx: &mut StateWatch) -> Result<()> {
        let Some(mut session) = self.open_session(state_rx).await? else {
            return Ok(());
        };

        loop {
            state_rx.mark_unchanged();

            match self.inner.state.check() {
                LoopDirective::Proceed => {}
                LoopDirective::Idle => {
                    self.wait(self.inner.config.poll_interval, state_rx).await;
                    continue;
                }
                LoopDirective::Terminate => return Ok(()),
            }

            if let Err(e) = self.serve_once(&mut session, state_rx).await {
                if !self.inner.config.reopen {
                    return Err(e);
                }

                let retry_delay = self.inner.config.connect_retry_delay;
                warn!(
                    error = %e,
                    retry_ms = duration_millis(retry_delay),
                    "Connection lost, reconnecting"
                );
                drop(session);
                self.close_connection().await;
                self.wait(retry_delay, state_rx).await;

                session = match self.open_session(state_rx).await? {
                    Some(session) => session,
                    None => return Ok(()),
                };
                continue;
            }

            self.wait(self.inner.config.poll_interval, state_rx).await;
        }
    }

    /// One read-and-dispatch step. A read timeout is not an error.
    async fn serve_once(&self, session: &mut Session, state_rx: &mut StateWatch) -> Result<()> {
        let read_timeout = self.inner.config.read_timeout;

        let chunk = tokio::select! {
            biased;
            _ = state_rx.changed() => return Ok(()),
            result = session.reader.read_chunk(read_timeout) => result?,
        };

        if let Some(data) = chunk {
            self.handle_chunk(&mut session.mode, data).await;
        }
        Ok(())
    }

    async fn handle_chunk(&self, mode: &mut Mode, data: &[u8]) {
        let greeting = match mode {
            Mode::Packets(disassembler) => {
                for kind in disassembler.feed(data) {
                    self.dispatch(kind);
                }
                return;
            }
            Mode::Greeting(disassembler) => {
                disassembler.push(data);
                match disassembler.next_frame() {
                    Some(greeting) => greeting,
                    None => return,
                }
            }
        };

        info!(
            vendor = %greeting.vendor,
            version = %greeting.version,
            "Greeting received"
        );

        // Bytes after the greeting line belong to the packet stream.
        let remainder = match std::mem::replace(mode, Mode::Packets(PacketDisassembler::new())) {
            Mode::Greeting(disassembler) => disassembler.into_remainder(),
            Mode::Packets(_) => Vec::new(),
        };

        self.login().await;

        if let Mode::Packets(disassembler) = mode {
            for kind in disassembler.feed(&remainder) {
                self.dispatch(kind);
            }
        }
    }

    async fn login(&self) {
        let config = &self.inner.config;
        let action = Action::login(config.user.as_str(), config.secret.as_str());

        // Failure already logged by send; the next read surfaces a dead socket.
        if self.send(&action).await.is_ok() {
            debug!(user = %config.user, "Login sent");
        }
    }

    /// Completes any matching request, then publishes the packet.
    fn dispatch(&self, kind: PacketKind) {
        match &kind {
            PacketKind::Response(packet) => {
                self.log_login_result(packet);
                self.complete_pending(packet);
                trace!(response = packet.response(), id = ?packet.action_id(), "Response received");
            }
            PacketKind::Event(packet) => {
                trace!(event = packet.event_name(), "Event received");
            }
            PacketKind::Unknown(packet) => {
                debug!(fields = packet.len(), "Packet without Response or Event");
            }
        }

        self.inner.events.publish(kind.packet());
    }

    fn log_login_result(&self, packet: &Packet) {
        if packet.get(ACTION_ID_KEY) != Some(ActionId::LOGIN) {
            return;
        }

        match packet.response() {
            Some("Success") => info!(user = %self.inner.config.user, "Logged in"),
            other => warn!(
                response = other,
                message = packet.get("Message"),
                "Login rejected"
            ),
        }
    }

    fn complete_pending(&self, packet: &Packet) {
        let Some(action_id) = packet.action_id() else {
            return;
        };

        if let Some(tx) = self.inner.pending.lock().remove(&action_id) {
            let _ = tx.send(Ok(packet.clone()));
        }
    }

    /// Connects, retrying per configuration. `None` means stopped meanwhile.
    async fn open_session(&self, state_rx: &mut StateWatch) -> Result<Option<Session>> {
        let config = &self.inner.config;
        let mut attempt: u32 = 0;

        loop {
            state_rx.mark_unchanged();
            if self.inner.state.check() == LoopDirective::Terminate {
                return Ok(None);
            }

            attempt += 1;
            let connected = connect(
                &config.host,
                config.port,
                config.connect_timeout,
                config.chunk_size,
            )
            .await;

            match connected {
                Ok((reader, writer)) => {
                    info!(peer = %reader.peer(), attempt, "Connected");
                    *self.inner.writer.lock().await = Some(writer);
                    self.inner.connected.store(true, Ordering::Release);

                    return Ok(Some(Session {
                        reader,
                        mode: Mode::Greeting(GreetingDisassembler::new()),
                    }));
                }
                Err(e) if !config.reopen => return Err(e),
                Err(e) => {
                    if let Some(max) = config.max_connect_attempts
                        && attempt >= max
                    {
                        warn!(attempt, error = %e, "Giving up connecting");
                        return Err(e);
                    }

                    warn!(
                        attempt,
                        error = %e,
                        retry_ms = duration_millis(config.connect_retry_delay),
                        "Connect failed, retrying"
                    );
                    self.wait(config.connect_retry_delay, state_rx).await;
                }
            }
        }
    }

    /// Sleeps for `duration` or until the state changes.
    async fn wait(&self, duration: Duration, state_rx: &mut StateWatch) {
        tokio::select! {
            _ = sleep(duration) => {}
            _ = state_rx.changed() => {}
        }
    }

    /// Shuts down the socket and fails in-flight requests.
    async fn close_connection(&self) {
        let writer = self.inner.writer.lock().await.take();
        self.inner.connected.store(false, Ordering::Release);

        if let Some(writer) = writer {
            writer.shutdown().await;
        }

        self.fail_pending();
    }

    fn fail_pending(&self) {
        let pending: Vec<_> = self.inner.pending.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending actions on disconnect");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicUsize;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const GREETING: &[u8] = b"Asterisk Call Manager/1.1\r\n";
    const LOGIN: &[u8] = b"Action: Login\r\nActionID: 1\r\nUsername: admin\r\nSecret: pa55\r\n\r\n";
    const LOGIN_OK: &[u8] =
        b"Response: Success\r\nActionID: 1\r\nMessage: Authentication accepted\r\n\r\n";
    const WAIT: Duration = Duration::from_secs(5);

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        (listener, port)
    }

    fn test_manager(port: u16) -> ManagerBuilder {
        Manager::builder()
            .host("127.0.0.1")
            .port(port)
            .credentials("admin", "pa55")
            .poll_interval(Duration::from_millis(5))
            .read_timeout(Duration::from_millis(200))
            .connect_retry_delay(Duration::from_millis(20))
    }

    /// Reads one blank-line terminated action from the client.
    async fn read_action(stream: &mut TcpStream) -> Vec<u8> {
        let mut received = Vec::new();
        let mut byte = [0u8; 1];
        while !received.ends_with(b"\r\n\r\n") {
            let n = stream.read(&mut byte).await.expect("read action");
            assert!(n > 0, "client closed before sending an action");
            received.push(byte[0]);
        }
        received
    }

    async fn accept_and_login(listener: &TcpListener) -> TcpStream {
        let (mut stream, _) = listener.accept().await.expect("accept");
        stream.write_all(GREETING).await.expect("greeting");
        assert_eq!(read_action(&mut stream).await, LOGIN);
        stream.write_all(LOGIN_OK).await.expect("login response");
        stream
    }

    #[tokio::test]
    async fn test_login_then_events_in_wire_order() {
        let (listener, port) = listener().await;
        let manager = test_manager(port).build().expect("config");
        let (_handle, mut events) = manager
            .events()
            .subscribe_channel([Pattern::event("Hangup")], None);

        let server = tokio::spawn(async move {
            let mut stream = accept_and_login(&listener).await;
            stream
                .write_all(b"Event: Hangup\r\nChannel: SIP/1\r\n\r\nEvent: Hangup\r\nChannel: SIP/2\r\n\r\n")
                .await
                .expect("events");
            // Keep the socket open until the client goes away.
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });

        let serving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.serve_forever().await }
        });

        for expected in ["SIP/1", "SIP/2"] {
            let packet = timeout(WAIT, events.recv())
                .await
                .expect("event in time")
                .expect("channel open");
            assert_eq!(packet.get("Channel"), Some(expected));
        }
        assert!(manager.is_connected());

        manager.stop();
        let result = timeout(WAIT, serving).await.expect("loop exits").expect("join");
        assert!(result.is_ok());
        assert!(!manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Stop);

        timeout(WAIT, server).await.expect("server exits").expect("join");
    }

    #[tokio::test]
    async fn test_packets_after_greeting_in_same_chunk() {
        let (listener, port) = listener().await;
        let manager = test_manager(port).build().expect("config");
        let (_handle, mut events) = manager
            .events()
            .subscribe_channel([Pattern::event("FullyBooted")], None);

        let _server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            stream
                .write_all(b"Asterisk Call Manager/2.10.4\r\nEvent: FullyBooted\r\nStatus: Fully Booted\r\n\r\n")
                .await
                .expect("write");
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });

        let serving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.serve_forever().await }
        });

        let packet = timeout(WAIT, events.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        assert_eq!(packet.get("Status"), Some("Fully Booted"));

        manager.stop();
        let _ = timeout(WAIT, serving).await.expect("loop exits");
    }

    #[tokio::test]
    async fn test_request_resolves_with_matching_response() {
        let (listener, port) = listener().await;
        let manager = test_manager(port).build().expect("config");
        let (_handle, mut logins) = manager.events().subscribe_channel(
            [Pattern::new().with("ActionID", ActionId::LOGIN)],
            None,
        );

        let _server = tokio::spawn(async move {
            let mut stream = accept_and_login(&listener).await;
            let action = String::from_utf8(read_action(&mut stream).await).expect("utf8");
            assert!(action.starts_with("Action: Ping\r\n"));

            let id = action
                .lines()
                .find_map(|line| line.strip_prefix("ActionID: "))
                .expect("ActionID present")
                .to_string();

            // An unrelated event first; the request must still resolve.
            stream
                .write_all(b"Event: PeerStatus\r\nPeer: SIP/1\r\n\r\n")
                .await
                .expect("event");
            stream
                .write_all(format!("Response: Success\r\nActionID: {id}\r\nPing: Pong\r\n\r\n").as_bytes())
                .await
                .expect("response");

            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });

        let serving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.serve_forever().await }
        });

        timeout(WAIT, logins.recv()).await.expect("login in time");

        let response = manager
            .request(Action::new("Ping"))
            .await
            .expect("response");
        assert_eq!(response.get("Ping"), Some("Pong"));
        assert_eq!(response.action_id(), Some(ActionId::new("2")));
        assert_eq!(manager.pending_count(), 0);

        manager.stop();
        let _ = timeout(WAIT, serving).await.expect("loop exits");
    }

    #[tokio::test]
    async fn test_peer_close_without_reopen_returns_error() {
        let (listener, port) = listener().await;
        let manager = test_manager(port).reopen(false).build().expect("config");

        let _server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            stream.write_all(GREETING).await.expect("greeting");
            let _ = read_action(&mut stream).await;
            drop(stream);
        });

        let result = timeout(WAIT, manager.serve_forever())
            .await
            .expect("loop exits");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_discards_partial_packet() {
        let (listener, port) = listener().await;
        let manager = test_manager(port).build().expect("config");
        let (_handle, mut events) = manager
            .events()
            .subscribe_channel([Pattern::event("Hangup")], None);

        let _server = tokio::spawn(async move {
            let mut first = accept_and_login(&listener).await;
            first
                .write_all(b"Event: Hangup\r\nChannel: SIP/9\r\n")
                .await
                .expect("partial");
            drop(first);

            let mut second = accept_and_login(&listener).await;
            second
                .write_all(b"\r\nEvent: Hangup\r\nChannel: SIP/2\r\n\r\n")
                .await
                .expect("event");
            let mut sink = Vec::new();
            let _ = second.read_to_end(&mut sink).await;
        });

        let serving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.serve_forever().await }
        });

        let packet = timeout(WAIT, events.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        assert_eq!(packet.get("Channel"), Some("SIP/2"));

        manager.stop();
        let result = timeout(WAIT, serving).await.expect("loop exits").expect("join");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_reconnect_after_peer_close_waits_retry_delay() {
        let (listener, port) = listener().await;
        let accepts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepts);
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::Relaxed);
                drop(stream);
            }
        });

        let manager = test_manager(port)
            .connect_retry_delay(Duration::from_millis(100))
            .build()
            .expect("config");
        let serving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.serve_forever().await }
        });

        sleep(Duration::from_millis(500)).await;
        manager.stop();
        let result = timeout(WAIT, serving).await.expect("loop exits").expect("join");
        assert!(result.is_ok());
        server.abort();

        let accepted = accepts.load(Ordering::Relaxed);
        assert!(accepted >= 1, "never connected");
        assert!(accepted <= 10, "reconnected {accepted} times in 500ms");
    }

    #[tokio::test]
    async fn test_pause_holds_packets_until_play() {
        let (listener, port) = listener().await;
        let manager = test_manager(port).build().expect("config");
        let (_logins, mut logins) = manager.events().subscribe_channel(
            [Pattern::new().with("ActionID", ActionId::LOGIN)],
            None,
        );
        let (_hangups, mut events) = manager
            .events()
            .subscribe_channel([Pattern::event("Hangup")], None);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let _server = tokio::spawn(async move {
            let mut stream = accept_and_login(&listener).await;
            let _ = release_rx.await;
            stream
                .write_all(b"Event: Hangup\r\nChannel: SIP/5\r\n\r\n")
                .await
                .expect("event");
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });

        let serving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.serve_forever().await }
        });

        timeout(WAIT, logins.recv()).await.expect("login in time");
        manager.pause();
        assert_eq!(manager.state(), ConnectionState::Pause);
        release_tx.send(()).expect("server waiting");

        assert!(
            timeout(Duration::from_millis(300), events.recv()).await.is_err(),
            "paused loop must not read"
        );
        assert!(manager.is_connected());

        manager.play();
        let packet = timeout(WAIT, events.recv())
            .await
            .expect("event after play")
            .expect("channel open");
        assert_eq!(packet.get("Channel"), Some("SIP/5"));

        manager.stop();
        let result = timeout(WAIT, serving).await.expect("loop exits").expect("join");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_send_fields_writes_pairs_verbatim() {
        let (listener, port) = listener().await;
        let manager = test_manager(port).build().expect("config");
        let (_logins, mut logins) = manager.events().subscribe_channel(
            [Pattern::new().with("ActionID", ActionId::LOGIN)],
            None,
        );

        let server = tokio::spawn(async move {
            let mut stream = accept_and_login(&listener).await;
            read_action(&mut stream).await
        });

        let serving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.serve_forever().await }
        });

        timeout(WAIT, logins.recv()).await.expect("login in time");
        let sent = manager
            .send_fields([("Action", "Command"), ("ActionID", "77"), ("Command", "core show uptime")])
            .await
            .expect("send");

        let received = timeout(WAIT, server).await.expect("server exits").expect("join");
        assert_eq!(
            received,
            b"Action: Command\r\nActionID: 77\r\nCommand: core show uptime\r\n\r\n"
        );
        assert_eq!(sent, received.len());

        manager.stop();
        let _ = timeout(WAIT, serving).await.expect("loop exits");
    }

    #[tokio::test]
    async fn test_request_rejects_login_action_id() {
        let manager = test_manager(1).build().expect("config");
        let err = manager
            .request(Action::new("Ping").action_id(ActionId::login()))
            .await
            .expect_err("reserved id");
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_connect_backoff() {
        let (listener, port) = listener().await;
        drop(listener);

        let manager = test_manager(port)
            .connect_retry_delay(Duration::from_secs(60))
            .build()
            .expect("config");

        let serving = tokio::spawn({
            let manager = manager.clone();
            async move { manager.serve_forever().await }
        });

        sleep(Duration::from_millis(100)).await;
        manager.stop();

        let result = timeout(WAIT, serving).await.expect("loop exits").expect("join");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_max_connect_attempts() {
        let (listener, port) = listener().await;
        drop(listener);

        let manager = test_manager(port)
            .max_connect_attempts(2)
            .build()
            .expect("config");

        let result = timeout(WAIT, manager.serve_forever())
            .await
            .expect("loop exits");
        assert!(result.expect_err("gives up").is_connection_error());
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let manager = test_manager(1).build().expect("config");
        let err = manager
            .send(&Action::new("Ping"))
            .await
            .expect_err("not connected");
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_request_without_connection_clears_pending() {
        let manager = test_manager(1).build().expect("config");
        let err = manager
            .request(Action::new("Ping"))
            .await
            .expect_err("not connected");
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_when_registers_on_bus() {
        let manager = test_manager(1).build().expect("config");
        let handle = manager.when([Pattern::event("Hangup")], |_| {});
        assert_eq!(manager.events().size(), 1);
        assert!(manager.events().unsubscribe(&handle));
    }
}
