use std::{net::SocketAddr, sync::Arc, time::Duration};

use hc_vault::{Key, LogSink};
use tokio::{
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpSocket, TcpStream},
    sync::{mpsc, Notify},
    time::{sleep_until, Instant},
};

use crate::{Config, ConnectionContext, ConnectionError, Handshake, RecordFramer, Role};

const READ_BUFFER_SIZE: usize = 4096;

/// Reported to the status callback as the connection progresses
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Authenticated,
    Disconnected,
    Error(String),
}

type StatusCallback = Box<dyn FnMut(ConnectionStatus) + Send>;

/// Stops a running connection from another task
#[derive(Clone, Debug)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    /// Takes effect even if the connection is not running yet
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}

enum Event {
    Read(std::io::Result<usize>),
    Outgoing(Option<String>),
    Timeout,
    Shutdown,
}

/// One peer connection: the TCP transport plus its protocol context
pub struct Connection<L: LogSink> {
    peer: SocketAddr,
    socket: Option<TcpSocket>,
    stream: Option<TcpStream>,
    context: ConnectionContext<L>,
    framer: RecordFramer,
    handshake_timeout: Option<Duration>,
    incoming: Option<mpsc::UnboundedSender<String>>,
    on_status: StatusCallback,
    shutdown: Arc<Notify>,
    closed: bool,
}

impl<L: LogSink> Connection<L> {
    /// Validates `config` and creates the socket. Connect errors are reported later, through `run`.
    pub fn open(
        config: &Config,
        log: L,
        on_status: impl FnMut(ConnectionStatus) + Send + 'static,
    ) -> Result<Self, ConnectionError> {
        Self::open_with_handshake(config, Handshake::new(Role::Initiator), log, on_status)
    }

    pub fn open_with_handshake(
        config: &Config,
        handshake: Handshake,
        log: L,
        on_status: impl FnMut(ConnectionStatus) + Send + 'static,
    ) -> Result<Self, ConnectionError> {
        let validated = config.validate()?;
        let socket = TcpSocket::new_v4()
            .map_err(|e| ConnectionError::TransportInit(format!("socket creation failed: {}", e)))?;
        tracing::debug!(peer = %validated.addr, "socket created");
        Ok(Self {
            peer: validated.addr,
            socket: Some(socket),
            stream: None,
            context: ConnectionContext::with_handshake(handshake, validated.preshared_key, log),
            framer: RecordFramer::new(),
            handshake_timeout: validated.handshake_timeout,
            incoming: None,
            on_status: Box::new(on_status),
            shutdown: Arc::new(Notify::new()),
            closed: false,
        })
    }

    fn from_stream(
        stream: TcpStream,
        peer: SocketAddr,
        context: ConnectionContext<L>,
        handshake_timeout: Option<Duration>,
        on_status: StatusCallback,
    ) -> Self {
        Self {
            peer,
            socket: None,
            stream: Some(stream),
            context,
            framer: RecordFramer::new(),
            handshake_timeout,
            incoming: None,
            on_status,
            shutdown: Arc::new(Notify::new()),
            closed: false,
        }
    }

    /// Decrypted peer messages are also sent here, in addition to the log sink
    pub fn with_incoming(mut self, incoming: mpsc::UnboundedSender<String>) -> Self {
        self.incoming = Some(incoming);
        self
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn context(&self) -> &ConnectionContext<L> {
        &self.context
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        tracing::debug!(peer = %self.peer, ?status, "status");
        (self.on_status)(status);
    }

    /// Connects if needed, runs the handshake, then pumps messages until the peer hangs up,
    /// a shutdown is requested, or an error occurs. Messages from `outgoing` are held until
    /// the handshake completes. The connection is closed on return.
    pub async fn run(&mut self, outgoing: mpsc::Receiver<String>) -> Result<(), ConnectionError> {
        if self.closed {
            Err(ConnectionError::Closed)?
        }

        let result = match self.connect().await {
            Ok(Some(stream)) => self.drive(stream, outgoing).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => self.set_status(ConnectionStatus::Disconnected),
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "connection failed");
                self.set_status(ConnectionStatus::Error(e.to_string()));
            }
        }
        self.close();
        result
    }

    /// Returns `None` when shut down before the connection was made
    async fn connect(&mut self) -> Result<Option<TcpStream>, ConnectionError> {
        let stream = match (self.stream.take(), self.socket.take()) {
            (Some(stream), _) => stream,
            (None, Some(socket)) => {
                self.set_status(ConnectionStatus::Connecting);
                let shutdown = self.shutdown.clone();
                tokio::select! {
                    stream = socket.connect(self.peer) => stream?,
                    _ = shutdown.notified() => return Ok(None),
                }
            }
            (None, None) => Err(ConnectionError::Closed)?,
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(peer = %self.peer, error = %e, "could not set TCP_NODELAY");
        }
        tracing::info!(peer = %self.peer, role = ?self.context.role(), "connected");
        self.set_status(ConnectionStatus::Connected);
        Ok(Some(stream))
    }

    async fn drive(
        &mut self,
        mut stream: TcpStream,
        mut outgoing: mpsc::Receiver<String>,
    ) -> Result<(), ConnectionError> {
        let (mut reader, mut writer) = stream.split();
        for record in self.context.on_connected()? {
            writer.write_all(&record).await?;
        }

        let shutdown = self.shutdown.clone();
        let deadline = self.handshake_timeout.map(|timeout| Instant::now() + timeout);
        let deadline_at = deadline.unwrap_or_else(Instant::now);
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut outgoing_open = true;

        loop {
            let authenticated = self.context.is_authenticated();
            let event = tokio::select! {
                read = reader.read(&mut buffer) => Event::Read(read),
                message = outgoing.recv(), if authenticated && outgoing_open => Event::Outgoing(message),
                _ = sleep_until(deadline_at), if !authenticated && deadline.is_some() => Event::Timeout,
                _ = shutdown.notified() => Event::Shutdown,
            };

            match event {
                Event::Read(Ok(0)) => {
                    tracing::info!(peer = %self.peer, "peer closed the connection");
                    return Ok(());
                }
                Event::Read(Ok(len)) => {
                    self.framer.push(&buffer[..len]);
                    self.process_records(&mut writer).await?;
                }
                Event::Read(Err(e)) => Err(e)?,
                Event::Outgoing(Some(message)) => match self.context.send_message(&message) {
                    Ok(record) => writer.write_all(&record).await?,
                    Err(ConnectionError::UnframeableCiphertext) => {
                        tracing::warn!(peer = %self.peer, "message dropped, ciphertext contains CRLF");
                    }
                    Err(e) => Err(e)?,
                },
                Event::Outgoing(None) => outgoing_open = false,
                Event::Timeout if self.context.is_stalled() => {
                    Err(ConnectionError::AuthenticationStalled)?
                }
                Event::Timeout => Err(ConnectionError::HandshakeTimeout)?,
                Event::Shutdown => {
                    tracing::debug!(peer = %self.peer, "shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    /// Handles every complete record in the framer. A malformed handshake record is skipped.
    async fn process_records<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
    ) -> Result<(), ConnectionError> {
        while let Some(record) = self.framer.next_record(self.context.expected_record())? {
            let outcome = match self.context.handle_record(&record) {
                Ok(outcome) => outcome,
                Err(ConnectionError::MalformedMessage(e)) => {
                    tracing::warn!(peer = %self.peer, error = %e, "malformed handshake record");
                    continue;
                }
                Err(e) => Err(e)?,
            };

            for reply in &outcome.replies {
                writer.write_all(reply).await?;
            }
            if outcome.authenticated_now {
                tracing::info!(peer = %self.peer, "authenticated");
                self.set_status(ConnectionStatus::Authenticated);
            }
            if let (Some(message), Some(incoming)) = (outcome.message, &self.incoming) {
                if incoming.send(message).is_err() {
                    tracing::debug!(peer = %self.peer, "incoming receiver dropped");
                }
            }
        }
        Ok(())
    }

    /// Releases the socket. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.socket = None;
        self.stream = None;
        tracing::debug!(peer = %self.peer, "closed");
    }
}

/// Accepts connections and runs the responder side of the handshake on each
pub struct Listener {
    listener: TcpListener,
    preshared_key: Key,
    handshake_timeout: Option<Duration>,
}

impl Listener {
    pub async fn bind(addr: SocketAddr, preshared_key: Key) -> Result<Self, ConnectionError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ConnectionError::TransportInit(format!("bind {} failed: {}", addr, e)))?;
        tracing::info!(addr = %addr, "listening");
        Ok(Self {
            listener,
            preshared_key,
            handshake_timeout: None,
        })
    }

    pub async fn from_config(config: &Config) -> Result<Self, ConnectionError> {
        let validated = config.validate()?;
        let mut listener = Self::bind(validated.addr, validated.preshared_key).await?;
        listener.handshake_timeout = validated.handshake_timeout;
        Ok(listener)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ConnectionError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept<L: LogSink>(
        &self,
        log: L,
        on_status: impl FnMut(ConnectionStatus) + Send + 'static,
    ) -> Result<Connection<L>, ConnectionError> {
        self.accept_with_handshake(Handshake::new(Role::Responder), log, on_status)
            .await
    }

    pub async fn accept_with_handshake<L: LogSink>(
        &self,
        handshake: Handshake,
        log: L,
        on_status: impl FnMut(ConnectionStatus) + Send + 'static,
    ) -> Result<Connection<L>, ConnectionError> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::info!(peer = %peer, "accepted");
        let preshared_key = self.preshared_key.duplicate(self.preshared_key.tag());
        Ok(Connection::from_stream(
            stream,
            peer,
            ConnectionContext::with_handshake(handshake, preshared_key, log),
            self.handshake_timeout,
            Box::new(on_status),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        AuthState, Config, Connection, ConnectionError, ConnectionStatus, Handshake, Listener,
        Role,
    };
    use hc_crypto::{hash_hex, FixedExponent, Nonce};
    use hc_vault::{AuditLog, Key, LogChannel};
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
        time::Duration,
    };
    use tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
        net::{TcpListener, TcpStream},
        sync::mpsc,
        time::timeout,
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn psk() -> Key {
        Key::from_text("sharedsecret", "pre-shared key")
    }

    fn status_recorder() -> (
        Arc<Mutex<Vec<ConnectionStatus>>>,
        impl FnMut(ConnectionStatus) + Send + 'static,
    ) {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let writer = statuses.clone();
        (statuses, move |status| writer.lock().unwrap().push(status))
    }

    fn with_crlf(mut record: Vec<u8>) -> Vec<u8> {
        record.extend_from_slice(b"\r\n");
        record
    }

    /// Reads up to and including a strict CRLF, returning the bytes before it
    async fn read_line(reader: &mut BufReader<TcpStream>) -> Vec<u8> {
        let mut line = Vec::new();
        while !line.ends_with(b"\r\n") {
            let read = reader.read_until(b'\n', &mut line).await.unwrap();
            assert!(read > 0, "peer closed");
        }
        line.truncate(line.len() - 2);
        line
    }

    #[tokio::test]
    async fn client_and_server() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), psk())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server_log = AuditLog::default();
        let (server_statuses, on_server_status) = status_recorder();
        let (server_incoming_tx, mut server_incoming) = mpsc::unbounded_channel();
        let (server_out, server_out_rx) = mpsc::channel(8);
        let server_task = {
            let server_log = server_log.clone();
            tokio::spawn(async move {
                let mut server = listener
                    .accept_with_handshake(
                        Handshake::new(Role::Responder).with_exponents(FixedExponent(4)),
                        server_log,
                        on_server_status,
                    )
                    .await
                    .unwrap()
                    .with_incoming(server_incoming_tx);
                let result = server.run(server_out_rx).await;
                (result, server)
            })
        };

        let client_log = AuditLog::default();
        let (client_statuses, on_client_status) = status_recorder();
        let (client_incoming_tx, mut client_incoming) = mpsc::unbounded_channel();
        let (client_out, client_out_rx) = mpsc::channel(8);
        let mut client = Connection::open_with_handshake(
            &Config::new("127.0.0.1", addr.port(), "sharedsecret"),
            Handshake::new(Role::Initiator).with_exponents(FixedExponent(3)),
            client_log.clone(),
            on_client_status,
        )
        .unwrap()
        .with_incoming(client_incoming_tx);
        let client_shutdown = client.shutdown_handle();

        // queued before the handshake, sent after it
        client_out.send("hi from client".to_string()).await.unwrap();
        server_out.send("hi from server".to_string()).await.unwrap();

        let client_task = tokio::spawn(async move {
            let result = client.run(client_out_rx).await;
            (result, client)
        });

        let received = timeout(WAIT, server_incoming.recv()).await.unwrap();
        assert_eq!(received.as_deref(), Some("hi from client"));
        let received = timeout(WAIT, client_incoming.recv()).await.unwrap();
        assert_eq!(received.as_deref(), Some("hi from server"));

        client_shutdown.shutdown();
        let (result, client) = timeout(WAIT, client_task).await.unwrap().unwrap();
        assert_eq!(result, Ok(()));
        assert!(client.is_closed());
        assert_eq!(client.context().state(), AuthState::Authenticated);

        // the server sees the client hang up
        let (result, server) = timeout(WAIT, server_task).await.unwrap().unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(
            client.context().session_key().unwrap(),
            server.context().session_key().unwrap()
        );

        assert_eq!(
            *client_statuses.lock().unwrap(),
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Authenticated,
                ConnectionStatus::Disconnected,
            ]
        );
        assert_eq!(
            *server_statuses.lock().unwrap(),
            vec![
                ConnectionStatus::Connected,
                ConnectionStatus::Authenticated,
                ConnectionStatus::Disconnected,
            ]
        );
        assert!(client_log.contains(LogChannel::Plaintext, "Client: hi from client"));
        assert!(client_log.contains(LogChannel::Plaintext, "Server: hi from server"));
        assert!(server_log.contains(LogChannel::Plaintext, "Client: hi from client"));
    }

    #[tokio::test]
    async fn wire_scenario() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let client_log = AuditLog::default();
        let (_, on_status) = status_recorder();
        let (client_incoming_tx, mut client_incoming) = mpsc::unbounded_channel();
        let (client_out, client_out_rx) = mpsc::channel(8);
        let mut client = Connection::open_with_handshake(
            &Config::new("localhost", port, "sharedsecret"),
            Handshake::new(Role::Initiator)
                .with_nonce(Nonce::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]))
                .with_exponents(FixedExponent(6)),
            client_log.clone(),
            on_status,
        )
        .unwrap()
        .with_incoming(client_incoming_tx);
        client_out
            .send("plaintext must not appear".to_string())
            .await
            .unwrap();
        let client_task = tokio::spawn(async move {
            let result = client.run(client_out_rx).await;
            (result, client)
        });

        let (stream, _) = timeout(WAIT, server.accept()).await.unwrap().unwrap();
        let mut stream = BufReader::new(stream);

        let mut nonce = [0u8; 8];
        stream.read_exact(&mut nonce).await.unwrap();
        assert_eq!(nonce, [1, 2, 3, 4, 5, 6, 7, 8]);

        let server_nonce = [0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18];
        let malformed = psk().encrypt(b"Server\n0102030405060708").unwrap();
        let challenge = psk().encrypt(b"Server\n0102030405060708\n12345").unwrap();
        let mut records = with_crlf(server_nonce.to_vec());
        records.extend(with_crlf(malformed));
        records.extend(with_crlf(challenge));
        stream.get_mut().write_all(&records).await.unwrap();

        let reply = timeout(WAIT, read_line(&mut stream)).await.unwrap();
        assert_eq!(
            psk().decrypt(&reply).unwrap(),
            b"Client\r\n1112131415161718\r\n8"
        );

        // 12345^6 mod 23 = 12
        let session_key = Key::from_text(&hash_hex(b"12"), "session key");
        let message = timeout(WAIT, read_line(&mut stream)).await.unwrap();
        assert!(!message
            .windows(b"plaintext".len())
            .any(|window| window == b"plaintext"));
        assert_eq!(
            session_key.decrypt(&message).unwrap(),
            b"plaintext must not appear"
        );

        let reply = with_crlf(session_key.encrypt(b"hi from server").unwrap());
        stream.get_mut().write_all(&reply).await.unwrap();
        let received = timeout(WAIT, client_incoming.recv()).await.unwrap();
        assert_eq!(received.as_deref(), Some("hi from server"));

        drop(stream);
        let (result, client) = timeout(WAIT, client_task).await.unwrap().unwrap();
        assert_eq!(result, Ok(()));
        assert!(client.context().is_authenticated());
        assert!(client_log.contains(LogChannel::Authentication, "Client: g^a mod p: 8 with a: 6"));
    }

    #[tokio::test]
    async fn unframeable_message_is_skipped() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let (statuses, on_status) = status_recorder();
        let (client_out, client_out_rx) = mpsc::channel(8);
        let mut client = Connection::open_with_handshake(
            &Config::new("127.0.0.1", port, "sharedsecret"),
            Handshake::new(Role::Initiator)
                .with_nonce(Nonce::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]))
                .with_exponents(FixedExponent(6)),
            AuditLog::default(),
            on_status,
        )
        .unwrap();
        // encrypts to a record starting with CRLF under the session key below
        client_out.send("n8ello".to_string()).await.unwrap();
        client_out.send("second message".to_string()).await.unwrap();
        let client_task = tokio::spawn(async move {
            let result = client.run(client_out_rx).await;
            (result, client)
        });

        let (stream, _) = timeout(WAIT, server.accept()).await.unwrap().unwrap();
        let mut stream = BufReader::new(stream);
        let mut nonce = [0u8; 8];
        stream.read_exact(&mut nonce).await.unwrap();

        let server_nonce = [0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18];
        let challenge = psk().encrypt(b"Server\n0102030405060708\n12345").unwrap();
        let mut records = with_crlf(server_nonce.to_vec());
        records.extend(with_crlf(challenge));
        stream.get_mut().write_all(&records).await.unwrap();
        let _reply = timeout(WAIT, read_line(&mut stream)).await.unwrap();

        let session_key = Key::from_text(&hash_hex(b"12"), "session key");
        let message = timeout(WAIT, read_line(&mut stream)).await.unwrap();
        assert_eq!(session_key.decrypt(&message).unwrap(), b"second message");

        drop(stream);
        let (result, _) = timeout(WAIT, client_task).await.unwrap().unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(
            statuses.lock().unwrap().last(),
            Some(&ConnectionStatus::Disconnected)
        );
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let (statuses, on_status) = status_recorder();
        let (client_out, client_out_rx) = mpsc::channel(8);
        let mut client = Connection::open(
            &Config::new("127.0.0.1", port, "sharedsecret").with_handshake_timeout(1),
            AuditLog::default(),
            on_status,
        )
        .unwrap();
        client_out.send("never sent".to_string()).await.unwrap();
        let client_task = tokio::spawn(async move {
            let result = client.run(client_out_rx).await;
            (result, client)
        });

        let (mut stream, _) = timeout(WAIT, server.accept()).await.unwrap().unwrap();
        let mut nonce = [0u8; 8];
        stream.read_exact(&mut nonce).await.unwrap();

        // right nonce, wrong identity
        let mut message = b"Mallory\n".to_vec();
        message.extend_from_slice(hc_crypto::to_hex(&nonce).as_bytes());
        message.extend_from_slice(b"\n5");
        let mut records = with_crlf(vec![9; 8]);
        records.extend(with_crlf(psk().encrypt(&message).unwrap()));
        stream.write_all(&records).await.unwrap();

        let (result, client) = timeout(WAIT, client_task).await.unwrap().unwrap();
        assert_eq!(result, Err(ConnectionError::AuthenticationStalled));
        assert!(client.context().is_stalled());
        assert!(client.context().session_key().is_none());
        assert_eq!(
            statuses.lock().unwrap().last(),
            Some(&ConnectionStatus::Error(
                ConnectionError::AuthenticationStalled.to_string()
            ))
        );

        // nothing but the nonce was written
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let port = {
            let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
            unused.local_addr().unwrap().port()
        };

        let (statuses, on_status) = status_recorder();
        let (_client_out, client_out_rx) = mpsc::channel(1);
        let mut client = Connection::open(
            &Config::new("127.0.0.1", port, "sharedsecret"),
            AuditLog::default(),
            on_status,
        )
        .unwrap();

        let result = timeout(WAIT, client.run(client_out_rx)).await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Transport(_))));
        let statuses = statuses.lock().unwrap();
        assert_eq!(statuses[0], ConnectionStatus::Connecting);
        assert!(matches!(statuses.last(), Some(ConnectionStatus::Error(_))));
    }

    #[tokio::test]
    async fn open_and_close() {
        assert!(matches!(
            Connection::open(
                &Config::new("not a host", 80, "sharedsecret"),
                AuditLog::default(),
                |_| {}
            )
            .err(),
            Some(ConnectionError::TransportInit(_))
        ));

        let mut client = Connection::open(
            &Config::new("127.0.0.1", 9, "sharedsecret"),
            AuditLog::default(),
            |_| {},
        )
        .unwrap();
        assert_eq!(
            client.peer_addr(),
            "127.0.0.1:9".parse::<SocketAddr>().unwrap()
        );
        client.close();
        client.close();
        assert!(client.is_closed());

        let (_client_out, client_out_rx) = mpsc::channel(1);
        assert_eq!(
            client.run(client_out_rx).await,
            Err(ConnectionError::Closed)
        );
    }

    #[tokio::test]
    async fn shutdown_before_run() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (statuses, on_status) = status_recorder();
        let mut client = Connection::open(
            &Config::new("127.0.0.1", port, "sharedsecret"),
            AuditLog::default(),
            on_status,
        )
        .unwrap();

        client.shutdown_handle().shutdown();
        let (_client_out, client_out_rx) = mpsc::channel(1);
        let result = timeout(WAIT, client.run(client_out_rx)).await.unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(
            statuses.lock().unwrap().last(),
            Some(&ConnectionStatus::Disconnected)
        );
    }
}
