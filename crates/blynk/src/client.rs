//! Persistent Blynk connection
//!
//! A background task owns the TCP session. It logs in, announces the
//! heartbeat, pings the server, reconnects after a fixed delay when the
//! session drops, and forwards writes queued through [`BlynkClient`].

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BlynkError, BlynkResult};
use crate::protocol::{self, Command, Header, Message, HEADER_LEN, MAX_BODY_LEN, STATUS_OK};

const REQUEST_QUEUE: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
    /// Device auth token
    pub token: String,
    /// Ping interval; a session silent for two intervals is dropped
    pub heartbeat: Duration,
    /// Pause before reconnecting
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// Configuration with the default 5 second reconnect delay
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>, heartbeat: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            token: token.into(),
            heartbeat,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
enum Request {
    VirtualWrite { pin: u8, value: String },
    SetProperty { pin: u8, property: String, value: String },
    Shutdown,
}

enum SessionEnd {
    Shutdown,
    Lost(BlynkError),
}

/// Handle to the background connection task
pub struct BlynkClient {
    requests: mpsc::Sender<Request>,
    connected: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BlynkClient {
    /// Spawn the connection task. Must be called inside a tokio runtime.
    pub fn start(config: ClientConfig) -> Self {
        let (requests, rx) = mpsc::channel(REQUEST_QUEUE);
        let (state_tx, connected) = watch::channel(false);
        let task = tokio::spawn(run_connection(config, rx, state_tx));
        Self {
            requests,
            connected,
            task: Mutex::new(Some(task)),
        }
    }

    /// Whether a logged-in session is currently up
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until a session is up, or until `timeout` elapses
    pub async fn wait_connected(&self, timeout: Duration) -> BlynkResult<()> {
        let mut state = self.connected.clone();
        let wait = async {
            while !*state.borrow_and_update() {
                if state.changed().await.is_err() {
                    return Err(BlynkError::Closed);
                }
            }
            Ok(())
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| BlynkError::Timeout("waiting for dashboard session".to_string()))?
    }

    /// Write a value to a virtual pin
    pub async fn virtual_write(&self, pin: u8, value: impl Into<String>) -> BlynkResult<()> {
        self.submit(Request::VirtualWrite {
            pin,
            value: value.into(),
        })
        .await
    }

    /// Set a widget property such as `color` or `label`
    pub async fn set_property(
        &self,
        pin: u8,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> BlynkResult<()> {
        self.submit(Request::SetProperty {
            pin,
            property: property.into(),
            value: value.into(),
        })
        .await
    }

    async fn submit(&self, request: Request) -> BlynkResult<()> {
        if !self.is_connected() {
            return Err(BlynkError::NotConnected);
        }
        self.requests
            .send(request)
            .await
            .map_err(|_| BlynkError::Closed)
    }

    /// Close the session and wait for the connection task to finish
    pub async fn disconnect(&self) {
        let _ = self.requests.send(Request::Shutdown).await;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Dashboard connection task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_connection(
    config: ClientConfig,
    mut requests: mpsc::Receiver<Request>,
    state: watch::Sender<bool>,
) {
    let mut reported_failure = false;

    loop {
        match connect(&config).await {
            Ok(stream) => {
                reported_failure = false;
                let _ = state.send(true);
                info!(host = %config.host, port = config.port, "Connected to dashboard server");

                let end = session(stream, &config, &mut requests).await;
                let _ = state.send(false);
                match end {
                    SessionEnd::Shutdown => {
                        info!("Disconnected from dashboard server");
                        return;
                    }
                    SessionEnd::Lost(e) => {
                        warn!("Disconnected from dashboard server: {}", e);
                    }
                }
            }
            Err(e) => {
                if !reported_failure {
                    warn!(host = %config.host, port = config.port, "Dashboard connection failed: {}", e);
                    reported_failure = true;
                } else {
                    debug!("Dashboard reconnect failed: {}", e);
                }
            }
        }

        if wait_offline(config.reconnect_delay, &mut requests).await {
            return;
        }
    }
}

/// Sleep out the reconnect delay while discarding writes. Returns true on shutdown.
async fn wait_offline(delay: Duration, requests: &mut mpsc::Receiver<Request>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            request = requests.recv() => match request {
                None | Some(Request::Shutdown) => return true,
                Some(dropped) => debug!(?dropped, "Dropping dashboard write while offline"),
            }
        }
    }
}

async fn connect(config: &ClientConfig) -> BlynkResult<TcpStream> {
    let attempt = async {
        let mut stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        stream
            .write_all(&protocol::hardware_login(1, &config.token).encode()?)
            .await?;

        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await?;
        let header = Header::decode(header);
        if !header.is_response() {
            return Err(BlynkError::Protocol(format!(
                "expected login response, got command {}",
                header.command
            )));
        }
        if header.length != STATUS_OK {
            return Err(BlynkError::Auth(header.length));
        }

        let heartbeat = config.heartbeat.as_secs();
        stream
            .write_all(&protocol::heartbeat_announcement(2, heartbeat).encode()?)
            .await?;
        Ok(stream)
    };

    tokio::time::timeout(CONNECT_TIMEOUT, attempt)
        .await
        .map_err(|_| BlynkError::Timeout(format!("connecting to {}:{}", config.host, config.port)))?
}

async fn session(
    stream: TcpStream,
    config: &ClientConfig,
    requests: &mut mpsc::Receiver<Request>,
) -> SessionEnd {
    let (read_half, mut write_half) = stream.into_split();
    let (incoming_tx, mut incoming) = mpsc::channel(16);
    let reader = tokio::spawn(read_messages(read_half, incoming_tx));

    let heartbeat = config.heartbeat.max(Duration::from_secs(1));
    let mut ping = tokio::time::interval(heartbeat);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await;

    let mut msg_id: u16 = 2;
    let mut last_seen = Instant::now();

    let end = loop {
        tokio::select! {
            request = requests.recv() => {
                let message = match request {
                    None | Some(Request::Shutdown) => {
                        let _ = write_half.shutdown().await;
                        break SessionEnd::Shutdown;
                    }
                    Some(Request::VirtualWrite { pin, value }) => {
                        protocol::virtual_write(next_id(&mut msg_id), pin, &value)
                    }
                    Some(Request::SetProperty { pin, property, value }) => {
                        protocol::set_property(next_id(&mut msg_id), pin, &property, &value)
                    }
                };
                if let Err(e) = send(&mut write_half, &message).await {
                    break SessionEnd::Lost(e);
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() > heartbeat.saturating_mul(2) {
                    break SessionEnd::Lost(BlynkError::Timeout("heartbeat".to_string()));
                }
                if let Err(e) = send(&mut write_half, &protocol::ping(next_id(&mut msg_id))).await {
                    break SessionEnd::Lost(e);
                }
            }
            message = incoming.recv() => match message {
                Some(Ok(message)) => {
                    last_seen = Instant::now();
                    if let Err(e) = handle_incoming(&mut write_half, message).await {
                        break SessionEnd::Lost(e);
                    }
                }
                Some(Err(e)) => break SessionEnd::Lost(e),
                None => break SessionEnd::Lost(BlynkError::Closed),
            }
        }
    };

    reader.abort();
    end
}

fn next_id(msg_id: &mut u16) -> u16 {
    *msg_id = if *msg_id == u16::MAX { 1 } else { *msg_id + 1 };
    *msg_id
}

async fn send(write_half: &mut OwnedWriteHalf, message: &Message) -> BlynkResult<()> {
    write_half.write_all(&message.encode()?).await?;
    Ok(())
}

async fn handle_incoming(write_half: &mut OwnedWriteHalf, message: Message) -> BlynkResult<()> {
    match Command::from_byte(message.command) {
        Some(Command::Response) => {}
        Some(Command::Ping) => {
            write_half
                .write_all(&protocol::response(message.msg_id, STATUS_OK))
                .await?;
        }
        Some(Command::Hardware) => {
            debug!(fields = ?message.fields(), "Ignoring app write");
        }
        _ => {
            debug!(command = message.command, "Ignoring dashboard message");
        }
    }
    Ok(())
}

async fn read_messages(
    mut read_half: OwnedReadHalf,
    incoming: mpsc::Sender<BlynkResult<Message>>,
) {
    loop {
        let result = read_message(&mut read_half).await;
        let failed = result.is_err();
        if incoming.send(result).await.is_err() || failed {
            return;
        }
    }
}

async fn read_message(read_half: &mut OwnedReadHalf) -> BlynkResult<Message> {
    let mut header = [0u8; HEADER_LEN];
    read_half.read_exact(&mut header).await?;
    let header = Header::decode(header);

    let body_len = header.body_len();
    if body_len > MAX_BODY_LEN {
        return Err(BlynkError::Protocol(format!(
            "message body of {} bytes exceeds limit",
            body_len
        )));
    }
    let mut body = vec![0u8; body_len];
    read_half.read_exact(&mut body).await?;

    Ok(Message {
        command: header.command,
        msg_id: header.msg_id,
        body,
    })
}
