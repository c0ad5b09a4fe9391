/// Connection engine — blocking connect + handshake, the background receive
/// loop, and outgoing-command plumbing.
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{Mutex, RwLock};
use tokio_rustls::TlsConnector;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::channel::Channel;
use crate::codec::LineCodec;
use crate::error::Error;
use crate::event::Event;
use crate::registry::{Entry, Registry, DELIVERY_CAPACITY};

/// How long the receive loop will wait on a full delivery queue before
/// dropping the line. Keeps one inattentive consumer from starving the
/// whole connection.
const DELIVERY_TIMEOUT: Duration = Duration::from_millis(100);

/// Connection settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub nickname: String,
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    /// Server password, sent as PASS before registration when set.
    pub password: Option<String>,
    /// Wire text encoding. Malformed incoming bytes decode lossily.
    pub encoding: &'static Encoding,
}

impl Config {
    pub fn new(nickname: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            server: server.into(),
            port: 6667,
            use_tls: false,
            password: None,
            encoding: UTF_8,
        }
    }
}

/// Commands sent from consumer handles to the receive loop, which owns the
/// framed stream exclusively.
#[derive(Debug)]
pub(crate) enum Command {
    Join { channel: String },
    Part { channel: String },
    Privmsg { target: String, text: String },
    Kick { channel: String, nick: String },
    Pong { token: String },
    Quit,
}

/// One persistent connection to a server.
///
/// Cheap to share: `join`, `send`, and channel handles may be used from any
/// number of tasks concurrently. Exactly one background task runs the
/// receive loop for the lifetime of the connection.
pub struct Connection {
    config: Config,
    registry: Registry,
    cmd_tx: mpsc::UnboundedSender<Command>,
    broken: Arc<AtomicBool>,
}

/// The connection's byte stream — plain TCP or TLS-wrapped.
type NetStream = Box<dyn Transport>;

trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

impl Connection {
    /// Connect, register (optional PASS, then NICK and USER), and start the
    /// receive loop. Fails with [`Error::Connect`] when the network-level
    /// connect does not succeed.
    pub async fn connect(config: Config) -> Result<Self, Error> {
        let addr = format!("{}:{}", config.server, config.port);
        let stream = open_stream(&config, &addr).await?;
        let mut framed = Framed::new(stream, LineCodec::new(config.encoding));

        if let Some(password) = &config.password {
            framed.send(format!("PASS {password}")).await?;
        }
        framed.send(format!("NICK {}", config.nickname)).await?;
        framed
            .send(format!("USER {0} 8 * :{0} IRC Bot", config.nickname))
            .await?;
        info!(server = %config.server, nick = %config.nickname, "registered");

        let registry = Registry::new();
        let broken = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        tokio::spawn(receive_loop(
            framed,
            cmd_rx,
            registry.clone(),
            Arc::clone(&broken),
            config.server.clone(),
        ));

        Ok(Self {
            config,
            registry,
            cmd_tx,
            broken,
        })
    }

    /// Join a channel, returning its handle.
    ///
    /// Idempotent: joining a name that is already registered hands back a
    /// handle sharing the existing delivery queue without sending a second
    /// JOIN. A fresh join inserts the registry entry before this call
    /// returns, so no delivered line can race past a half-constructed
    /// entry. Fails with [`Error::StreamBroken`] once the receive loop has
    /// exited, without leaving an entry behind that nothing will ever feed
    /// or clear.
    pub async fn join(&self, name: &str) -> Result<Channel, Error> {
        if self.cmd_tx.is_closed() {
            return Err(Error::StreamBroken);
        }

        let (entry, inserted) = self
            .registry
            .join_entry(name, || {
                let (tx, rx) = mpsc::channel(DELIVERY_CAPACITY);
                Entry {
                    tx,
                    rx: Arc::new(Mutex::new(rx)),
                    members: Arc::new(RwLock::new(HashSet::new())),
                    closed: Arc::new(AtomicBool::new(false)),
                }
            })
            .await;

        if inserted {
            if let Err(e) = self.command(Command::Join {
                channel: name.to_owned(),
            }) {
                // The receive loop died under us; it will never clear this
                // entry, so roll it back rather than hand out handles that
                // hang on read.
                self.registry.remove(name).await;
                return Err(e);
            }
        }

        Ok(Channel::new(
            name,
            self.cmd_tx.clone(),
            &entry,
            Arc::clone(&self.broken),
            self.registry.clone(),
        ))
    }

    /// Send a message to any destination (channel or nick).
    pub fn send(&self, destination: &str, text: &str) -> Result<(), Error> {
        self.command(Command::Privmsg {
            target: destination.to_owned(),
            text: text.to_owned(),
        })
    }

    /// Kick a nick from a channel.
    pub fn kick(&self, channel: &str, nick: &str) -> Result<(), Error> {
        self.command(Command::Kick {
            channel: channel.to_owned(),
            nick: nick.to_owned(),
        })
    }

    /// Answer a keepalive manually. The receive loop already answers PING
    /// on its own; this exists for servers with unusual expectations.
    pub fn pong(&self, token: &str) -> Result<(), Error> {
        self.command(Command::Pong {
            token: token.to_owned(),
        })
    }

    /// Send QUIT and begin orderly shutdown. The receive loop releases
    /// every channel's delivery queue, so blocked reads observe
    /// end-of-stream.
    pub fn quit(&self) -> Result<(), Error> {
        self.command(Command::Quit)
    }

    /// Whether the receive loop is still running.
    pub fn is_connected(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    pub fn nickname(&self) -> &str {
        &self.config.nickname
    }

    pub fn server(&self) -> &str {
        &self.config.server
    }

    fn command(&self, cmd: Command) -> Result<(), Error> {
        self.cmd_tx.send(cmd).map_err(|_| Error::StreamBroken)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.config.server)
            .field("nickname", &self.config.nickname)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Open the underlying byte stream, optionally TLS-wrapped.
async fn open_stream(config: &Config, addr: &str) -> Result<NetStream, Error> {
    let tcp = TcpStream::connect(addr).await.map_err(|source| Error::Connect {
        addr: addr.to_owned(),
        source,
    })?;

    if !config.use_tls {
        return Ok(Box::new(tcp));
    }

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = rustls::pki_types::ServerName::try_from(config.server.clone())
        .map_err(|e| Error::Connect {
            addr: addr.to_owned(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|source| Error::Connect {
            addr: addr.to_owned(),
            source,
        })?;
    Ok(Box::new(tls))
}

/// The background receive loop. Owns the framed stream; everything else
/// reaches it through the command channel.
async fn receive_loop(
    mut framed: Framed<NetStream, LineCodec>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    registry: Registry,
    broken: Arc<AtomicBool>,
    server: String,
) {
    loop {
        tokio::select! {
            frame = framed.next() => {
                let line = match frame {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!(%server, "receive loop terminating: {e}");
                        broken.store(true, Ordering::Release);
                        break;
                    }
                    None => {
                        info!(%server, "server closed the stream");
                        break;
                    }
                };

                match Event::parse(&line) {
                    Event::ServerCommand { verb, args } => match verb.as_str() {
                        "PING" => {
                            let token = args.into_iter().next().unwrap_or_default();
                            if framed.send(format!("PONG {token}")).await.is_err() {
                                broken.store(true, Ordering::Release);
                                break;
                            }
                        }
                        "ERROR" => {
                            warn!(%server, %line, "server sent ERROR, closing");
                            broken.store(true, Ordering::Release);
                            break;
                        }
                        _ => debug!(%server, %verb, "unhandled server command"),
                    },
                    event @ Event::ChannelEvent { .. } => {
                        dispatch(&event, &registry).await;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                // All consumer handles gone — nothing left to serve.
                let Some(cmd) = cmd else { break };
                let quitting = matches!(cmd, Command::Quit);
                let line = match cmd {
                    Command::Join { channel } => format!("JOIN {channel}"),
                    Command::Part { channel } => format!("PART {channel}"),
                    Command::Privmsg { target, text } => {
                        format!("PRIVMSG {target} :{text}")
                    }
                    Command::Kick { channel, nick } => format!("KICK {channel} {nick}"),
                    Command::Pong { token } => format!("PONG {token}"),
                    Command::Quit => "QUIT".into(),
                };
                if framed.send(line).await.is_err() {
                    broken.store(true, Ordering::Release);
                    break;
                }
                if quitting {
                    break;
                }
            }
        }
    }

    // Release every delivery queue so pending and future channel reads
    // observe end-of-stream instead of hanging.
    registry.clear().await;
}

/// Route one channel event: resolve its destination, track membership, and
/// deliver the formatted log line. Unroutable and unjoined destinations are
/// silently dropped — most server chatter lands here by design of the
/// protocol, not by error.
async fn dispatch(event: &Event, registry: &Registry) {
    let Some((dest, line)) = event.routed_line() else {
        trace!("event with no destination, dropping");
        return;
    };
    let Some((tx, members)) = registry.lookup(dest).await else {
        trace!(%dest, "event for unjoined destination, dropping");
        return;
    };

    // Best-effort membership tracking from observed traffic.
    if let Event::ChannelEvent { nick, verb, .. } = event {
        match verb.as_str() {
            "JOIN" => {
                members.write().await.insert(nick.clone());
            }
            "PART" => {
                members.write().await.remove(nick);
            }
            _ => {}
        }
    }

    match tx.send_timeout(line, DELIVERY_TIMEOUT).await {
        Ok(()) => {}
        Err(SendTimeoutError::Timeout(_)) => {
            warn!(%dest, "delivery queue full, dropping line");
        }
        // Channel parted between lookup and delivery; drop.
        Err(SendTimeoutError::Closed(_)) => {}
    }
}
