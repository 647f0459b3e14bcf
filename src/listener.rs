//! UDP listener for logging software broadcasts.
//!
//! At most one socket is bound at a time. Rebinding always closes the
//! previous socket, and waits for it to be dropped, before the new bind is
//! issued, so switching profiles never trips over "address in use".

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::parser::ParseError;
use crate::profile::{Registry, SoftwareProfile};
use crate::qso::NormalizedQso;

/// Largest datagram accepted. Anything longer is truncated by the socket.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Pause after a receive error before reading again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("Failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    #[error("Failed to read bound address: {0}")]
    LocalAddr(std::io::Error),
}

/// A datagram as it came off the socket.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Payload decoded as UTF-8 (lossy).
    pub text: String,
    pub peer: SocketAddr,
    pub received_at: DateTime<Utc>,
}

/// Events emitted by the listener.
#[derive(Debug)]
pub enum ListenerEvent {
    /// A socket is bound and receiving.
    Listening { port: u16 },

    /// A datagram arrived and went through the profile's parser.
    Datagram {
        datagram: Datagram,
        profile: SoftwareProfile,
        parsed: Result<NormalizedQso, ParseError>,
    },

    /// The socket reported an error while receiving.
    Error(String),
}

struct Bound {
    /// Port requested by the caller; identifies the profile.
    requested: u16,
    /// Port actually bound (differs when `requested` is 0).
    local: u16,
    task: JoinHandle<()>,
}

/// Rebindable UDP listener.
pub struct UdpListener {
    bind_address: IpAddr,
    registry: Arc<Registry>,
    events: mpsc::Sender<ListenerEvent>,
    bound: Option<Bound>,
}

impl UdpListener {
    pub fn new(
        bind_address: IpAddr,
        registry: Arc<Registry>,
        events: mpsc::Sender<ListenerEvent>,
    ) -> Self {
        Self {
            bind_address,
            registry,
            events,
            bound: None,
        }
    }

    /// Port requested by the last successful [`UdpListener::start`], if bound.
    pub fn port(&self) -> Option<u16> {
        self.bound.as_ref().map(|b| b.requested)
    }

    /// Port the socket is actually bound to.
    pub fn local_port(&self) -> Option<u16> {
        self.bound.as_ref().map(|b| b.local)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Bind `port` and start receiving, closing any socket bound before.
    ///
    /// Returns the bound port. On failure the listener is left unbound.
    pub async fn start(&mut self, port: u16) -> Result<u16, ListenError> {
        self.stop().await;

        let socket = UdpSocket::bind((self.bind_address, port))
            .await
            .map_err(|source| ListenError::Bind { port, source })?;
        let local = socket.local_addr().map_err(ListenError::LocalAddr)?.port();

        info!("UDP listener bound on {}:{}", self.bind_address, local);
        if let Err(e) = self.events.try_send(ListenerEvent::Listening { port: local }) {
            warn!("Could not announce listener on port {}: {}", local, e);
        }

        let task = tokio::spawn(receive_loop(
            socket,
            port,
            Arc::clone(&self.registry),
            self.events.clone(),
        ));

        self.bound = Some(Bound {
            requested: port,
            local,
            task,
        });
        Ok(local)
    }

    /// Rebind to `port` unless it is already the bound port.
    ///
    /// Returns `Ok(false)` for the no-op case.
    pub async fn rebind(&mut self, port: u16) -> Result<bool, ListenError> {
        if self.port() == Some(port) {
            debug!("Already listening for port {}, not rebinding", port);
            return Ok(false);
        }
        self.start(port).await?;
        Ok(true)
    }

    /// Close the socket. Safe to call when unbound.
    pub async fn stop(&mut self) {
        if let Some(bound) = self.bound.take() {
            bound.task.abort();
            // The socket is owned by the task; awaiting it guarantees it is dropped.
            let _ = bound.task.await;
            info!("UDP listener on port {} closed", bound.local);
        }
    }
}

impl Drop for UdpListener {
    fn drop(&mut self) {
        if let Some(bound) = self.bound.take() {
            bound.task.abort();
        }
    }
}

/// Receive datagrams until the task is aborted or the event receiver is gone.
async fn receive_loop(
    socket: UdpSocket,
    requested_port: u16,
    registry: Arc<Registry>,
    events: mpsc::Sender<ListenerEvent>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // Windows reports ICMP port-unreachable as a read error; keep going.
                if !recv_failed(&events, e).await {
                    return;
                }
                continue;
            }
        };

        let event = dispatch(&registry, requested_port, &buf[..len], peer);
        if events.send(event).await.is_err() {
            // Receiver dropped
            return;
        }
    }
}

/// Report a receive error, then pause so a persistent error cannot spin.
///
/// Returns false once the event receiver is gone.
async fn recv_failed(events: &mpsc::Sender<ListenerEvent>, e: std::io::Error) -> bool {
    warn!("UDP receive error: {}", e);
    if events.send(ListenerEvent::Error(e.to_string())).await.is_err() {
        return false;
    }
    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
    true
}

/// Decode, pick the profile for the port and parse.
pub fn dispatch(registry: &Registry, port: u16, payload: &[u8], peer: SocketAddr) -> ListenerEvent {
    let text = String::from_utf8_lossy(payload).into_owned();
    let profile = *registry.resolve(port);

    debug!("Datagram from {}: {}", peer, text);
    info!("Processing message from {} as {}", peer, profile.display_name);

    let parsed = profile.parser.parse(&text);

    ListenerEvent::Datagram {
        datagram: Datagram {
            text,
            peer,
            received_at: Utc::now(),
        },
        profile,
        parsed,
    }
}
