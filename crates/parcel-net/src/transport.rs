use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;

use crate::Protocol;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out waiting for a frame")]
    Timeout,
    #[error("peer closed the connection")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A receiver-side handle capable of replying to whoever sent the frame
/// currently being handled.
///
/// For UDP the peer is the remote address captured from the datagram that
/// triggered the current dispatch; for TCP it is the accepted connection.
#[derive(Clone)]
pub enum Peer {
    Udp {
        socket: Arc<UdpSocket>,
        addr: SocketAddr,
    },
    Tcp {
        stream: Arc<Mutex<TcpStream>>,
        /// Session ids minted over this connection, so the per-peer worker
        /// can clean them up on peer close instead of waiting for the
        /// reaper.
        sessions: Arc<Mutex<Vec<String>>>,
    },
}

impl Peer {
    pub fn new_tcp(stream: Arc<Mutex<TcpStream>>) -> Self {
        Peer::Tcp {
            stream,
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn send_frame(&self, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            Peer::Udp { socket, addr } => {
                socket.send_to(bytes, *addr).await?;
                Ok(())
            }
            Peer::Tcp { stream, .. } => {
                let mut stream = stream.lock().await;
                stream.write_all(bytes).await?;
                Ok(())
            }
        }
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        match self {
            Peer::Udp { addr, .. } => Some(*addr),
            Peer::Tcp { .. } => None,
        }
    }

    /// Record that a session was created over this connection. A no-op for
    /// UDP peers, whose sessions are reclaimed only by the reaper.
    pub async fn register_session(&self, session_id: String) {
        if let Peer::Tcp { sessions, .. } = self {
            sessions.lock().await.push(session_id);
        }
    }

    /// Drain and return the session ids registered on this connection, for
    /// the peer-close cleanup hook. A no-op for UDP peers.
    pub async fn owned_sessions(&self) -> Vec<String> {
        match self {
            Peer::Udp { .. } => Vec::new(),
            Peer::Tcp { sessions, .. } => std::mem::take(&mut *sessions.lock().await),
        }
    }
}

/// Read one frame off an accepted TCP stream, bounded by `max_bytes` and the
/// configured timeout. Used by the per-peer worker loop; UDP frames are read
/// from the shared socket's single receive loop instead.
pub async fn recv_frame_tcp(
    stream: &mut TcpStream,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let mut buf = vec![0u8; max_bytes];
    match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(0)) => Err(TransportError::Closed),
        Ok(Ok(n)) => {
            buf.truncate(n);
            Ok(buf)
        }
        Ok(Err(e)) => Err(TransportError::Io(e)),
        Err(_) => Err(TransportError::Timeout),
    }
}

/// The sender side of the transport: a single connection to one target,
/// reusable across the hello probe, handshake, and chunk loop for one file.
pub enum ClientTransport {
    Udp {
        socket: UdpSocket,
        target: SocketAddr,
        timeout: Duration,
    },
    Tcp {
        stream: TcpStream,
        target: SocketAddr,
        timeout: Duration,
    },
}

fn unspecified_bind_addr(target: SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), 0),
        SocketAddr::V6(_) => SocketAddr::new(std::net::Ipv6Addr::UNSPECIFIED.into(), 0),
    }
}

impl ClientTransport {
    pub async fn connect(
        protocol: Protocol,
        target: SocketAddr,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        match protocol {
            Protocol::Udp => {
                let socket = UdpSocket::bind(unspecified_bind_addr(target)).await?;
                socket.connect(target).await?;
                Ok(Self::Udp {
                    socket,
                    target,
                    timeout,
                })
            }
            Protocol::Tcp => {
                let stream = tokio::time::timeout(timeout, TcpStream::connect(target))
                    .await
                    .map_err(|_| TransportError::Timeout)??;
                Ok(Self::Tcp {
                    stream,
                    target,
                    timeout,
                })
            }
        }
    }

    /// Close and reopen the underlying connection to the same target,
    /// matching the sender's "reconnect on failure" behavior before a hello
    /// retry or a fresh file.
    pub async fn reconnect(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Udp { socket, target, .. } => {
                let fresh = UdpSocket::bind(unspecified_bind_addr(*target)).await?;
                fresh.connect(*target).await?;
                *socket = fresh;
                Ok(())
            }
            Self::Tcp {
                stream,
                target,
                timeout,
            } => {
                let fresh = tokio::time::timeout(*timeout, TcpStream::connect(*target))
                    .await
                    .map_err(|_| TransportError::Timeout)??;
                *stream = fresh;
                Ok(())
            }
        }
    }

    pub async fn send_frame(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Udp { socket, timeout, .. } => {
                tokio::time::timeout(*timeout, socket.send(bytes))
                    .await
                    .map_err(|_| TransportError::Timeout)??;
                Ok(())
            }
            Self::Tcp { stream, timeout, .. } => {
                tokio::time::timeout(*timeout, stream.write_all(bytes))
                    .await
                    .map_err(|_| TransportError::Timeout)??;
                Ok(())
            }
        }
    }

    pub async fn recv_frame(&mut self, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
        match self {
            Self::Udp { socket, timeout, .. } => {
                let mut buf = vec![0u8; max_bytes];
                let n = tokio::time::timeout(*timeout, socket.recv(&mut buf))
                    .await
                    .map_err(|_| TransportError::Timeout)??;
                buf.truncate(n);
                Ok(buf)
            }
            Self::Tcp { stream, timeout, .. } => recv_frame_tcp(stream, max_bytes, *timeout).await,
        }
    }
}
