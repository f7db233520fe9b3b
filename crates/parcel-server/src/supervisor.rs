use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parcel_logging::{TransferEvent, TransferLog, TransferLogger};
use parcel_net::{Peer, TransportError};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::handlers::{dispatch_frame, Handler, ServerContext};
use crate::session::cleanup_session;

/// One bound listening socket, either side of the stream/datagram split.
pub enum BoundSocket {
    Udp(UdpSocket),
    Tcp(TcpListener),
}

/// Bind every candidate address, collecting successes. If none succeed and
/// at least one candidate failed with "address in use", that specific error
/// is surfaced instead of a generic failure.
pub fn bind_all(
    candidates: &[SocketAddr],
    protocol: parcel_net::Protocol,
    logger: &Arc<dyn TransferLogger>,
) -> anyhow::Result<Vec<(SocketAddr, BoundSocket)>> {
    let mut bound = Vec::new();
    let mut addr_in_use: Option<SocketAddr> = None;

    for &addr in candidates {
        let result = match protocol {
            parcel_net::Protocol::Udp => parcel_net::bind_udp_socket(addr).map(BoundSocket::Udp),
            parcel_net::Protocol::Tcp => parcel_net::bind_tcp_listener(addr).map(BoundSocket::Tcp),
        };
        match result {
            Ok(sock) => bound.push((addr, sock)),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                logger.log(TransferLog {
                    component: "supervisor",
                    session_id: None,
                    event: TransferEvent::BindFailed {
                        addr: addr.to_string(),
                        reason: err.to_string(),
                    },
                });
                addr_in_use = Some(addr);
            }
            Err(err) => {
                logger.log(TransferLog {
                    component: "supervisor",
                    session_id: None,
                    event: TransferEvent::BindFailed {
                        addr: addr.to_string(),
                        reason: err.to_string(),
                    },
                });
            }
        }
    }

    if bound.is_empty() {
        if let Some(addr) = addr_in_use {
            anyhow::bail!("address already in use: {addr}");
        }
        anyhow::bail!("failed to bind any candidate address");
    }

    Ok(bound)
}

/// Serve one bound socket until `running` clears. Returns once the socket's
/// accept/receive loop has observed the shutdown flag.
pub async fn serve(
    addr: SocketAddr,
    socket: BoundSocket,
    handlers: Arc<Vec<Arc<dyn Handler>>>,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
    chunk_size: usize,
    timeout: Duration,
) {
    match socket {
        BoundSocket::Udp(socket) => serve_udp(addr, socket, handlers, ctx, running, chunk_size).await,
        BoundSocket::Tcp(listener) => {
            serve_tcp(addr, listener, handlers, ctx, running, chunk_size, timeout).await
        }
    }
}

async fn serve_udp(
    addr: SocketAddr,
    socket: UdpSocket,
    handlers: Arc<Vec<Arc<dyn Handler>>>,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
    chunk_size: usize,
) {
    let socket = Arc::new(socket);
    ctx.logger.log(TransferLog {
        component: "supervisor",
        session_id: None,
        event: TransferEvent::Bound { addr: addr.to_string() },
    });

    let mut workers = JoinSet::new();
    let mut buf = vec![0u8; chunk_size];
    while running.load(Ordering::Acquire) {
        let recv = tokio::time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await;
        let (n, from) = match recv {
            Ok(Ok(pair)) => pair,
            Ok(Err(_)) => continue,
            Err(_) => continue, // 200ms poll tick, re-check `running`
        };
        let frame_bytes = buf[..n].to_vec();
        let peer = Peer::Udp {
            socket: socket.clone(),
            addr: from,
        };
        let handlers = handlers.clone();
        let ctx = ctx.clone();
        workers.spawn(async move {
            dispatch_frame(&handlers, &frame_bytes, &peer, &ctx).await;
        });
    }

    // Shutdown observed; let in-flight worker tasks finish their frame.
    while workers.join_next().await.is_some() {}
}

async fn serve_tcp(
    addr: SocketAddr,
    listener: TcpListener,
    handlers: Arc<Vec<Arc<dyn Handler>>>,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
    chunk_size: usize,
    timeout: Duration,
) {
    ctx.logger.log(TransferLog {
        component: "supervisor",
        session_id: None,
        event: TransferEvent::Bound { addr: addr.to_string() },
    });

    let mut workers = JoinSet::new();
    while running.load(Ordering::Acquire) {
        let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        let (stream, _) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(_)) => continue,
            Err(_) => continue,
        };
        let handlers = handlers.clone();
        let ctx = ctx.clone();
        let running = running.clone();
        workers.spawn(async move {
            serve_tcp_peer(stream, handlers, ctx, running, chunk_size, timeout).await;
        });
    }

    // Shutdown observed; let in-flight peer tasks finish their frame and
    // run their peer-close cleanup before this listener task returns.
    while workers.join_next().await.is_some() {}
}

async fn serve_tcp_peer(
    stream: tokio::net::TcpStream,
    handlers: Arc<Vec<Arc<dyn Handler>>>,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
    chunk_size: usize,
    timeout: Duration,
) {
    let stream = Arc::new(Mutex::new(stream));
    let peer = Peer::new_tcp(stream.clone());

    loop {
        if !running.load(Ordering::Acquire) {
            break;
        }
        let read = {
            let mut guard = stream.lock().await;
            parcel_net::recv_frame_tcp(&mut guard, chunk_size, timeout).await
        };
        match read {
            Ok(bytes) => dispatch_frame(&handlers, &bytes, &peer, &ctx).await,
            Err(TransportError::Timeout) => continue,
            Err(TransportError::Closed) | Err(TransportError::Io(_)) => break,
        }
    }

    for session_id in peer.owned_sessions().await {
        if let crate::session::LockOutcome::Found(mut guard) = ctx.table.find_and_lock(&session_id).await {
            cleanup_session(&mut guard).await;
            drop(guard);
            ctx.table.remove(&session_id).await;
        }
    }
}
