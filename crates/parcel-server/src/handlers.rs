use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parcel_logging::{TransferEvent, TransferLog, TransferLogger};
use parcel_net::Peer;
use parcel_protocol::Frame;
use tokio::io::AsyncWriteExt;

use crate::sandbox;
use crate::session::{LockOutcome, SessionRecord, SessionTable};

pub struct ServerContext {
    pub table: Arc<SessionTable>,
    pub save_root: PathBuf,
    pub logger: Arc<dyn TransferLogger>,
}

impl ServerContext {
    fn log(&self, session_id: Option<String>, event: TransferEvent) {
        self.logger.log(TransferLog {
            component: "receiver",
            session_id,
            event,
        });
    }
}

/// One link in the receiver's handler chain. Returning `true` means the
/// frame was consumed (a response, if any, was already sent) and the chain
/// stops; `false` passes the frame to the next handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, frame: &Frame<'_>, peer: &Peer, ctx: &ServerContext) -> bool;
}

/// Run an inbound buffer through the registered handler chain in order.
/// Frames too short or otherwise malformed are dropped silently (logged at
/// debug); the sentinel and opcode dispatch happens once, here.
pub async fn dispatch_frame(
    handlers: &[Arc<dyn Handler>],
    buf: &[u8],
    peer: &Peer,
    ctx: &ServerContext,
) {
    let frame = match parcel_protocol::decode(buf) {
        Ok(frame) => frame,
        Err(err) => {
            ctx.log(
                None,
                TransferEvent::MalformedFrame {
                    reason: err.to_string(),
                },
            );
            return;
        }
    };
    for handler in handlers {
        if handler.handle(&frame, peer, ctx).await {
            return;
        }
    }
}

/// Replies `HELLO` to `HELLO`, nothing else. Kept decoupled from the
/// transfer handler so a liveness probe never touches the session table.
pub struct HelloHandler;

#[async_trait]
impl Handler for HelloHandler {
    async fn handle(&self, frame: &Frame<'_>, peer: &Peer, _ctx: &ServerContext) -> bool {
        if matches!(frame, Frame::Hello) {
            let _ = peer.send_frame(&parcel_protocol::encode_hello()).await;
            true
        } else {
            false
        }
    }
}

/// Handles `HS` (handshake) and `TRANSFER` (chunk) frames.
pub struct TransferHandler;

#[async_trait]
impl Handler for TransferHandler {
    async fn handle(&self, frame: &Frame<'_>, peer: &Peer, ctx: &ServerContext) -> bool {
        match frame {
            Frame::Hs { file_size, filename } => {
                handle_hs(*file_size, filename, peer, ctx).await;
                true
            }
            Frame::Transfer {
                session_id,
                chunk_no,
                data,
            } => {
                handle_transfer(session_id, *chunk_no, data, peer, ctx).await;
                true
            }
            _ => false,
        }
    }
}

async fn handle_hs(file_size: u32, filename: &str, peer: &Peer, ctx: &ServerContext) {
    if !sandbox::is_safe_filename(filename) {
        ctx.log(
            None,
            TransferEvent::SessionRejected {
                reason: format!("unsafe filename {filename:?}"),
            },
        );
        let _ = peer.send_frame(&parcel_protocol::encode_reject()).await;
        return;
    }

    let absolute_path = sandbox::sandboxed_path(&ctx.save_root, filename);
    let sink = match tokio::fs::File::create(&absolute_path).await {
        Ok(sink) => sink,
        Err(err) => {
            ctx.log(
                None,
                TransferEvent::Error {
                    message: format!("cannot open destination for {filename:?}: {err}"),
                },
            );
            let _ = peer.send_frame(&parcel_protocol::encode_drop()).await;
            return;
        }
    };

    let session_id = parcel_protocol::new_session_id();
    let record = SessionRecord::new(filename.to_string(), file_size as u64, absolute_path, sink);
    ctx.table.insert(session_id.clone(), record).await;
    peer.register_session(session_id.clone()).await;

    ctx.log(
        Some(session_id.clone()),
        TransferEvent::SessionCreated {
            filename: filename.to_string(),
            file_size,
        },
    );
    let _ = peer.send_frame(&parcel_protocol::encode_ok(&session_id)).await;
}

async fn handle_transfer(session_id: &str, chunk_no: u32, data: &[u8], peer: &Peer, ctx: &ServerContext) {
    let mut guard = match ctx.table.find_and_lock(session_id).await {
        LockOutcome::Found(guard) => guard,
        LockOutcome::Missing | LockOutcome::Busy => {
            ctx.log(
                Some(session_id.to_string()),
                TransferEvent::ChunkRejected {
                    reason: "unknown or busy session".into(),
                },
            );
            let _ = peer.send_frame(&parcel_protocol::encode_reject()).await;
            return;
        }
    };

    if chunk_no != guard.next_chunk {
        ctx.log(
            Some(session_id.to_string()),
            TransferEvent::ChunkRejected {
                reason: format!("expected chunk {}, got {chunk_no}", guard.next_chunk),
            },
        );
        let _ = peer.send_frame(&parcel_protocol::encode_reject()).await;
        return;
    }

    guard.touch();
    guard.status = crate::session::SessionStatus::Transfering;

    let remaining = guard.filesize - guard.written;
    let effective = std::cmp::min(data.len() as u64, remaining) as usize;

    // A chunk that passes the chunk-number check always advances the
    // counters; `effective` only gates whether bytes are actually written
    // (a zero-length file's sole chunk carries no data to write).
    if effective > 0 {
        if let Some(sink) = guard.sink.as_mut() {
            if let Err(err) = sink.write_all(&data[..effective]).await {
                ctx.log(
                    Some(session_id.to_string()),
                    TransferEvent::Error {
                        message: format!("write failed: {err}"),
                    },
                );
                let _ = peer.send_frame(&parcel_protocol::encode_drop()).await;
                return;
            }
        }
    }
    guard.written += effective as u64;
    guard.next_chunk += 1;

    if guard.written == guard.filesize {
        guard.sink.take();
        guard.status = crate::session::SessionStatus::Done;
        let next_chunk = guard.next_chunk;
        let filesize = guard.filesize;
        drop(guard);
        ctx.table.remove(session_id).await;
        ctx.log(Some(session_id.to_string()), TransferEvent::SessionCompleted { filesize });
        let _ = peer
            .send_frame(&parcel_protocol::encode_done(session_id, next_chunk))
            .await;
    } else {
        let next_chunk = guard.next_chunk;
        let written = guard.written;
        drop(guard);
        ctx.log(
            Some(session_id.to_string()),
            TransferEvent::ChunkAccepted { chunk_no, written },
        );
        let _ = peer
            .send_frame(&parcel_protocol::encode_received(session_id, next_chunk))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_logging::NullLogger;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Arc as StdArc;
    use tokio::net::UdpSocket;

    async fn context(root: &std::path::Path) -> ServerContext {
        ServerContext {
            table: Arc::new(SessionTable::new()),
            save_root: root.to_path_buf(),
            logger: StdArc::new(NullLogger),
        }
    }

    /// A server-side `Peer` that sends from its own ephemeral socket to
    /// `client`'s address, plus the client socket to read replies from.
    async fn udp_peer_pair() -> (Peer, UdpSocket) {
        let server_socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let client_socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let client_addr = client_socket.local_addr().unwrap();
        let peer = Peer::Udp {
            socket: Arc::new(server_socket),
            addr: client_addr,
        };
        (peer, client_socket)
    }

    async fn udp_peer() -> Peer {
        udp_peer_pair().await.0
    }

    #[tokio::test]
    async fn hs_then_single_transfer_completes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let (peer, client) = udp_peer_pair().await;
        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(HelloHandler), Arc::new(TransferHandler)];

        dispatch_frame(&handlers, &parcel_protocol::encode_hs(5, "a.bin"), &peer, &ctx).await;
        assert_eq!(ctx.table.len().await, 1);

        let mut buf = [0u8; 128];
        let n = client.recv(&mut buf).await.unwrap();
        let session_id = match parcel_protocol::decode(&buf[..n]).unwrap() {
            Frame::Ok { session_id } => session_id.to_string(),
            other => panic!("expected OK, got {other:?}"),
        };

        dispatch_frame(
            &handlers,
            &parcel_protocol::encode_transfer(&session_id, 1, b"hello"),
            &peer,
            &ctx,
        )
        .await;

        let n = client.recv(&mut buf).await.unwrap();
        match parcel_protocol::decode(&buf[..n]).unwrap() {
            Frame::Done { session_id: sid, next_expected_chunk } => {
                assert_eq!(sid, session_id);
                assert_eq!(next_expected_chunk, 2);
            }
            other => panic!("expected DONE, got {other:?}"),
        }

        assert_eq!(ctx.table.len().await, 0);
        let persisted = tokio::fs::read(dir.path().join("a.bin")).await.unwrap();
        assert_eq!(persisted, b"hello");
    }

    #[tokio::test]
    async fn wrong_chunk_number_is_rejected_and_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let (peer, client) = udp_peer_pair().await;
        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(HelloHandler), Arc::new(TransferHandler)];

        dispatch_frame(&handlers, &parcel_protocol::encode_hs(5, "b.bin"), &peer, &ctx).await;
        let mut buf = [0u8; 128];
        let n = client.recv(&mut buf).await.unwrap();
        let session_id = match parcel_protocol::decode(&buf[..n]).unwrap() {
            Frame::Ok { session_id } => session_id.to_string(),
            other => panic!("expected OK, got {other:?}"),
        };

        dispatch_frame(
            &handlers,
            &parcel_protocol::encode_transfer(&session_id, 2, b"oops"),
            &peer,
            &ctx,
        )
        .await;

        let n = client.recv(&mut buf).await.unwrap();
        assert_eq!(parcel_protocol::decode(&buf[..n]).unwrap(), Frame::Reject);
        assert_eq!(tokio::fs::metadata(dir.path().join("b.bin")).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn zero_length_file_completes_on_its_first_empty_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let (peer, client) = udp_peer_pair().await;
        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(HelloHandler), Arc::new(TransferHandler)];

        dispatch_frame(&handlers, &parcel_protocol::encode_hs(0, "empty.bin"), &peer, &ctx).await;
        let mut buf = [0u8; 128];
        let n = client.recv(&mut buf).await.unwrap();
        let session_id = match parcel_protocol::decode(&buf[..n]).unwrap() {
            Frame::Ok { session_id } => session_id.to_string(),
            other => panic!("expected OK, got {other:?}"),
        };

        dispatch_frame(
            &handlers,
            &parcel_protocol::encode_transfer(&session_id, 1, b""),
            &peer,
            &ctx,
        )
        .await;

        let n = client.recv(&mut buf).await.unwrap();
        match parcel_protocol::decode(&buf[..n]).unwrap() {
            Frame::Done { session_id: sid, next_expected_chunk } => {
                assert_eq!(sid, session_id);
                assert_eq!(next_expected_chunk, 2);
            }
            other => panic!("expected DONE, got {other:?}"),
        }
        assert_eq!(tokio::fs::metadata(dir.path().join("empty.bin")).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn unsafe_filename_never_opens_a_sink() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let peer = udp_peer().await;
        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(HelloHandler), Arc::new(TransferHandler)];

        dispatch_frame(
            &handlers,
            &parcel_protocol::encode_hs(10, "../etc/passwd"),
            &peer,
            &ctx,
        )
        .await;

        assert_eq!(ctx.table.len().await, 0);
        assert!(!dir.path().join("passwd").exists());
    }

    #[tokio::test]
    async fn transfer_for_unknown_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let peer = udp_peer().await;
        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(HelloHandler), Arc::new(TransferHandler)];

        let bogus = "00000000-0000-7000-8000-000000000000";
        dispatch_frame(
            &handlers,
            &parcel_protocol::encode_transfer(bogus, 1, b"x"),
            &peer,
            &ctx,
        )
        .await;

        assert_eq!(ctx.table.len().await, 0);
    }
}
