//! Integration test: drive the real supervisor (bind, accept/receive loop,
//! graceful shutdown) over a loopback UDP socket, exactly as `main` does,
//! and verify a full handshake/chunk-loop round trip end to end.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parcel_logging::NullLogger;
use parcel_server::handlers::{HelloHandler, ServerContext, TransferHandler};
use parcel_server::session::SessionTable;
use parcel_server::supervisor;
use tokio::net::UdpSocket;

#[tokio::test]
async fn server_round_trips_a_full_file_over_loopback() {
    let dir = tempfile::tempdir().unwrap();
    let save_root = dir.path().to_path_buf();

    let candidates = vec![SocketAddr::from((Ipv4Addr::LOCALHOST, 0))];
    let logger: Arc<dyn parcel_logging::TransferLogger> = Arc::new(NullLogger);
    let bound = supervisor::bind_all(&candidates, parcel_net::Protocol::Udp, &logger).unwrap();
    assert_eq!(bound.len(), 1);
    let (addr, socket) = bound.into_iter().next().unwrap();

    let table = Arc::new(SessionTable::new());
    let ctx = Arc::new(ServerContext {
        table: table.clone(),
        save_root: save_root.clone(),
        logger,
    });
    let handlers = Arc::new(vec![
        Arc::new(HelloHandler) as Arc<dyn parcel_server::handlers::Handler>,
        Arc::new(TransferHandler),
    ]);
    let running = Arc::new(AtomicBool::new(true));

    let running_for_serve = running.clone();
    let serve_task = tokio::spawn(async move {
        supervisor::serve(
            addr,
            socket,
            handlers,
            ctx,
            running_for_serve,
            2048,
            Duration::from_millis(500),
        )
        .await;
    });

    let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    client.connect(addr).await.unwrap();

    client.send(&parcel_protocol::encode_hello()).await.unwrap();
    let mut buf = [0u8; 256];
    let n = client.recv(&mut buf).await.unwrap();
    assert_eq!(parcel_protocol::decode(&buf[..n]).unwrap(), parcel_protocol::Frame::Hello);

    let contents = b"integration test payload";
    client
        .send(&parcel_protocol::encode_hs(contents.len() as u32, "roundtrip.bin"))
        .await
        .unwrap();
    let n = client.recv(&mut buf).await.unwrap();
    let session_id = match parcel_protocol::decode(&buf[..n]).unwrap() {
        parcel_protocol::Frame::Ok { session_id } => session_id.to_string(),
        other => panic!("expected OK, got {other:?}"),
    };

    client
        .send(&parcel_protocol::encode_transfer(&session_id, 1, contents))
        .await
        .unwrap();
    let n = client.recv(&mut buf).await.unwrap();
    match parcel_protocol::decode(&buf[..n]).unwrap() {
        parcel_protocol::Frame::Done { session_id: sid, next_expected_chunk } => {
            assert_eq!(sid, session_id);
            assert_eq!(next_expected_chunk, 2);
        }
        other => panic!("expected DONE, got {other:?}"),
    }

    let persisted = tokio::fs::read(save_root.join("roundtrip.bin")).await.unwrap();
    assert_eq!(persisted, contents);

    // Shutdown: clear the flag and the serving task should drain its
    // in-flight worker and return.
    running.store(false, Ordering::Release);
    tokio::time::timeout(Duration::from_secs(2), serve_task)
        .await
        .expect("serve task did not shut down in time")
        .unwrap();
}
