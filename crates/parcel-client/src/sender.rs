use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parcel_logging::{TransferEvent, TransferLog, TransferLogger};
use parcel_net::{ClientTransport, Protocol, TransportError};
use parcel_protocol::Frame;
use tokio::io::AsyncReadExt;

/// A fatal error for the current file's session. Per the stop-and-wait
/// discipline the sender never retransmits a chunk; any of these ends the
/// file and the caller may start a fresh session for the next one.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("receiver rejected the session")]
    Rejected,
    #[error("receiver dropped the session due to an i/o failure")]
    Dropped,
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("hello probe failed after {0} attempts")]
    Unreachable(u32),
}

/// Default hello-probe retry counts.
pub const DEFAULT_HELLO_RETRIES: u32 = 3;
pub const DEFAULT_PING_RETRIES: u32 = 4;
const PING_INTERVAL: Duration = Duration::from_millis(1000);

pub struct Sender {
    transport: ClientTransport,
    chunk_size: u32,
    timeout: Duration,
    logger: Arc<dyn TransferLogger>,
}

impl Sender {
    pub async fn connect(
        protocol: Protocol,
        target: std::net::SocketAddr,
        chunk_size: u32,
        timeout: Duration,
        logger: Arc<dyn TransferLogger>,
    ) -> Result<Self, SenderError> {
        let transport = ClientTransport::connect(protocol, target, timeout).await?;
        Ok(Self {
            transport,
            chunk_size,
            timeout,
            logger,
        })
    }

    /// One `HELLO` round trip, bounded by the transport's configured
    /// timeout. Returns the observed round-trip time.
    async fn round_trip_hello(&mut self) -> Result<Duration, SenderError> {
        let start = Instant::now();
        self.transport
            .send_frame(&parcel_protocol::encode_hello())
            .await?;
        let buf = self.transport.recv_frame(self.chunk_size as usize).await?;
        match parcel_protocol::decode(&buf) {
            Ok(Frame::Hello) => Ok(start.elapsed()),
            Ok(_) => Err(SenderError::ProtocolViolation(
                "expected HELLO in reply".into(),
            )),
            Err(err) => Err(SenderError::ProtocolViolation(err.to_string())),
        }
    }

    /// Send `HELLO` and wait for a reply, retrying up to `retries` times and
    /// reconnecting between attempts. "Connected" is defined as one
    /// successful round trip.
    pub async fn hello_probe(&mut self, retries: u32) -> Result<Duration, SenderError> {
        let mut last_err = None;
        for attempt in 1..=retries {
            match self.round_trip_hello().await {
                Ok(rtt) => {
                    self.logger.log(TransferLog {
                        component: "sender",
                        session_id: None,
                        event: TransferEvent::HelloRoundTrip {
                            attempt,
                            rtt_ms: rtt.as_millis() as u64,
                        },
                    });
                    return Ok(rtt);
                }
                Err(err) => {
                    last_err = Some(err);
                    let _ = self.transport.reconnect().await;
                }
            }
        }
        self.logger.log(TransferLog {
            component: "sender",
            session_id: None,
            event: TransferEvent::TransferFailed {
                reason: last_err.map(|e| e.to_string()).unwrap_or_default(),
            },
        });
        Err(SenderError::Unreachable(retries))
    }

    /// Ping mode: run only the hello probe `maxtry` times, with a fixed
    /// sleep between attempts, reporting per-attempt round-trip time.
    pub async fn ping(&mut self, maxtry: u32) -> Vec<Result<Duration, SenderError>> {
        let mut results = Vec::with_capacity(maxtry as usize);
        for _ in 0..maxtry {
            results.push(self.hello_probe(1).await);
            tokio::time::sleep(PING_INTERVAL).await;
        }
        results
    }

    /// Handshake then chunk loop for one file. Does not retransmit; any
    /// protocol violation or REJECT/DROP is fatal for this file.
    pub async fn send_file(&mut self, path: &Path) -> Result<(), SenderError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SenderError::ProtocolViolation("path has no filename".into()))?
            .to_string();

        let mut file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let file_size_u32 = u32::try_from(file_size)
            .map_err(|_| SenderError::ProtocolViolation("file too large for u32 file_size".into()))?;

        self.transport
            .send_frame(&parcel_protocol::encode_hs(file_size_u32, &filename))
            .await?;
        let buf = self.transport.recv_frame(self.chunk_size as usize).await?;
        let session_id = match parcel_protocol::decode(&buf) {
            Ok(Frame::Ok { session_id }) => session_id.to_string(),
            Ok(Frame::Reject) => return Err(SenderError::Rejected),
            Ok(Frame::Drop) => return Err(SenderError::Dropped),
            Ok(_) => return Err(SenderError::ProtocolViolation("expected OK".into())),
            Err(err) => return Err(SenderError::ProtocolViolation(err.to_string())),
        };

        let data_capacity = (self.chunk_size as usize).saturating_sub(parcel_protocol::TRANSFER_OVERHEAD);
        if data_capacity == 0 {
            return Err(SenderError::ProtocolViolation(
                "chunk size too small to carry any data".into(),
            ));
        }

        let mut chunk_no: u32 = 0;
        let mut sent: u64 = 0;
        let mut read_buf = vec![0u8; data_capacity];
        loop {
            chunk_no += 1;
            let n = read_exact_up_to(&mut file, &mut read_buf).await?;
            self.transport
                .send_frame(&parcel_protocol::encode_transfer(
                    &session_id,
                    chunk_no,
                    &read_buf[..n],
                ))
                .await?;

            let buf = self.transport.recv_frame(self.chunk_size as usize).await?;
            match parcel_protocol::decode(&buf) {
                Ok(Frame::Received { session_id: sid, next_expected_chunk })
                    if sid == session_id && next_expected_chunk == chunk_no + 1 =>
                {
                    sent += n as u64;
                    println!("{filename}: sent {sent}/{file_size} bytes");
                    continue;
                }
                Ok(Frame::Done { session_id: sid, next_expected_chunk })
                    if sid == session_id && next_expected_chunk == chunk_no + 1 =>
                {
                    sent += n as u64;
                    println!("{filename}: sent {sent}/{file_size} bytes, done");
                    self.logger.log(TransferLog {
                        component: "sender",
                        session_id: Some(session_id.clone()),
                        event: TransferEvent::SessionCompleted { filesize: file_size },
                    });
                    break;
                }
                Ok(Frame::Reject) => return Err(SenderError::Rejected),
                Ok(Frame::Drop) => return Err(SenderError::Dropped),
                Ok(_) => {
                    return Err(SenderError::ProtocolViolation(
                        "unexpected opcode or session/chunk mismatch".into(),
                    ))
                }
                Err(err) => return Err(SenderError::ProtocolViolation(err.to_string())),
            }
        }

        Ok(())
    }

    /// Close and reopen the connection, as the sender does before each file
    /// or hello retry.
    pub async fn reconnect(&mut self) -> Result<(), SenderError> {
        self.transport.reconnect().await.map_err(Into::into)
    }
}

async fn read_exact_up_to(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_logging::NullLogger;
    use tokio::net::UdpSocket;

    async fn bound_loopback() -> UdpSocket {
        UdpSocket::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await.unwrap()
    }

    #[tokio::test]
    async fn hello_probe_succeeds_against_a_responder() {
        let server = bound_loopback().await;
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(parcel_protocol::decode(&buf[..n]).unwrap(), Frame::Hello);
            server
                .send_to(&parcel_protocol::encode_hello(), from)
                .await
                .unwrap();
        });

        let mut sender = Sender::connect(
            Protocol::Udp,
            server_addr,
            parcel_protocol::DEFAULT_CHUNK_SIZE,
            Duration::from_millis(500),
            Arc::new(NullLogger),
        )
        .await
        .unwrap();

        assert!(sender.hello_probe(3).await.is_ok());
    }

    #[tokio::test]
    async fn hello_probe_gives_up_after_retries_against_silence() {
        // Bind a socket nobody answers on.
        let silent = bound_loopback().await;
        let silent_addr = silent.local_addr().unwrap();

        let mut sender = Sender::connect(
            Protocol::Udp,
            silent_addr,
            parcel_protocol::DEFAULT_CHUNK_SIZE,
            Duration::from_millis(50),
            Arc::new(NullLogger),
        )
        .await
        .unwrap();

        let result = sender.hello_probe(2).await;
        assert!(matches!(result, Err(SenderError::Unreachable(2))));
    }

    #[tokio::test]
    async fn send_file_completes_a_single_chunk_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let server = bound_loopback().await;
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            match parcel_protocol::decode(&buf[..n]).unwrap() {
                Frame::Hs { file_size, filename } => {
                    assert_eq!(file_size, 5);
                    assert_eq!(filename, "a.bin");
                }
                other => panic!("unexpected frame: {other:?}"),
            }
            let session_id = "00000000-0000-7000-8000-000000000000";
            server
                .send_to(&parcel_protocol::encode_ok(session_id), from)
                .await
                .unwrap();

            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            match parcel_protocol::decode(&buf[..n]).unwrap() {
                Frame::Transfer { session_id: sid, chunk_no, data } => {
                    assert_eq!(sid, session_id);
                    assert_eq!(chunk_no, 1);
                    assert_eq!(data, b"hello");
                }
                other => panic!("unexpected frame: {other:?}"),
            }
            server
                .send_to(&parcel_protocol::encode_done(session_id, 2), from)
                .await
                .unwrap();
        });

        let mut sender = Sender::connect(
            Protocol::Udp,
            server_addr,
            parcel_protocol::DEFAULT_CHUNK_SIZE,
            Duration::from_millis(500),
            Arc::new(NullLogger),
        )
        .await
        .unwrap();

        sender.send_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn send_file_treats_reject_as_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        tokio::fs::write(&path, b"x").await.unwrap();

        let server = bound_loopback().await;
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            let _ = parcel_protocol::decode(&buf[..n]).unwrap();
            server.send_to(&parcel_protocol::encode_reject(), from).await.unwrap();
        });

        let mut sender = Sender::connect(
            Protocol::Udp,
            server_addr,
            parcel_protocol::DEFAULT_CHUNK_SIZE,
            Duration::from_millis(500),
            Arc::new(NullLogger),
        )
        .await
        .unwrap();

        assert!(matches!(sender.send_file(&path).await, Err(SenderError::Rejected)));
    }
}
