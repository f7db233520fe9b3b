use std::net::SocketAddr;

use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::net::{TcpListener, UdpSocket};

/// Socket receive buffer size for the datagram listener. Sized generously
/// relative to `chunk_size` since a busy server may have many sessions'
/// worth of frames queued between receive-loop iterations.
const UDP_RECV_BUFFER_BYTES: usize = 1 << 20;

/// Bind a UDP socket at `addr` with a receive buffer sized for a
/// multi-session server, handed off to the async runtime.
pub fn bind_udp_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let domain = Domain::for_address(addr);
    let sock = Socket::new(domain, Type::DGRAM, Some(SockProtocol::UDP))?;
    sock.set_recv_buffer_size(UDP_RECV_BUFFER_BYTES)?;
    sock.set_nonblocking(true)?;
    sock.bind(&addr.into())?;
    let std_sock: std::net::UdpSocket = sock.into();
    UdpSocket::from_std(std_sock)
}

/// Bind and listen on a TCP socket at `addr`.
pub fn bind_tcp_listener_std(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let domain = Domain::for_address(addr);
    let sock = Socket::new(domain, Type::STREAM, Some(SockProtocol::TCP))?;
    sock.set_reuse_address(true)?;
    sock.set_nonblocking(true)?;
    sock.bind(&addr.into())?;
    sock.listen(1024)?;
    Ok(sock.into())
}

/// Bind and listen on a TCP socket, handed off to the async runtime.
pub fn bind_tcp_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    TcpListener::from_std(bind_tcp_listener_std(addr)?)
}
