//! Transport abstraction unifying UDP and TCP behind `send_frame`/`recv_frame`,
//! plus the address-resolution helpers the supervisor and sender use to pick
//! bind and target addresses.

mod resolve;
mod socket;
mod transport;

pub use resolve::{resolve_bind_addrs, resolve_target};
pub use socket::{bind_tcp_listener, bind_udp_socket};
pub use transport::{recv_frame_tcp, ClientTransport, Peer, TransportError};

/// Which substrate a run of the protocol is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}
