use std::path::PathBuf;

use clap::Parser;
use parcel_net::Protocol;

/// Receives files sent by `parcel-client` over UDP or TCP.
#[derive(Parser, Debug)]
#[command(name = "server", about = "Receive files over the chunked transfer protocol")]
pub struct Cli {
    /// [ip] port, e.g. `9000` or `0.0.0.0 9000`. Omitting the ip binds to
    /// all local interfaces including loopback.
    #[arg(value_name = "IP_AND_PORT", num_args = 1..=2, required = true)]
    address: Vec<String>,

    /// Directory received files are written into.
    #[arg(short = 'd', long = "dir", default_value = parcel_protocol::DEFAULT_SAVE_ROOT)]
    pub dir: PathBuf,

    /// Use TCP instead of UDP.
    #[arg(long, conflicts_with_all = ["udp", "protocol"])]
    pub tcp: bool,

    /// Use UDP (the default).
    #[arg(long, conflicts_with_all = ["tcp", "protocol"])]
    pub udp: bool,

    /// Explicit protocol name, `tcp` or `udp`.
    #[arg(long)]
    pub protocol: Option<String>,

    /// Frame buffer / chunk size in bytes.
    #[arg(long, default_value_t = parcel_protocol::DEFAULT_CHUNK_SIZE)]
    pub chunk: u32,

    /// Send/receive timeout in milliseconds.
    #[arg(long, default_value_t = parcel_protocol::DEFAULT_TIMEOUT_MS)]
    pub timeout: u64,

    /// Bind all local interfaces including loopback, same as omitting the ip.
    #[arg(long = "listen-all")]
    pub listen_all: bool,

    /// Raise this workspace's log filter to debug.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn host_and_port(&self) -> anyhow::Result<(Option<String>, u16)> {
        match self.address.as_slice() {
            [port] => Ok((None, port.parse()?)),
            [ip, port] => Ok((Some(ip.clone()), port.parse()?)),
            _ => unreachable!("clap enforces 1..=2 positional values"),
        }
    }

    pub fn protocol(&self) -> Protocol {
        if self.tcp {
            return Protocol::Tcp;
        }
        if self.udp {
            return Protocol::Udp;
        }
        match self.protocol.as_deref() {
            Some("tcp") => Protocol::Tcp,
            Some("udp") => Protocol::Udp,
            _ => Protocol::Udp,
        }
    }
}
