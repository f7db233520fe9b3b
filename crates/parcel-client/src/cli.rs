use clap::Parser;
use parcel_net::Protocol;

/// Sends files to `parcel-server` over UDP or TCP.
#[derive(Parser, Debug)]
#[command(name = "client", about = "Send files over the chunked transfer protocol")]
pub struct Cli {
    /// Receiver address.
    pub ip: String,

    /// Receiver port.
    pub port: u16,

    /// Run only the hello probe in a loop, reporting round-trip time.
    #[arg(long)]
    pub ping: bool,

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

    /// Raise this workspace's log filter to debug.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
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
