use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::lookup_host;

use crate::transport::TransportError;

/// Bind-address candidates for the supervisor.
///
/// When a specific address was requested, that address alone is returned.
/// When none was given (`--listen-all` or an omitted positional `ip`), the
/// candidates are the Cartesian product of the unspecified address and the
/// loopback supplement, across both IPv4 and IPv6 — loopback is included
/// explicitly because binding only the unspecified address does not
/// reliably reach loopback-only clients on every platform.
pub fn resolve_bind_addrs(host: Option<&str>, port: u16) -> Vec<SocketAddr> {
    match host {
        Some(h) => match h.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, port)],
            Err(_) => vec![
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
            ],
        },
        None => vec![
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port),
        ],
    }
}

/// Resolve a sender's target host into one or more candidate addresses,
/// trying both address families when the host is a name rather than a
/// literal IP.
pub async fn resolve_target(host: &str, port: u16) -> Result<Vec<SocketAddr>, TransportError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(TransportError::Io)?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no addresses found for {host}"),
        )));
    }
    Ok(addrs)
}
