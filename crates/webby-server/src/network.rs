//! LAN address lookup for the status page.

use std::net::Ipv4Addr;

/// First non-loopback IPv4 address in a private LAN range.
pub(crate) fn lan_ip() -> Option<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::debug!(error = %e, "Could not list network interfaces");
            return None;
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(addr) if is_lan(addr.ip) => Some(addr.ip),
            _ => None,
        })
}

/// Check whether `ip` is in `10.0.0.0/8` or `192.168.0.0/16`.
pub(crate) fn is_lan(ip: Ipv4Addr) -> bool {
    matches!(ip.octets(), [10, ..] | [192, 168, ..])
}

/// Check whether `host` binds every interface.
pub(crate) fn is_wildcard(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}
