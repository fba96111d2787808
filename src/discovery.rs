//! Host address discovery.
//!
//! Resolves the address peers should connect to, for out-of-band sharing
//! (rendered as a scannable code by the app layer). A pure lookup with no
//! protocol role.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Routing probe targets, tried in order.
///
/// The first is a public address and resolves the interface with a
/// default route. Tabletop sessions often run on LAN-only Wi-Fi with no
/// route to the internet, so the rest probe the common private ranges to
/// still pick the right interface there.
const PROBE_TARGETS: [Ipv4Addr; 4] = [
    Ipv4Addr::new(8, 8, 8, 8),
    Ipv4Addr::new(192, 168, 255, 255),
    Ipv4Addr::new(10, 255, 255, 255),
    Ipv4Addr::new(172, 31, 255, 255),
];

/// The host's first non-loopback IPv4 address.
///
/// Found by "connecting" a UDP socket to each probe target in turn and
/// reading which local address the OS routed it through; UDP connect is
/// a local operation, no datagram leaves the machine. Errors only when
/// no probe yields a usable non-loopback address.
pub fn local_ipv4() -> io::Result<IpAddr> {
    let mut last_err = io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        "no non-loopback IPv4 address",
    );
    for target in PROBE_TARGETS {
        match probe(target) {
            Ok(ip) => return Ok(ip),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

fn probe(target: Ipv4Addr) -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((target, 80))?;
    let addr = socket.local_addr()?;

    match addr.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(IpAddr::V4(ip)),
        ip => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no non-loopback IPv4 address (got {ip})"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ipv4_is_never_loopback() {
        // On hosts without a usable interface this returns Err, which is
        // also a valid outcome; what it must never do is hand out a
        // loopback or unspecified address.
        if let Ok(IpAddr::V4(ip)) = local_ipv4() {
            assert!(!ip.is_loopback());
            assert!(!ip.is_unspecified());
        }
    }

    #[test]
    fn test_probe_targets_cover_private_ranges() {
        // LAN-only hosts with no default route must still resolve, so
        // the probe list has to reach past the public target into each
        // RFC 1918 range.
        assert!(PROBE_TARGETS.iter().any(|t| t.is_private() && t.octets()[0] == 192));
        assert!(PROBE_TARGETS.iter().any(|t| t.is_private() && t.octets()[0] == 10));
        assert!(PROBE_TARGETS.iter().any(|t| t.is_private() && t.octets()[0] == 172));
    }
}
