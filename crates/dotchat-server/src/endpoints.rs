use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::process::Command;

use dotchat_types::Endpoints;

/// Connection URI served at `host:port`.
pub fn ws_uri(host: &str, port: u16) -> String {
    format!("ws://{}:{}/ws", host, port)
}

/// Endpoints with only the loopback entry.
pub fn loopback(port: u16) -> Endpoints {
    Endpoints {
        localhost: vec![ws_uri("localhost", port)],
        ..Endpoints::default()
    }
}

/// Enumerate loopback, hostname and LAN endpoints for `port`.
///
/// Discovery is best-effort: anything that cannot be found is left out.
/// Blocking; run it off the async runtime.
pub fn discover(port: u16) -> Endpoints {
    Endpoints {
        hostname: hostname().iter().map(|h| ws_uri(h, port)).collect(),
        lan: lan_ipv4().iter().map(|ip| ws_uri(&ip.to_string(), port)).collect(),
        ..loopback(port)
    }
}

fn hostname() -> Option<String> {
    let from_env = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok();
    let name = match from_env {
        Some(name) => name,
        None => {
            let output = Command::new("hostname").output().ok()?;
            if !output.status.success() {
                return None;
            }
            String::from_utf8(output.stdout).ok()?
        }
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Every non-loopback IPv4 address on an interface that is up, sorted and
/// deduplicated. Falls back to the default-route address when interfaces
/// cannot be listed.
fn lan_ipv4() -> Vec<Ipv4Addr> {
    let mut addrs = interface_ipv4().unwrap_or_else(|| default_route_ipv4().into_iter().collect());
    addrs.retain(|ip| is_lan(*ip));
    addrs.sort();
    addrs.dedup();
    addrs
}

fn is_lan(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified()
}

#[cfg(unix)]
fn interface_ipv4() -> Option<Vec<Ipv4Addr>> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags;

    let addrs = getifaddrs().ok()?;
    Some(
        addrs
            .filter(|ifa| {
                ifa.flags.contains(InterfaceFlags::IFF_UP)
                    && !ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK)
            })
            .filter_map(|ifa| {
                let address = ifa.address?;
                address.as_sockaddr_in().map(|sin| Ipv4Addr::from(sin.ip()))
            })
            .collect(),
    )
}

#[cfg(not(unix))]
fn interface_ipv4() -> Option<Vec<Ipv4Addr>> {
    None
}

/// The IPv4 address of the interface that carries the default route.
/// Connecting a UDP socket only consults the routing table; nothing is sent.
fn default_route_ipv4() -> Option<Ipv4Addr> {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(IpAddr::V4(ip)) => Some(ip),
        _ => None,
    }
}
