use std::net::{IpAddr, SocketAddr};

pub(crate) mod codec;

pub use codec::TcpProtocol;

#[derive(Clone, Debug, PartialEq, Eq)]
enum HostType {
    Dns(String),
    IpAddr(IpAddr),
}

/// Address of a device: an IP address or a host name, and a port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostAddr {
    addr: HostType,
    port: u16,
}

impl HostAddr {
    /// Construct a `HostAddr` from an IP address and port
    pub fn ip(ip: IpAddr, port: u16) -> Self {
        Self {
            addr: HostType::IpAddr(ip),
            port,
        }
    }

    /// Construct a `HostAddr` from a DNS name and port
    pub fn dns(name: String, port: u16) -> Self {
        Self {
            addr: HostType::Dns(name),
            port,
        }
    }

    /// Resolve to the candidate socket addresses, IPv4 addresses first
    pub(crate) async fn resolve(&self) -> std::io::Result<Vec<SocketAddr>> {
        match &self.addr {
            HostType::IpAddr(ip) => Ok(vec![SocketAddr::new(*ip, self.port)]),
            HostType::Dns(name) => {
                let mut addrs: Vec<SocketAddr> =
                    tokio::net::lookup_host((name.as_str(), self.port))
                        .await?
                        .collect();
                // stable sort keeps the resolver's order within each family
                addrs.sort_by_key(|addr| addr.is_ipv6());
                Ok(addrs)
            }
        }
    }
}

impl std::fmt::Display for HostAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.addr {
            HostType::Dns(name) => write!(f, "{}:{}", name, self.port),
            HostType::IpAddr(IpAddr::V4(ip)) => write!(f, "{}:{}", ip, self.port),
            HostType::IpAddr(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}
