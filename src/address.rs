use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
    str::FromStr,
};

use hyper::http::uri::Authority;

use crate::error::{address::AddrError, GatewayError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationAddress {
    Domain(String, u16),
    Ip(SocketAddr),
}

impl DestinationAddress {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            DestinationAddress::Domain(domain, port) => {
                [domain.as_bytes(), port.to_be_bytes().as_ref()].concat()
            }
            DestinationAddress::Ip(addr) => match addr {
                SocketAddr::V4(addr) => {
                    [&addr.ip().octets(), addr.port().to_be_bytes().as_ref()].concat()
                }
                SocketAddr::V6(addr) => {
                    [&addr.ip().octets(), addr.port().to_be_bytes().as_ref()].concat()
                }
            },
        }
    }
    pub fn from_bytes(buf: &[u8], ip: bool) -> Result<Self, AddrError> {
        if buf.len() < 3 {
            return Err(AddrError::InvalidAddress(format!("{} bytes", buf.len())));
        }
        let port = u16::from_be_bytes([buf[buf.len() - 2], buf[buf.len() - 1]]);
        if !ip {
            let domain = String::from_utf8_lossy(&buf[0..buf.len() - 2]).to_string();
            return Ok(DestinationAddress::Domain(domain, port));
        }
        let addr = match buf.len() {
            6 => {
                let mut octets = [0; 4];
                octets.copy_from_slice(&buf[0..4]);
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port))
            }
            18 => {
                let mut octets = [0; 16];
                octets.copy_from_slice(&buf[0..16]);
                SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0))
            }
            n => return Err(AddrError::InvalidAddress(format!("{} bytes", n))),
        };
        Ok(DestinationAddress::Ip(addr))
    }

    pub fn from_authority(authority: &str, default_port: Option<u16>) -> Result<Self, AddrError> {
        let parsed = Authority::from_str(authority)
            .map_err(|_| AddrError::InvalidAddress(authority.to_string()))?;
        let port = parsed
            .port_u16()
            .or(default_port)
            .ok_or_else(|| AddrError::MissingPort(authority.to_string()))?;
        let host = parsed.host();
        if host.is_empty() {
            return Err(AddrError::InvalidAddress(authority.to_string()));
        }
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        match bare.parse::<IpAddr>() {
            Ok(ip) => Ok(DestinationAddress::Ip(SocketAddr::new(ip, port))),
            Err(_) => Ok(DestinationAddress::Domain(host.to_string(), port)),
        }
    }
}

impl FromStr for DestinationAddress {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(DestinationAddress::Ip(addr));
        }
        DestinationAddress::from_authority(s, None)
    }
}

impl Display for DestinationAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationAddress::Domain(domain, port) => write!(f, "{}:{}", domain, port),
            DestinationAddress::Ip(addr) => write!(f, "{}", addr),
        }
    }
}

pub trait ToSocketDestination {
    fn to_destination_address(&self) -> Result<DestinationAddress, GatewayError>;
}

impl ToSocketDestination for SocketAddr {
    fn to_destination_address(&self) -> Result<DestinationAddress, GatewayError> {
        Ok(DestinationAddress::Ip(*self))
    }
}

impl ToSocketDestination for DestinationAddress {
    fn to_destination_address(&self) -> Result<DestinationAddress, GatewayError> {
        Ok(self.clone())
    }
}

impl ToSocketDestination for &str {
    fn to_destination_address(&self) -> Result<DestinationAddress, GatewayError> {
        Ok(self.parse::<DestinationAddress>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_domain_and_ip_targets() {
        assert_eq!(
            "example.com:443".parse::<DestinationAddress>().unwrap(),
            DestinationAddress::Domain("example.com".into(), 443)
        );
        assert_eq!(
            "127.0.0.1:8080".parse::<DestinationAddress>().unwrap(),
            DestinationAddress::Ip(SocketAddr::from(([127, 0, 0, 1], 8080)))
        );
        assert_eq!(
            "[::1]:443".parse::<DestinationAddress>().unwrap(),
            DestinationAddress::Ip("[::1]:443".parse().unwrap())
        );
    }

    #[test]
    fn connect_target_requires_port() {
        assert!(matches!(
            "example.com".parse::<DestinationAddress>(),
            Err(AddrError::MissingPort(_))
        ));
        assert!("".parse::<DestinationAddress>().is_err());
    }

    #[test]
    fn authority_falls_back_to_default_port() {
        let addr = DestinationAddress::from_authority("example.com", Some(80)).unwrap();
        assert_eq!(addr.to_string(), "example.com:80");
        let addr = DestinationAddress::from_authority("example.com:8080", Some(80)).unwrap();
        assert_eq!(addr, DestinationAddress::Domain("example.com".into(), 8080));
    }

    #[test]
    fn socks_bytes_decode() {
        let v4 = DestinationAddress::from_bytes(&[10, 0, 0, 1, 0x01, 0xbb], true).unwrap();
        assert_eq!(v4.to_string(), "10.0.0.1:443");
        let domain = DestinationAddress::from_bytes(b"a.io\x00\x50", false).unwrap();
        assert_eq!(domain, DestinationAddress::Domain("a.io".into(), 80));
        assert!(DestinationAddress::from_bytes(&[1, 2, 3, 4, 5], true).is_err());
    }
}
