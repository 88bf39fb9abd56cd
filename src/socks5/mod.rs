mod config;

use std::{fmt::Display, net::SocketAddr};

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

pub use config::SocksConfig;

use crate::{
    address::{DestinationAddress, ToSocketDestination},
    error::{address::AddrError, socks::SocksError, GatewayError},
    AsyncSocket,
};

const VERSION: u8 = 5;
const RESERVED: u8 = 0;
const CMD_CONNECT: u8 = 1;

const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

pub struct Socks5;

impl Socks5 {
    pub fn new_client<T: AsyncSocket>(config: SocksConfig, stream: T) -> Socks5Client<T> {
        Socks5Client {
            config,
            stream: Some(stream),
        }
    }
}

pub struct Socks5Client<T> {
    config: SocksConfig,
    stream: Option<T>,
}

impl<T: AsyncSocket> Socks5Client<T> {
    /// Negotiates a method, asks for a CONNECT to `addr` and hands the stream
    /// back once the proxy reports success. Domain names go out unresolved.
    pub async fn connect(&mut self, addr: impl ToSocketDestination) -> Result<T, GatewayError> {
        let addr = addr.to_destination_address()?;
        let mut stream = self.stream.take().ok_or(GatewayError::Closed)?;

        stream.write_all(&self.config.greeting()?).await?;
        match AuthMethod::from(read_versioned(&mut stream).await?) {
            AuthMethod::NoAcceptableMethod => return Err(SocksError::NoAcceptableMethod.into()),
            method if !self.config.offers(method) => {
                return Err(SocksError::UnexpectedMethod(method.into()).into())
            }
            _ => {}
        }

        stream.write_all(&connect_request(&addr)?).await?;
        let reply = Reply::from(read_versioned(&mut stream).await?);
        if reply != Reply::Succeeded {
            return Err(SocksError::Rejected(reply).into());
        }
        stream.read_u8().await?;
        let bound = read_address(&mut stream).await?;
        debug!("socks5 connect to {} bound at {}", addr, bound);
        Ok(stream)
    }
}

async fn read_versioned(mut reader: impl AsyncRead + Unpin) -> Result<u8, SocksError> {
    let mut head = [0u8; 2];
    reader.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(SocksError::InvalidVersion(head[0]));
    }
    Ok(head[1])
}

fn connect_request(addr: &DestinationAddress) -> Result<Vec<u8>, SocksError> {
    let mut request = vec![VERSION, CMD_CONNECT, RESERVED];
    write_address(&mut request, addr)?;
    Ok(request)
}

fn write_address(buf: &mut Vec<u8>, addr: &DestinationAddress) -> Result<(), AddrError> {
    match addr {
        DestinationAddress::Domain(name, _) => {
            let len = u8::try_from(name.len()).map_err(|_| AddrError::DomainTooLong(name.len()))?;
            buf.extend([ATYP_DOMAIN, len]);
        }
        DestinationAddress::Ip(SocketAddr::V4(_)) => buf.push(ATYP_IPV4),
        DestinationAddress::Ip(SocketAddr::V6(_)) => buf.push(ATYP_IPV6),
    }
    buf.extend(addr.to_bytes());
    Ok(())
}

async fn read_address(mut reader: impl AsyncRead + Unpin) -> Result<DestinationAddress, SocksError> {
    let (len, ip) = match reader.read_u8().await? {
        ATYP_IPV4 => (6, true),
        ATYP_DOMAIN => (reader.read_u8().await? as usize + 2, false),
        ATYP_IPV6 => (18, true),
        other => return Err(SocksError::InvalidAddressType(other)),
    };
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(DestinationAddress::from_bytes(&buf, ip)?)
}

#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub enum AuthMethod {
    #[default]
    NoAuth,
    GssApi,
    UsernamePassword,
    NoAcceptableMethod,
    Other(u8),
}

impl From<AuthMethod> for u8 {
    fn from(v: AuthMethod) -> Self {
        match v {
            AuthMethod::NoAuth => 0,
            AuthMethod::GssApi => 1,
            AuthMethod::UsernamePassword => 2,
            AuthMethod::NoAcceptableMethod => 0xff,
            AuthMethod::Other(v) => v,
        }
    }
}

impl From<u8> for AuthMethod {
    fn from(v: u8) -> Self {
        match v {
            0 => AuthMethod::NoAuth,
            1 => AuthMethod::GssApi,
            2 => AuthMethod::UsernamePassword,
            0xff => AuthMethod::NoAcceptableMethod,
            v => AuthMethod::Other(v),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Reply {
    Succeeded,
    GeneralFailure,
    NotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
    Other(u8),
}

impl From<u8> for Reply {
    fn from(v: u8) -> Self {
        match v {
            0 => Reply::Succeeded,
            1 => Reply::GeneralFailure,
            2 => Reply::NotAllowed,
            3 => Reply::NetworkUnreachable,
            4 => Reply::HostUnreachable,
            5 => Reply::ConnectionRefused,
            6 => Reply::TtlExpired,
            7 => Reply::CommandNotSupported,
            8 => Reply::AddressTypeNotSupported,
            _ => Reply::Other(v),
        }
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Reply::Succeeded => "succeeded",
            Reply::GeneralFailure => "general SOCKS server failure",
            Reply::NotAllowed => "connection not allowed by ruleset",
            Reply::NetworkUnreachable => "network unreachable",
            Reply::HostUnreachable => "host unreachable",
            Reply::ConnectionRefused => "connection refused",
            Reply::TtlExpired => "TTL expired",
            Reply::CommandNotSupported => "command not supported",
            Reply::AddressTypeNotSupported => "address type not supported",
            Reply::Other(v) => return write!(f, "unknown reply code {}", v),
        };
        f.write_str(text)
    }
}
