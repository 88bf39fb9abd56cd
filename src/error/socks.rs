use thiserror::Error;

use super::address;
use crate::socks5::Reply;

#[derive(Error, Debug)]
pub enum SocksError {
    #[error("Proxy answered with SOCKS version {0}")]
    InvalidVersion(u8),
    #[error("Proxy accepted none of the offered methods")]
    NoAcceptableMethod,
    #[error("Proxy selected method {0:#04x}, which was not offered")]
    UnexpectedMethod(u8),
    #[error("Method not provided")]
    MethodNotProvided,
    #[error("Too many methods provided")]
    TooManyMethods,
    #[error("Invalid address type {0}")]
    InvalidAddressType(u8),
    #[error("Request rejected by proxy: {0}")]
    Rejected(Reply),
    #[error("IOError: {0}")]
    IOError(#[from] std::io::Error),
    #[error("AddressError: {0}")]
    AddressError(#[from] address::AddrError),
}
