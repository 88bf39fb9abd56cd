use std::time::Duration;

use thiserror::Error;
pub(crate) mod address;
pub(crate) mod http;
pub(crate) mod socks;

pub use address::AddrError;
pub use http::HttpError;
pub use socks::SocksError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("AddressError: {0}")]
    Address(#[from] address::AddrError),
    #[error("HttpError: {0}")]
    Http(#[from] http::HttpError),
    #[error("SocksError: {0}")]
    Socks(#[from] socks::SocksError),
    #[error("IOError: {0}")]
    IO(#[from] std::io::Error),
    #[error("socks5 {proxy} -> {target}: {source}")]
    Dial {
        proxy: String,
        target: String,
        #[source]
        source: Box<GatewayError>,
    },
    #[error("Dial timed out after {0:?}")]
    DialTimeout(Duration),
    #[error("Hijacking not supported")]
    HijackUnsupported,
    #[error("Connection closed")]
    Closed,
}
