use thiserror::Error;
#[derive(Error, Debug)]
pub enum AddrError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Missing port in address: {0}")]
    MissingPort(String),
    #[error("Domain name too long for SOCKS5: {0} bytes")]
    DomainTooLong(usize),
}
