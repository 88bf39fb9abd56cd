use thiserror::Error;
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Unable to build upstream HTTP request")]
    BuildHttpReq,
    #[error("Unable to handshake with upstream: {0}")]
    Handshake(#[source] hyper::Error),
    #[error("Unable to send HTTP request: {0}")]
    SendHttpReq(#[source] hyper::Error),
    #[error("Body stream failed: {0}")]
    Body(#[source] hyper::Error),
    #[error("Request has no target host")]
    MissingHost,
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Unable to upgrade HTTP request: {0}")]
    UpgradeHttpReq(#[from] hyper::Error),
}
