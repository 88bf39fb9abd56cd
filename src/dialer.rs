use std::time::Duration;

use futures::future::BoxFuture;
use log::debug;
use tokio::net::TcpStream;

use crate::{
    address::DestinationAddress,
    error::GatewayError,
    socks5::{Socks5, SocksConfig},
    AsyncSocket,
};

/// Opens one outbound TCP stream per call. Implementations never retry.
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncSocket;

    fn dial<'a>(
        &'a self,
        addr: &'a DestinationAddress,
    ) -> BoxFuture<'a, Result<Self::Stream, GatewayError>>;
}

pub struct Socks5Dialer {
    proxy: String,
    config: SocksConfig,
    timeout: Duration,
}

impl Socks5Dialer {
    pub fn new(proxy: impl Into<String>, config: SocksConfig, timeout: Duration) -> Self {
        Socks5Dialer {
            proxy: proxy.into(),
            config,
            timeout,
        }
    }

    async fn connect(&self, addr: &DestinationAddress) -> Result<TcpStream, GatewayError> {
        let stream = TcpStream::connect(&self.proxy).await?;
        stream.set_nodelay(true)?;
        Socks5::new_client(self.config.clone(), stream)
            .connect(addr.clone())
            .await
    }
}

impl Dialer for Socks5Dialer {
    type Stream = TcpStream;

    fn dial<'a>(
        &'a self,
        addr: &'a DestinationAddress,
    ) -> BoxFuture<'a, Result<Self::Stream, GatewayError>> {
        Box::pin(async move {
            let result = match tokio::time::timeout(self.timeout, self.connect(addr)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::DialTimeout(self.timeout)),
            };
            result.map_err(|e| {
                debug!("dial {} via {} failed: {}", addr, self.proxy, e);
                GatewayError::Dial {
                    proxy: self.proxy.clone(),
                    target: addr.to_string(),
                    source: Box::new(e),
                }
            })
        })
    }
}
