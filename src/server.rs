use std::{net::SocketAddr, time::Duration};

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    config::GatewayConfig,
    dialer::{Dialer, Socks5Dialer},
    error::GatewayError,
    http::{hijack::Rewind, virtual_host, Route, Router},
    socks5::SocksConfig,
    tunnel,
};

const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(50);

pub struct Gateway<D> {
    listener: TcpListener,
    router: Router<D>,
}

impl Gateway<Socks5Dialer> {
    pub async fn bind(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let dialer = Socks5Dialer::new(
            config.socks_addr.clone(),
            SocksConfig::default(),
            config.dial_timeout,
        );
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Ok(Gateway::new(listener, Router::new(config, dialer)))
    }
}

impl<D: Dialer> Gateway<D> {
    pub fn new(listener: TcpListener, router: Router<D>) -> Self {
        Gateway { listener, router }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(self) -> Result<(), GatewayError> {
        info!("listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                    continue;
                }
            };
            debug!("connection from {}", peer);
            let router = self.router.clone();
            tokio::spawn(async move {
                serve_connection(router, stream, peer).await;
            });
        }
    }
}

/// Looks at the first request head. A tunnel request takes the raw socket
/// here; anything else goes to hyper with the head replayed.
pub async fn serve_connection<D: Dialer>(router: Router<D>, stream: TcpStream, peer: SocketAddr) {
    let _ = stream.set_nodelay(true);
    let mut stream = Rewind::new(stream);
    let head = match stream.peek_head().await {
        Ok(head) => head,
        Err(e) => {
            debug!("{}: closed before a request: {}", peer, e);
            return;
        }
    };

    if let Some(head) = head {
        let host = virtual_host(&head.uri, &head.headers);
        if router.route(&head.method, host) == Route::Tunnel {
            let target = host.unwrap_or_default().to_string();
            stream.consume(head.len);
            tunnel::serve(stream, router.dialer(), &target).await;
            return;
        }
    }

    // A CONNECT answered through hyper must carry no headers at all.
    let mut builder = http1::Builder::new();
    builder.auto_date_header(false);
    if let Err(e) = builder
        .serve_connection(TokioIo::new(stream), router)
        .with_upgrades()
        .await
    {
        debug!("{}: {:?}", peer, e);
    }
}
