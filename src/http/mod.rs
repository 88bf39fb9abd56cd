mod body;
pub mod hijack;
pub mod relay;
mod static_files;

use std::sync::Arc;

pub use body::GatewayBody;
pub use static_files::StaticFiles;

use futures::future::BoxFuture;
use hyper::{
    body::Incoming,
    ext::ReasonPhrase,
    header::HOST,
    service::Service,
    upgrade::OnUpgrade,
    HeaderMap, Method, Request, Response, StatusCode, Uri,
};
use hyper_util::rt::TokioIo;
use log::debug;

use crate::{
    address::DestinationAddress,
    config::GatewayConfig,
    dialer::Dialer,
    error::{http::HttpError, GatewayError},
    tunnel::Tunnel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Static,
    Tunnel,
    Relay,
}

pub fn virtual_host<'a>(uri: &'a Uri, headers: &'a HeaderMap) -> Option<&'a str> {
    uri.authority()
        .map(|a| a.as_str())
        .or_else(|| headers.get(HOST).and_then(|h| h.to_str().ok()))
}

pub(crate) fn status_response(status: StatusCode, body: GatewayBody) -> Response<GatewayBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response<GatewayBody> {
    let mut message = message.into();
    message.push('\n');
    let mut response = status_response(status, GatewayBody::full(message));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().insert(
        hyper::header::X_CONTENT_TYPE_OPTIONS,
        hyper::header::HeaderValue::from_static("nosniff"),
    );
    response
}

pub struct Router<D> {
    hostname: Arc<str>,
    static_files: Option<Arc<StaticFiles>>,
    dialer: Arc<D>,
}

impl<D> Clone for Router<D> {
    fn clone(&self) -> Self {
        Router {
            hostname: self.hostname.clone(),
            static_files: self.static_files.clone(),
            dialer: self.dialer.clone(),
        }
    }
}

impl<D: Dialer> Router<D> {
    pub fn new(config: &GatewayConfig, dialer: D) -> Self {
        Router {
            hostname: Arc::from(config.hostname.as_str()),
            static_files: config
                .static_dir
                .as_ref()
                .map(|dir| Arc::new(StaticFiles::new(dir))),
            dialer: Arc::new(dialer),
        }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn route(&self, method: &Method, virtual_host: Option<&str>) -> Route {
        if virtual_host.is_some_and(|host| host.eq_ignore_ascii_case(&self.hostname)) {
            Route::Static
        } else if *method == Method::CONNECT {
            Route::Tunnel
        } else {
            Route::Relay
        }
    }

    pub async fn handle(self, req: Request<Incoming>) -> Result<Response<GatewayBody>, GatewayError> {
        match self.route(req.method(), virtual_host(req.uri(), req.headers())) {
            Route::Static => Ok(match self.static_files {
                Some(ref files) => files.serve(req.method(), req.uri()).await,
                None => status_response(StatusCode::SERVICE_UNAVAILABLE, GatewayBody::empty()),
            }),
            Route::Tunnel => self.upgrade(req).await,
            Route::Relay => Ok(relay::relay(req, self.dialer.as_ref()).await),
        }
    }

    // The dial happens before any response. A failed dial surfaces as a
    // service error, so hyper drops the connection without writing anything.
    async fn upgrade<B>(self, mut req: Request<B>) -> Result<Response<GatewayBody>, GatewayError> {
        let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                GatewayError::HijackUnsupported.to_string(),
            ));
        };
        let authority = virtual_host(req.uri(), req.headers()).unwrap_or_default();
        let target = authority.parse::<DestinationAddress>()?;
        let upstream = self.dialer.dial(&target).await?;

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    debug!("tunnel to {} established", target);
                    let stats = Tunnel::new(TokioIo::new(upgraded), upstream).run().await;
                    debug!(
                        "tunnel to {} closed, {} bytes out, {} bytes in",
                        target, stats.client_to_upstream, stats.upstream_to_client
                    );
                }
                Err(e) => debug!("tunnel to {}: {}", target, HttpError::UpgradeHttpReq(e)),
            }
        });

        let mut response = status_response(StatusCode::OK, GatewayBody::empty());
        response
            .extensions_mut()
            .insert(ReasonPhrase::from_static(b"Connection Established"));
        Ok(response)
    }
}

impl<D: Dialer> Service<Request<Incoming>> for Router<D> {
    type Response = Response<GatewayBody>;

    type Error = GatewayError;

    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        Box::pin(self.clone().handle(req))
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::dialer::Socks5Dialer;
    use crate::socks5::SocksConfig;

    fn router() -> Router<Socks5Dialer> {
        let config = GatewayConfig::new("127.0.0.1:1", "127.0.0.1:0", "files.local");
        let dialer = Socks5Dialer::new("127.0.0.1:1", SocksConfig::default(), config.dial_timeout);
        Router::new(&config, dialer)
    }

    #[test]
    fn sentinel_wins_over_connect() {
        let router = router();
        assert_eq!(router.route(&Method::CONNECT, Some("files.local")), Route::Static);
        assert_eq!(router.route(&Method::GET, Some("FILES.local")), Route::Static);
        assert_eq!(router.route(&Method::CONNECT, Some("example.com:443")), Route::Tunnel);
        assert_eq!(router.route(&Method::GET, Some("example.com")), Route::Relay);
        assert_eq!(router.route(&Method::POST, None), Route::Relay);
    }

    #[test]
    fn sentinel_with_port_is_a_different_host() {
        let router = router();
        assert_eq!(router.route(&Method::GET, Some("files.local:8080")), Route::Relay);
    }

    #[test]
    fn virtual_host_prefers_target_authority() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, "files.local".parse().unwrap());
        let absolute: Uri = "http://example.com/index.html".parse().unwrap();
        assert_eq!(virtual_host(&absolute, &headers), Some("example.com"));
        let origin: Uri = "/index.html".parse().unwrap();
        assert_eq!(virtual_host(&origin, &headers), Some("files.local"));
        assert_eq!(virtual_host(&origin, &HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn connect_without_upgrade_handle_is_a_server_error() {
        let req = Request::builder()
            .method(Method::CONNECT)
            .uri("example.com:443")
            .body(())
            .unwrap();
        let response = router().upgrade(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], &b"Hijacking not supported\n"[..]);
    }
}
