use hyper::{
    body::Incoming,
    header::{HeaderValue, HOST},
    http::uri::{PathAndQuery, Scheme},
    HeaderMap, Request, Response, StatusCode, Uri,
};
use hyper_util::rt::TokioIo;
use log::debug;

use super::{error_response, GatewayBody};
use crate::{
    address::DestinationAddress,
    dialer::Dialer,
    error::{http::HttpError, GatewayError},
};

const DEFAULT_HTTP_PORT: u16 = 80;

/// Replays `req` upstream and hands back the upstream response. Any failure
/// becomes a 503 carrying the error text. There is no deadline on the round
/// trip itself; an upstream that never answers keeps the request waiting.
pub async fn relay<D: Dialer>(req: Request<Incoming>, dialer: &D) -> Response<GatewayBody> {
    match round_trip(req, dialer).await {
        Ok(upstream) => copy_response(upstream),
        Err(e) => {
            debug!("relay failed: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn round_trip<D: Dialer>(
    req: Request<Incoming>,
    dialer: &D,
) -> Result<Response<Incoming>, GatewayError> {
    let target = relay_target(req.uri(), req.headers())?;
    let req = into_origin_form(req, &target)?;

    let stream = dialer.dial(&target).await?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(HttpError::Handshake)?;
    // Ends, and drops the upstream socket, once the response body is drained
    // and `sender` is gone.
    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            debug!("{:?}", err);
        }
    });
    sender
        .send_request(req)
        .await
        .map_err(|e| HttpError::SendHttpReq(e).into())
}

pub fn relay_target(uri: &Uri, headers: &HeaderMap) -> Result<DestinationAddress, GatewayError> {
    if let Some(scheme) = uri.scheme() {
        if *scheme != Scheme::HTTP {
            return Err(HttpError::UnsupportedScheme(scheme.to_string()).into());
        }
    }
    let authority = super::virtual_host(uri, headers).ok_or(HttpError::MissingHost)?;
    Ok(DestinationAddress::from_authority(
        authority,
        Some(DEFAULT_HTTP_PORT),
    )?)
}

fn into_origin_form(
    req: Request<Incoming>,
    target: &DestinationAddress,
) -> Result<Request<Incoming>, GatewayError> {
    let (mut parts, body) = req.into_parts();
    if !parts.headers.contains_key(HOST) {
        let host = match parts.uri.authority() {
            Some(authority) => HeaderValue::from_str(authority.as_str()),
            None => HeaderValue::from_str(&target.to_string()),
        }
        .map_err(|_| HttpError::BuildHttpReq)?;
        parts.headers.insert(HOST, host);
    }
    parts.headers.remove("proxy-connection");
    let path = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    parts.uri = Uri::from(path);
    Ok(Request::from_parts(parts, body))
}

fn copy_response(upstream: Response<Incoming>) -> Response<GatewayBody> {
    let (parts, body) = upstream.into_parts();
    let mut response = Response::new(GatewayBody::incoming(body));
    copy_headers(response.headers_mut(), &parts.headers);
    *response.status_mut() = parts.status;
    response
}

pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    for (name, value) in src {
        dst.append(name, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_headers_are_all_kept() {
        let mut src = HeaderMap::new();
        src.append("x-a", HeaderValue::from_static("1"));
        src.append("x-a", HeaderValue::from_static("2"));
        src.append("set-cookie", HeaderValue::from_static("a=b"));
        let mut dst = HeaderMap::new();
        dst.append("x-a", HeaderValue::from_static("0"));

        copy_headers(&mut dst, &src);
        let values: Vec<_> = dst.get_all("x-a").iter().collect();
        assert_eq!(values, ["0", "1", "2"]);
        assert_eq!(dst["set-cookie"], "a=b");
    }

    #[test]
    fn target_from_absolute_uri_or_host() {
        let headers = HeaderMap::new();
        let uri: Uri = "http://example.com/a?b=c".parse().unwrap();
        assert_eq!(
            relay_target(&uri, &headers).unwrap(),
            DestinationAddress::Domain("example.com".into(), 80)
        );

        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("10.0.0.1:8080"));
        let uri: Uri = "/a".parse().unwrap();
        assert_eq!(relay_target(&uri, &headers).unwrap().to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn non_http_schemes_and_missing_hosts_fail() {
        let uri: Uri = "https://example.com/".parse().unwrap();
        assert!(matches!(
            relay_target(&uri, &HeaderMap::new()),
            Err(GatewayError::Http(HttpError::UnsupportedScheme(_)))
        ));
        let uri: Uri = "/".parse().unwrap();
        assert!(matches!(
            relay_target(&uri, &HeaderMap::new()),
            Err(GatewayError::Http(HttpError::MissingHost))
        ));
    }
}
