//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`JsonBody`], [`QueryParams`], [`PathParam`]: the stock extractors with
//!   their rejections mapped onto [`AppError`] validation failures

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{connect_info::ConnectInfo, FromRequest, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Reuses the id stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and generates one otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<Self>()
            .copied()
            .or_else(|| {
                parts
                    .headers
                    .get(CORRELATION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .map(Self)
            })
            .unwrap_or_else(|| Self(Uuid::new_v4()));

        Ok(correlation_id)
    }
}

/// Resolves the client address used for rate limiting.
///
/// `X-Forwarded-For` (first entry) and `X-Real-IP` are client-controlled, so
/// they are read only when `trust_forwarded` is set, i.e. when the server sits
/// behind a proxy that overwrites them. Otherwise the connection address is
/// used, falling back to `127.0.0.1` when the server runs without connect info.
pub(crate) fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded: bool,
) -> IpAddr {
    let forwarded = || -> Option<IpAddr> {
        headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|first| first.trim().parse().ok())
            .or_else(|| {
                headers
                    .get("X-Real-IP")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse().ok())
            })
    };

    trust_forwarded
        .then(forwarded)
        .flatten()
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// JSON request body; malformed input is a 400 validation error.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Query string; malformed input is a 400 validation error.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

/// Path parameters; malformed input is a 400 validation error.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathParam<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn proxied() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        headers
    }

    #[test]
    fn test_extract_client_ip_from_x_forwarded_for() {
        let ip = client_ip(&proxied(), None, true);
        assert_eq!(ip.to_string(), "203.0.113.1");
    }

    #[test]
    fn test_extract_client_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Real-IP", HeaderValue::from_static("203.0.113.5"));

        let ip = client_ip(&headers, None, true);
        assert_eq!(ip.to_string(), "203.0.113.5");
    }

    #[test]
    fn forwarding_headers_are_ignored_unless_trusted() {
        let info = ConnectInfo(SocketAddr::from(([198, 51, 100, 7], 5555)));

        assert_eq!(client_ip(&proxied(), Some(&info), false).to_string(), "198.51.100.7");
        assert_eq!(client_ip(&proxied(), None, false), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn connection_address_comes_before_localhost() {
        let headers = HeaderMap::new();
        let info = ConnectInfo(SocketAddr::from(([198, 51, 100, 7], 5555)));

        assert_eq!(client_ip(&headers, Some(&info), true).to_string(), "198.51.100.7");
        assert_eq!(client_ip(&headers, None, true), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
