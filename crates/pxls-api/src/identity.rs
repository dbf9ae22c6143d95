//! Client identity extraction.
//!
//! A client is identified by the `X-Forwarded-For` header when present,
//! otherwise by the peer address of the connection. The header is trusted
//! as-is: identity is a rate-limiting key, not an authenticated user.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use pxls_core::ClientIdentity;

/// Header consulted before the socket address.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used when neither a header nor a peer address is available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extractor yielding the requesting client's [`ClientIdentity`].
#[derive(Debug, Clone)]
pub struct ClientIp(pub ClientIdentity);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(identify(parts)))
    }
}

/// Derive the identity for a request.
pub fn identify(parts: &Parts) -> ClientIdentity {
    let forwarded = parts
        .headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(value) = forwarded {
        return ClientIdentity::new(value);
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(
            || ClientIdentity::new(UNKNOWN_CLIENT),
            |ConnectInfo(addr)| ClientIdentity::new(addr.ip().to_string()),
        )
}
