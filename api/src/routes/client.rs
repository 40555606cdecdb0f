//! Request origin extractor (client IP and user agent)
//!
//! Forwarding headers are only believed when the socket peer is a configured
//! trusted proxy. Anyone else could put any address there.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header::USER_AGENT, request::Parts},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::AppState;
use crate::models::ClientInfo;

impl FromRequestParts<Arc<AppState>> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ClientInfo {
            ip: client_ip(&parts.headers, peer, &state.trusted_proxies).map(|ip| ip.to_string()),
            user_agent,
        })
    }
}

/// The socket peer, unless it is a trusted proxy. Behind one, walk
/// X-Forwarded-For from the right and take the first untrusted hop, or fall
/// back to X-Real-IP.
fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted: &[IpAddr]) -> Option<IpAddr> {
    let peer = peer?.to_canonical();
    let is_trusted = |ip: &IpAddr| trusted.contains(ip);
    if !is_trusted(&peer) {
        return Some(peer);
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(chain) = header("x-forwarded-for") {
        let mut client = peer;
        for hop in chain.rsplit(',') {
            // Anything left of an unreadable hop was written by the client
            let Ok(ip) = hop.trim().parse::<IpAddr>() else {
                break;
            };
            client = ip.to_canonical();
            if !is_trusted(&client) {
                break;
            }
        }
        return Some(client);
    }

    header("x-real-ip")
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .map(|ip| ip.to_canonical())
        .or(Some(peer))
}
