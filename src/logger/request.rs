// SPDX-License-Identifier: Apache-2.0

use crate::entry::Ksuid;
use crate::logger::Logger;
use http::Request;
use http::header::HeaderName;
use std::net::SocketAddr;

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");
pub const FORWARDED_FOR_HEADER: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const REAL_IP_HEADER: HeaderName = HeaderName::from_static("x-real-ip");

impl Logger {
    /// Derives a logger carrying the request's trace id and client address.
    /// The peer address is read from a `SocketAddr` request extension, which
    /// the query server inserts for every connection.
    pub fn with_http_request<B>(&self, req: &Request<B>) -> Logger {
        let logger = self.with_trace_id(request_trace_id(req));
        match client_ip(req) {
            Some(ip) => logger.with_remote_ip(ip),
            None => logger,
        }
    }
}

/// The `X-Trace-ID` header, or a fresh KSUID when absent.
pub fn request_trace_id<B>(req: &Request<B>) -> String {
    header_str(req, &TRACE_ID_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| Ksuid::new().to_string())
}

/// Client address by preference: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the peer host.
pub fn client_ip<B>(req: &Request<B>) -> Option<String> {
    if let Some(first) = header_str(req, &FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(first.to_string());
    }

    if let Some(real) = header_str(req, &REAL_IP_HEADER) {
        return Some(real.to_string());
    }

    req.extensions()
        .get::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
}

fn header_str<'a, B>(req: &'a Request<B>, name: &HeaderName) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
