// SPDX-License-Identifier: Apache-2.0

use crate::entry::LogType;
use crate::logger::Logger;
use crate::query::{GeoLookup, QueryEngine};
use crate::server::response;
use crate::server::schema::{QueryRequest, ValidQuery};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use serde_json::Value;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Logs,
    ActivityLogs,
    DebugLogs,
    HighPriorityLogs,
    DataChanges,
    Apps,
    Set,
    UnusualIps,
}

impl Route {
    pub const ALL: [Route; 8] = [
        Route::Logs,
        Route::ActivityLogs,
        Route::DebugLogs,
        Route::HighPriorityLogs,
        Route::DataChanges,
        Route::Apps,
        Route::Set,
        Route::UnusualIps,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Logs => "/get_logs",
            Route::ActivityLogs => "/get_activity_logs",
            Route::DebugLogs => "/get_debug_logs",
            Route::HighPriorityLogs => "/get_high_priority_logs",
            Route::DataChanges => "/get_data_changes",
            Route::Apps => "/get_apps",
            Route::Set => "/get_set",
            Route::UnusualIps => "/get_unusual_ips",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        Self::ALL.into_iter().find(|r| r.path() == path)
    }

    /// Endpoints that read a fixed log type ignore the caller's `type`.
    fn fixed_type(&self) -> Option<LogType> {
        match self {
            Route::ActivityLogs => Some(LogType::Activity),
            Route::DebugLogs => Some(LogType::Debug),
            Route::DataChanges => Some(LogType::Change),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct QueryService {
    engine: Arc<QueryEngine>,
    geo: Arc<dyn GeoLookup>,
    audit: Option<Logger>,
    peer: Option<SocketAddr>,
}

impl QueryService {
    pub(crate) fn new(
        engine: Arc<QueryEngine>,
        geo: Arc<dyn GeoLookup>,
        audit: Option<Logger>,
    ) -> Self {
        Self {
            engine,
            geo,
            audit,
            peer: None,
        }
    }

    pub(crate) fn with_peer(&self, peer: SocketAddr) -> Self {
        let mut svc = self.clone();
        svc.peer = Some(peer);
        svc
    }
}

impl<H> Service<Request<H>> for QueryService
where
    H: Body + Send + 'static,
    <H as Body>::Data: Send,
    <H as Body>::Error: Display + Send,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<H>) -> Self::Future {
        let Some(route) = Route::from_path(req.uri().path()) else {
            return Box::pin(futures::future::ok(response::status_only(
                StatusCode::NOT_FOUND,
            )));
        };
        if req.method() != Method::POST {
            return Box::pin(futures::future::ok(response::status_only(
                StatusCode::METHOD_NOT_ALLOWED,
            )));
        }

        if let Some(peer) = self.peer {
            req.extensions_mut().insert(peer);
        }

        let svc = self.clone();
        Box::pin(async move { Ok(svc.handle(route, req).await) })
    }
}

impl QueryService {
    async fn handle<H>(self, route: Route, req: Request<H>) -> Response<Full<Bytes>>
    where
        H: Body,
        <H as Body>::Error: Display,
    {
        let audit = self.audit.as_ref().map(|l| l.with_http_request(&req));

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                if e.to_string().contains("length limit exceeded") {
                    return response::status_only(StatusCode::PAYLOAD_TOO_LARGE);
                }
                error!(error = %e, "Failed to read request body");
                return response::status_only(StatusCode::BAD_REQUEST);
            }
        };

        let raw: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            match serde_json::from_slice(&body) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(error = %e, "Malformed query body");
                    return response::invalid_body();
                }
            }
        };
        let request: QueryRequest = match serde_json::from_value(raw.clone()) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Query body does not match the schema");
                return response::invalid_body();
            }
        };

        let query = match request.validate(route == Route::Set) {
            Ok(query) => query,
            Err(errors) => return response::invalid_fields(&errors),
        };

        if let Some(logger) = audit {
            record(logger, route, raw);
        }

        self.run(route, query).await
    }

    async fn run(&self, route: Route, query: ValidQuery) -> Response<Full<Bytes>> {
        let ValidQuery {
            mut filter,
            cursor,
            set_attr,
        } = query;
        if let Some(log_type) = route.fixed_type() {
            filter.log_type = Some(log_type);
        }

        let engine = &self.engine;
        match route {
            Route::Logs | Route::ActivityLogs | Route::DebugLogs | Route::DataChanges => {
                reply(engine.get_logs(&filter, cursor.as_ref()).await)
            }
            Route::HighPriorityLogs => {
                reply(engine.get_logs_at_or_above(&filter, cursor.as_ref()).await)
            }
            Route::Apps => reply(engine.get_apps().await),
            Route::Set => {
                let attr = set_attr.unwrap_or_default();
                reply(engine.get_set(&attr, &filter).await)
            }
            Route::UnusualIps => reply(engine.get_unusual_ips(&filter, self.geo.as_ref()).await),
        }
    }
}

fn reply<T: serde::Serialize>(
    result: Result<T, crate::query::QueryError>,
) -> Response<Full<Bytes>> {
    match result {
        Ok(data) => response::ok(data),
        Err(e) => response::query_error(&e),
    }
}

/// Writes an audit entry for the request. Log writes block on the producer,
/// so they run on the blocking pool.
fn record(logger: Logger, route: Route, body: Value) {
    tokio::task::spawn_blocking(move || {
        let logger = logger.with_op(route.path().trim_start_matches('/'));
        if let Err(e) = logger.log_activity_fmt(format_args!("query {}", route.path()), &body) {
            warn!(error = %e, "Failed to write audit log entry");
        }
    });
}
