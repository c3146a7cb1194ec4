// SPDX-License-Identifier: Apache-2.0

//! HTTP surface over the query engine. Every endpoint takes a JSON filter body
//! via POST and answers with a `{status, data, messages}` envelope.

pub mod response;
pub mod schema;
mod service;

pub use response::{Envelope, Message};
pub use schema::{ErrorCode, FieldError, QueryRequest, ValidQuery};
pub use service::Route;

use crate::logger::Logger;
use crate::query::{GeoLookup, QueryEngine};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use service::QueryService;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::limit::{RequestBodyLimit, RequestBodyLimitLayer};
use tower_http::trace::{HttpMakeClassifier, Trace, TraceLayer};
use tracing::{error, info};

pub const MAX_BODY_SIZE: usize = 64 * 1024;
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QueryServer {
    engine: Arc<QueryEngine>,
    geo: Arc<dyn GeoLookup>,
    audit: Option<Logger>,
    header_timeout: Duration,
}

impl QueryServer {
    pub fn new(engine: Arc<QueryEngine>, geo: Arc<dyn GeoLookup>) -> Self {
        Self {
            engine,
            geo,
            audit: None,
            header_timeout: DEFAULT_HEADER_TIMEOUT,
        }
    }

    /// Every accepted query is recorded as an activity entry through `logger`.
    pub fn with_audit_logger(mut self, logger: Logger) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn with_header_timeout(mut self, header_timeout: Duration) -> Self {
        self.header_timeout = header_timeout;
        self
    }

    pub async fn serve(
        &self,
        listener: TcpListener,
        cancellation: CancellationToken,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let base = QueryService::new(self.engine.clone(), self.geo.clone(), self.audit.clone());

        let timer = hyper_util::rt::TokioTimer::new();
        let graceful = hyper_util::server::graceful::GracefulShutdown::new();

        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .header_read_timeout(Some(self.header_timeout))
            .timer(timer.clone());
        builder.http2().timer(timer);

        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Query server listening");
        }

        loop {
            let (stream, peer) = tokio::select! {
                r = listener.accept() => {
                    match r {
                        Ok(accepted) => accepted,
                        Err(e) => return Err(e.into()),
                    }
                },
                _ = cancellation.cancelled() => break
            };

            let io = TokioIo::new(stream);
            let svc = TowerToHyperService::new(build_service(base.with_peer(peer)));

            let conn = builder.serve_connection(io, svc);
            let fut = graceful.watch(conn.into_owned());

            tokio::spawn(async move {
                let _ = fut.await.map_err(|e| {
                    if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
                        let err_str = format!("{:?}", hyper_err);

                        // Client went away mid-shutdown, or an idle connection hit the header timeout
                        let err_not_connected = err_str.contains("NotConnected");
                        let err_hdr_timeout = err_str.contains("HeaderTimeout");

                        if !err_not_connected && !err_hdr_timeout {
                            error!("error serving connection: {:?}", hyper_err);
                        }
                    } else {
                        error!("error serving connection: {:?}", e);
                    }
                });
            });
        }

        graceful.shutdown().await;
        info!("Query server stopped");

        Ok(())
    }
}

fn build_service(svc: QueryService) -> Trace<RequestBodyLimit<QueryService>, HttpMakeClassifier> {
    ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .service(svc)
}
