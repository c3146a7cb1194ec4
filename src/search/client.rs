// SPDX-License-Identifier: Apache-2.0

use crate::search::bulk::{encode_bulk, parse_bulk_response};
use crate::search::config::SearchConfig;
use crate::search::errors::{Result, SearchError};
use crate::search::tls::{self, init_crypto_provider};
use crate::search::{BulkDocument, BulkOutcome, SearchBackend};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const NDJSON: &str = "application/x-ndjson";
const JSON: &str = "application/json";

/// Elasticsearch compatible client over hyper.
#[derive(Clone)]
pub struct ElasticClient {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    address: String,
    authorization: Option<HeaderValue>,
    timeout: Duration,
}

impl ElasticClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        init_crypto_provider()?;

        let tls_config = tls::client_config(config.parsed_fingerprint()?)?;
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        let authorization = match (&config.username, &config.password) {
            (Some(user), password) => {
                let token = STANDARD.encode(format!(
                    "{}:{}",
                    user,
                    password.as_deref().unwrap_or_default()
                ));
                let value = HeaderValue::from_str(&format!("Basic {}", token))
                    .map_err(|e| SearchError::Configuration(e.to_string()))?;
                Some(value)
            }
            (None, _) => None,
        };

        Ok(Self {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            authorization,
            timeout: config.timeout,
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        content_type: &'static str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("{}{}", self.address, path))
            .header(CONTENT_TYPE, content_type);
        if let Some(auth) = &self.authorization {
            builder = builder.header(AUTHORIZATION, auth.clone());
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let exchange = async {
            let resp = self
                .client
                .request(req)
                .await
                .map_err(|e| SearchError::Transport(format!("{:?}", e)))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| SearchError::Transport(e.to_string()))?
                .to_bytes();
            Ok::<_, SearchError>((status, body))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| SearchError::Timeout)?
    }

    async fn send_checked(
        &self,
        method: Method,
        path: &str,
        content_type: &'static str,
        body: Bytes,
    ) -> Result<Bytes> {
        let (status, body) = self.send(method, path, content_type, body).await?;
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl SearchBackend for ElasticClient {
    async fn ping(&self) -> Result<()> {
        self.send_checked(Method::GET, "/", JSON, Bytes::new())
            .await
            .map(|_| ())
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let body = Bytes::from(serde_json::to_vec(body)?);
        self.send_checked(Method::PUT, &format!("/{}", index), JSON, body)
            .await?;
        debug!(index, "Created index");
        Ok(())
    }

    async fn bulk_index(&self, index: &str, docs: &[BulkDocument]) -> Result<BulkOutcome> {
        if docs.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let body = encode_bulk(docs)?;
        let resp = self
            .send_checked(Method::POST, &format!("/{}/_bulk", index), NDJSON, body)
            .await?;
        parse_bulk_response(&resp)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let body = Bytes::from(serde_json::to_vec(body)?);
        let resp = self
            .send_checked(
                Method::POST,
                &format!("/{}/_search?typed_keys=true", index),
                JSON,
                body,
            )
            .await?;
        Ok(serde_json::from_slice(&resp)?)
    }
}
