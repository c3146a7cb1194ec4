// SPDX-License-Identifier: Apache-2.0

use crate::query::QueryError;
use crate::server::schema::{ErrorCode, FieldError};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use tracing::error;

const JSON_CT: &str = "application/json";

pub const MSG_VALIDATION: &str = "validation_failed";
pub const MSG_QUERY: &str = "query_failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub msg_id: String,
    pub err_code: String,
    pub field: Option<String>,
}

impl Message {
    fn new(msg_id: &str, err_code: &str, field: Option<&str>) -> Self {
        Self {
            msg_id: msg_id.to_string(),
            err_code: err_code.to_string(),
            field: field.map(str::to_string),
        }
    }
}

impl From<&FieldError> for Message {
    fn from(e: &FieldError) -> Self {
        let code = serde_json::to_value(e.code)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Message::new(MSG_VALIDATION, &code, Some(e.field))
    }
}

/// Response body of every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub data: Option<T>,
    pub messages: Vec<Message>,
}

fn json_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CT));
    resp
}

fn envelope<T: Serialize>(status: StatusCode, envelope: &Envelope<T>) -> Response<Full<Bytes>> {
    match serde_json::to_vec(envelope) {
        Ok(body) => json_response(status, body.into()),
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            json_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> Response<Full<Bytes>> {
    envelope(
        StatusCode::OK,
        &Envelope {
            status: "ok",
            data: Some(data),
            messages: Vec::new(),
        },
    )
}

pub fn failure(status: StatusCode, messages: Vec<Message>) -> Response<Full<Bytes>> {
    envelope::<()>(
        status,
        &Envelope {
            status: "error",
            data: None,
            messages,
        },
    )
}

pub fn invalid_fields(errors: &[FieldError]) -> Response<Full<Bytes>> {
    failure(
        StatusCode::BAD_REQUEST,
        errors.iter().map(Message::from).collect(),
    )
}

pub fn invalid_body() -> Response<Full<Bytes>> {
    invalid_fields(&[FieldError {
        field: "body",
        code: ErrorCode::InvalidJson,
    }])
}

/// Caller mistakes are 400s, everything else a 500.
pub fn query_error(e: &QueryError) -> Response<Full<Bytes>> {
    let (status, message) = match e {
        QueryError::InvalidTimeWindow(_) => (
            StatusCode::BAD_REQUEST,
            Message::new(MSG_VALIDATION, "invalid_time_window", Some("tots")),
        ),
        QueryError::InvalidAttribute(_) => (
            StatusCode::BAD_REQUEST,
            Message::new(MSG_VALIDATION, "invalid_attribute", Some("set_attr")),
        ),
        QueryError::UnknownAggregation(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Message::new(MSG_QUERY, "unknown_aggregation", None),
        ),
        QueryError::Backend(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Message::new(MSG_QUERY, "backend_error", None),
        ),
        QueryError::Timeout => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Message::new(MSG_QUERY, "timeout", None),
        ),
        QueryError::Decode(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Message::new(MSG_QUERY, "decode_error", None),
        ),
    };
    if status.is_server_error() {
        error!(error = %e, "Query failed");
    }
    failure(status, vec![message])
}

pub fn status_only(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}
