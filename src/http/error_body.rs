//! Structured error responses
//!
//! Every pipeline failure reaches the client as a 400 carrying a JSON body
//! with a single error record. The [`ErrorKind`](crate::error::ErrorKind) is
//! only visible in the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::error::Error as _;

use crate::error::ConvertError;

/// Title shared by every error record
pub const ERROR_TITLE: &str = "Something went wrong converting the audio file";

/// Status used for every failed conversion
pub const ERROR_STATUS: StatusCode = StatusCode::BAD_REQUEST;

/// One client-facing error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub status: u16,
    pub code: String,
    pub title: String,
    pub detail: String,
}

/// Response body: a list of error records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorRecord>,
}

impl ErrorRecord {
    pub fn from_error(err: &ConvertError) -> Self {
        Self {
            status: ERROR_STATUS.as_u16(),
            code: ERROR_STATUS.as_u16().to_string(),
            title: ERROR_TITLE.to_string(),
            detail: err.to_string(),
        }
    }
}

/// Log `err` with its cause chain and build the client response
pub fn report(err: &ConvertError) -> Response {
    tracing::error!(kind = %err.kind(), "{}", cause_chain(err));

    let body = ErrorBody {
        errors: vec![ErrorRecord::from_error(err)],
    };
    (ERROR_STATUS, Json(body)).into_response()
}

/// `err` followed by any sources not already quoted in its message
fn cause_chain(err: &ConvertError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        report(&self)
    }
}
