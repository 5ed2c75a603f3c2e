use crate::leak_scanner::find_leak;
use actix_web::{
    error,
    http::{header, header::ContentType, StatusCode},
    HttpResponse,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::error::Error as StdError;
use thiserror::Error;
use use_cases::flash_offers::errors::{DispatchError, ErrorCode};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ErrorBody {
    fn generic(code: ErrorCode) -> Self {
        Self {
            success: false,
            error: code.generic_message().to_string(),
            code,
            details: None,
        }
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::OfferNotFound | ErrorCode::VenueNotFound => StatusCode::NOT_FOUND,
        ErrorCode::RateLimitExceeded | ErrorCode::GatewayQuotaExceeded => {
            StatusCode::TOO_MANY_REQUESTS
        }
        ErrorCode::GatewayInitFailed | ErrorCode::DatabaseError | ErrorCode::InternalError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn log_cause(error: &DispatchError) {
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    if error.code() == ErrorCode::InternalError || !causes.is_empty() {
        tracing::error!(code = %error.code(), causes = ?causes, "Flash offer dispatch failed: {error}");
    } else {
        tracing::info!(code = %error.code(), "Flash offer dispatch rejected: {error}");
    }
}

/// Serializes the body, swapping it for the generic one when it would carry a credential.
fn scanned_body(error: &DispatchError) -> String {
    let code = error.code();
    let body = ErrorBody {
        success: false,
        error: error.to_string(),
        code,
        details: error.details(),
    };
    let generic = || {
        serde_json::to_string(&ErrorBody::generic(code))
            .unwrap_or_else(|_| r#"{"success":false}"#.to_string())
    };
    match serde_json::to_string(&body) {
        Ok(serialized) => match find_leak(&serialized) {
            Some(pattern) => {
                tracing::error!(pattern, code = %code, "Credential found in error response, sanitized");
                generic()
            }
            None => serialized,
        },
        Err(err) => {
            tracing::error!("Failed to serialize error response: {err}");
            generic()
        }
    }
}

impl error::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Dispatch(error) => status_for(error.code()),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let ApiError::Dispatch(error) = self;
        log_cause(error);

        let mut response = HttpResponse::build(self.status_code());
        response.insert_header(ContentType::json());
        if let Some(seconds) = error.retry_after(Utc::now()) {
            response.insert_header((header::RETRY_AFTER, seconds.to_string()));
        }
        response.body(scanned_body(error))
    }
}
