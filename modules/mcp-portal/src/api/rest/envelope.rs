//! The response envelope and the per-request context extractor.
//!
//! Every response carries `{ success, data?/error?, request_id,
//! timestamp }`. Handlers extract a [`ReqCtx`] and finish with
//! [`ReqCtx::respond`], which renders either side of the envelope with the
//! request ID threaded through.

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::rest::error::{ApiError, ErrorBody};
use crate::domain::DomainError;
use crate::domain::servers::RequestMeta;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Envelope for both success and failure bodies.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-request context available to every handler.
#[derive(Clone, Debug)]
pub struct ReqCtx {
    pub request_id: String,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl ReqCtx {
    /// Success envelope.
    pub fn ok<T: Serialize>(&self, data: T) -> Response {
        Json(Envelope {
            success: true,
            data: Some(data),
            error: None,
            meta: None,
            request_id: self.request_id.clone(),
            timestamp: Utc::now(),
        })
        .into_response()
    }

    /// Failure envelope.
    pub fn fail(&self, error: ApiError) -> Response {
        let mut response = Json(Envelope::<()> {
            success: false,
            data: None,
            error: Some(error.body),
            meta: None,
            request_id: self.request_id.clone(),
            timestamp: Utc::now(),
        })
        .into_response();
        *response.status_mut() = error.status;
        response
    }

    /// Render a domain result either way.
    pub fn respond<T: Serialize>(&self, result: Result<T, DomainError>) -> Response {
        match result {
            Ok(data) => self.ok(data),
            Err(e) => self.fail(e.into()),
        }
    }

    /// Client metadata for execution and audit records.
    #[must_use]
    pub fn meta(&self) -> RequestMeta {
        RequestMeta {
            request_id: self.request_id.clone(),
            remote_addr: self.remote_addr.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ReqCtx {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);

        let remote_addr = parts
            .extensions
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|info| info.0.to_string());

        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);

        Ok(Self {
            request_id,
            remote_addr,
            user_agent,
        })
    }
}
