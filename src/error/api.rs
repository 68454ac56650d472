use super::{AppError, ErrorKind, parse_error};
use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who made the call that failed. Attached to log lines only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub actor_id: Option<String>,
    pub organization_id: Option<String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            actor_id: None,
            organization_id: None,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Stable caller-facing error body: `{ "error", "type", "timestamp" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub timestamp: DateTime<Utc>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        Self {
            error: err.message.clone(),
            kind: err.kind,
            timestamp: err.timestamp,
        }
    }
}

/// Classified error plus the body to hand back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrorOutcome {
    pub error: AppError,
    pub response: ErrorResponse,
}

impl ApiErrorOutcome {
    pub fn status_code(&self) -> u16 {
        self.error.status_code
    }
}

/// Classifies `raw`, logs it with the request context and builds the response body.
///
/// Client errors are logged at `warn`, storage failures at `error`.
pub fn handle_api_error<E>(raw: E, context: &RequestContext) -> ApiErrorOutcome
where
    E: Into<anyhow::Error>,
{
    let app = parse_error(raw);
    let actor = context.actor_id.as_deref().unwrap_or("-");
    let organization = context.organization_id.as_deref().unwrap_or("-");

    if app.kind.is_client_error() {
        warn!(
            "request {} failed (actor={}, org={}): {} [{}]",
            context.request_id, actor, organization, app.message, app.kind
        );
    } else {
        error!(
            "request {} failed (actor={}, org={}): {} [{}] cause={:?}",
            context.request_id, actor, organization, app.message, app.kind, app.cause
        );
    }

    let response = ErrorResponse::from(&app);
    ApiErrorOutcome {
        error: app,
        response,
    }
}
