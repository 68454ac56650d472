//! Error taxonomy: turns raw storage failures into the closed set of
//! [`ErrorKind`]s callers branch on.

pub mod api;
pub mod app_error;
pub mod kind;

pub use api::{ApiErrorOutcome, ErrorResponse, RequestContext, handle_api_error};
pub use app_error::{AppError, AppResult, classify_store_error, parse_error};
pub use kind::ErrorKind;
