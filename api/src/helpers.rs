//! Some helper functions for the API.

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::Response;
use rocket::response::status as rocket_status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::tokio::task::JoinError;
use std::time::Instant;
use tally_common::submission::SubmitError;

#[derive(Clone, Copy)]
pub struct RequestTimingFairing;

#[rocket::async_trait]
impl Fairing for RequestTimingFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request timing",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut rocket::Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let started_at = request.local_cache(Instant::now);
        let elapsed = started_at.elapsed();
        let status = response.status().code;

        tracing::info!(
            method = %request.method(),
            path = %request.uri(),
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request Completed"
        );
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    NotFound,
    BadRequest,
    PayloadTooLarge,
    UnprocessableEntity,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ApiErrorBody {
    error: ApiErrorKind,
    message: String,
}

impl ApiErrorBody {
    fn new(error: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct Success<T> {
    success: T,
}

pub type ApiError = rocket_status::Custom<Json<ApiErrorBody>>;
pub type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

pub fn success<T>(value: T) -> Json<Success<T>> {
    Json(Success { success: value })
}

fn api_error(status: Status, kind: ApiErrorKind, message: impl Into<String>) -> ApiError {
    rocket_status::Custom(status, Json(ApiErrorBody::new(kind, message)))
}

pub fn not_found_error(message: impl Into<String>) -> ApiError {
    api_error(Status::NotFound, ApiErrorKind::NotFound, message)
}

pub fn bad_request_error(message: impl Into<String>) -> ApiError {
    api_error(Status::BadRequest, ApiErrorKind::BadRequest, message)
}

pub fn payload_too_large_error(message: impl Into<String>) -> ApiError {
    api_error(
        Status::PayloadTooLarge,
        ApiErrorKind::PayloadTooLarge,
        message,
    )
}

pub fn unprocessable_entity_error(message: impl Into<String>) -> ApiError {
    api_error(
        Status::UnprocessableEntity,
        ApiErrorKind::UnprocessableEntity,
        message,
    )
}

pub fn internal_error(message: impl Into<String>) -> ApiError {
    api_error(Status::InternalServerError, ApiErrorKind::Internal, message)
}

/// Map the outcome of a blocking store task onto a response.
/// Backend details are logged, not returned to the caller.
pub fn respond<T>(outcome: Result<Result<T, SubmitError>, JoinError>) -> ApiResult<T> {
    match outcome {
        Ok(Ok(value)) => Ok(success(value)),
        Ok(Err(SubmitError::Invalid(e))) => Err(unprocessable_entity_error(e.to_string())),
        Ok(Err(SubmitError::NotFound(message))) => Err(not_found_error(message)),
        Ok(Err(SubmitError::Backend(e))) => {
            tracing::error!(error = %format!("{e:#}"), "Row store request failed");
            Err(internal_error("The row store could not complete the request."))
        }
        Err(e) => {
            tracing::error!(error = %e, "Blocking store task did not complete");
            Err(internal_error("The request could not be completed."))
        }
    }
}
