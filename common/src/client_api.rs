//! Synchronous client-server connection utilities with proper error handling.

use crate::{ClientForm, ClientReport, REQUEST_TIMEOUT_SECS, StudentForm, StudentReport};
use anyhow::{Context, Result, anyhow};
use log::warn;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::{thread, time::Duration};

/// Successful responses are wrapped as `{"success": ...}`.
#[derive(Debug, Deserialize)]
struct SuccessEnvelope<T> {
    success: T,
}

/// Error responses carry `{"error": kind, "message": ...}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
    message: String,
}

/// Only failures where the request never reached the server are retried.
/// A submission that reached the server may already have written rows.
fn is_retryable_error(e: &reqwest::Error) -> bool {
    e.is_connect()
}

/// Helper function to classify reqwest error types
fn error_type_str(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection"
    } else if e.is_request() {
        "request/DNS"
    } else if e.is_body() {
        "body"
    } else if e.is_decode() {
        "decode"
    } else {
        "unknown"
    }
}

fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(format!("tally-client/{}", crate::CLIENT_VERSION))
        .build()
        .context("Failed to build HTTP client")
}

const MAX_BACKOFF_SECS: u64 = 60;

/// Seconds to wait before retry number `attempt` (1-based), doubling up to a cap.
fn backoff_secs(attempt: u32) -> u64 {
    2_u64
        .saturating_pow(attempt.saturating_sub(1))
        .min(MAX_BACKOFF_SECS)
}

/// Send with exponential backoff on connection failures, then unwrap the envelope.
/// The request is tried once plus up to `max_retries` more times.
fn send_with_retry<F, T>(build_request: F, max_retries: u32) -> Result<T>
where
    F: Fn() -> RequestBuilder,
    T: DeserializeOwned,
{
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        match build_request().send() {
            Ok(response) => return read_envelope(response),
            Err(e) => {
                if is_retryable_error(&e) && attempts <= max_retries {
                    let sleep_secs = backoff_secs(attempts);
                    warn!(
                        "Network error ({}), retrying in {} seconds... (retry {}/{}): {}",
                        error_type_str(&e),
                        sleep_secs,
                        attempts,
                        max_retries,
                        e
                    );
                    thread::sleep(Duration::from_secs(sleep_secs));
                    continue;
                }
                return Err(anyhow!(
                    "Network error ({}) after {attempts} attempts: {e}",
                    error_type_str(&e)
                ));
            }
        }
    }
}

fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().context("Failed to read server response")?;
    parse_envelope(status.as_u16(), &body)
}

fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T> {
    if (200..300).contains(&status) {
        let envelope: SuccessEnvelope<T> =
            serde_json::from_str(body).context("Failed to deserialize server response")?;
        return Ok(envelope.success);
    }
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(err) => Err(anyhow!(
            "Server returned an error ({status} {}): {}",
            err.error,
            err.message
        )),
        Err(_) => Err(anyhow!("Server returned an error ({status}): {body}")),
    }
}

/// Submit a student form and return the server's report.
///
/// # Errors
///
/// Returns an error if:
/// - The server cannot be reached after all retry attempts
/// - The server rejects the form or fails to store it
/// - The response cannot be deserialized
pub fn submit_student_to_server(
    api_base: &str,
    form: &StudentForm,
    max_retries: u32,
) -> Result<StudentReport> {
    let client = build_client()?;
    let url = format!("{api_base}/students");
    send_with_retry(|| client.post(&url).json(form), max_retries)
}

/// Submit a client form and return the server's report.
///
/// # Errors
///
/// Same as [`submit_student_to_server`].
pub fn submit_client_to_server(
    api_base: &str,
    form: &ClientForm,
    max_retries: u32,
) -> Result<ClientReport> {
    let client = build_client()?;
    let url = format!("{api_base}/clients");
    send_with_retry(|| client.post(&url).json(form), max_retries)
}

/// Fetch the stored report for a student.
///
/// # Errors
///
/// Returns an error if the server cannot be reached, has no such student, or fails.
pub fn get_student_report_from_server(
    api_base: &str,
    email: &str,
    max_retries: u32,
) -> Result<StudentReport> {
    let client = build_client()?;
    let url = format!("{api_base}/students");
    send_with_retry(|| client.get(&url).query(&[("email", email)]), max_retries)
}

/// Fetch the stored report for a client.
///
/// # Errors
///
/// Returns an error if the server cannot be reached, has no such client, or fails.
pub fn get_client_report_from_server(
    api_base: &str,
    email: &str,
    max_retries: u32,
) -> Result<ClientReport> {
    let client = build_client()?;
    let url = format!("{api_base}/clients");
    send_with_retry(|| client.get(&url).query(&[("email", email)]), max_retries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_envelope() {
        let value: Vec<u32> = parse_envelope(200, r#"{"success":[1,2,3]}"#).unwrap();
        assert_eq!(value, vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_error_envelope() {
        let err = parse_envelope::<u32>(
            422,
            r#"{"error":"unprocessable_entity","message":"email: is required"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Server returned an error (422 unprocessable_entity): email: is required"
        );
    }

    #[test]
    fn test_parse_unstructured_error() {
        let err = parse_envelope::<u32>(502, "Bad Gateway").unwrap_err();
        assert_eq!(err.to_string(), "Server returned an error (502): Bad Gateway");
    }

    #[test]
    fn test_unreachable_server_fails_after_retries() {
        // nothing listens on port 9 of localhost in a test sandbox
        let err = get_student_report_from_server("http://127.0.0.1:9", "a@b.co", 0).unwrap_err();
        assert!(err.to_string().starts_with("Network error"));
        assert!(err.to_string().contains("after 1 attempts"));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_secs(1), 1);
        assert_eq!(backoff_secs(2), 2);
        assert_eq!(backoff_secs(4), 8);
        assert_eq!(backoff_secs(7), MAX_BACKOFF_SECS);
        assert_eq!(backoff_secs(65), MAX_BACKOFF_SECS);
        assert_eq!(backoff_secs(u32::MAX), MAX_BACKOFF_SECS);
    }
}
