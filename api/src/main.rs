//! An api for collecting student marks and marketing campaign results.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::needless_pass_by_value)]

#[macro_use]
extern crate rocket;

mod config;
mod helpers;

use clap::Parser;
use config::Config;
use helpers::{
    ApiError, ApiResult, RequestTimingFairing, bad_request_error, internal_error, not_found_error,
    payload_too_large_error, respond, unprocessable_entity_error,
};
use rocket::serde::json::Json;
use rocket::tokio::task::spawn_blocking;
use rocket::{Build, Request, Rocket, State};
use rocket_prometheus::PrometheusMetrics;
use std::sync::Arc;
use tally_common::store::RecordStore;
use tally_common::submission;
use tally_common::{ClientForm, ClientReport, StudentForm, StudentReport};
use tracing_subscriber::EnvFilter;

/// Shared by every request. Holds nothing but the store handle.
pub struct AppState {
    store: Arc<dyn RecordStore>,
}

#[post("/students", data = "<form>")]
async fn submit_student(state: &State<AppState>, form: Json<StudentForm>) -> ApiResult<StudentReport> {
    let store = Arc::clone(&state.store);
    let form = form.into_inner();
    respond(spawn_blocking(move || submission::submit_student(store.as_ref(), &form)).await)
}

#[post("/clients", data = "<form>")]
async fn submit_client(state: &State<AppState>, form: Json<ClientForm>) -> ApiResult<ClientReport> {
    let store = Arc::clone(&state.store);
    let form = form.into_inner();
    respond(spawn_blocking(move || submission::submit_client(store.as_ref(), &form)).await)
}

#[get("/students?<email>")]
async fn get_student(state: &State<AppState>, email: Option<String>) -> ApiResult<StudentReport> {
    let Some(email) = email else {
        return Err(bad_request_error("The email query parameter is required."));
    };
    let store = Arc::clone(&state.store);
    respond(spawn_blocking(move || submission::student_report(store.as_ref(), &email)).await)
}

#[get("/clients?<email>")]
async fn get_client(state: &State<AppState>, email: Option<String>) -> ApiResult<ClientReport> {
    let Some(email) = email else {
        return Err(bad_request_error("The email query parameter is required."));
    };
    let store = Arc::clone(&state.store);
    respond(spawn_blocking(move || submission::client_report(store.as_ref(), &email)).await)
}

#[catch(400)]
fn bad_request(_req: &Request) -> ApiError {
    bad_request_error("The request body could not be parsed.")
}

#[catch(404)]
fn not_found(_req: &Request) -> ApiError {
    not_found_error("The requested resource could not be found.")
}

#[catch(413)]
fn payload_too_large(_req: &Request) -> ApiError {
    payload_too_large_error("The request body is too large.")
}

#[catch(422)]
fn unprocessable_entity(_req: &Request) -> ApiError {
    unprocessable_entity_error("The request body does not match the expected form.")
}

#[catch(500)]
fn internal(_req: &Request) -> ApiError {
    internal_error("The server encountered an internal error.")
}

fn build_rocket(store: Arc<dyn RecordStore>) -> Rocket<Build> {
    rocket::build()
        .manage(AppState { store })
        .attach(RequestTimingFairing)
        .mount(
            "/",
            routes![submit_student, submit_client, get_student, get_client],
        )
        .register(
            "/",
            catchers![
                bad_request,
                not_found,
                payload_too_large,
                unprocessable_entity,
                internal
            ],
        )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    // the store is opened before the runtime starts and dropped after it stops
    let store = match config.open_store() {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), backend = ?config.backend, "Failed to open the row store");
            std::process::exit(1);
        }
    };
    tracing::info!(backend = ?config.backend, "Row store ready");

    let prometheus = PrometheusMetrics::new();
    let rocket = build_rocket(Arc::clone(&store))
        .attach(prometheus.clone())
        .mount("/metrics", prometheus);

    let outcome = rocket::execute(rocket.launch());
    drop(store);
    if let Err(e) = outcome {
        tracing::error!(error = %e, "Server stopped with an error");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::{ContentType, Status};
    use rocket::local::blocking::Client;
    use rocket::serde::json::{Value, json};
    use tally_common::store::MemoryStore;

    fn client() -> Client {
        Client::tracked(build_rocket(Arc::new(MemoryStore::new()))).expect("valid rocket instance")
    }

    fn tommy() -> Value {
        json!({
            "name": "Tommy",
            "email": "tommy@example.com",
            "start_date": "2025-02-01",
            "subjects": [
                {"name": "Math", "school_mark": 88, "exam_mark": 92},
                {"name": "English", "school_mark": 75, "exam_mark": 78}
            ]
        })
    }

    fn acme() -> Value {
        json!({
            "name": "Acme Corp",
            "email": "ops@acme.test",
            "campaigns": [
                {"campaign_name": "Spring Search", "channel": "Google Ads",
                 "spend": 5000.0, "mql_target": 100, "actual_mqls": 85},
                {"campaign_name": "Spring Social", "channel": "Facebook",
                 "spend": 3000.0, "mql_target": 50, "actual_mqls": 45}
            ]
        })
    }

    #[test]
    fn test_submit_student() {
        let client = client();
        let response = client.post("/students").json(&tommy()).dispatch();
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().unwrap();
        let report = &body["success"];
        assert_eq!(report["created"], json!(true));
        assert_eq!(report["student"]["email"], json!("tommy@example.com"));
        assert_eq!(report["student"]["start_date"], json!("2025-02-01"));
        let prediction = report["prediction"].as_f64().unwrap();
        assert!((prediction - 83.25).abs() < 1e-9);
    }

    #[test]
    fn test_resubmitting_reuses_the_student() {
        let client = client();
        let first: Value = client.post("/students").json(&tommy()).dispatch().into_json().unwrap();
        let second: Value = client.post("/students").json(&tommy()).dispatch().into_json().unwrap();

        assert_eq!(first["success"]["student"]["id"], second["success"]["student"]["id"]);
        assert_eq!(second["success"]["created"], json!(false));

        let stored: Value = client
            .get("/students?email=tommy@example.com")
            .dispatch()
            .into_json()
            .unwrap();
        assert_eq!(stored["success"]["subjects"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_submit_client() {
        let client = client();
        let response = client.post("/clients").json(&acme()).dispatch();
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().unwrap();
        let report = &body["success"];
        assert_eq!(report["total_mqls"], json!(130));
        assert!((report["total_spend"].as_f64().unwrap() - 8000.0).abs() < 1e-9);
        assert!((report["conversion_rate"].as_f64().unwrap() - 86.7).abs() < 0.05);
        assert_eq!(report["top_channel"], json!("Google Ads"));
    }

    #[test]
    fn test_invalid_form_is_unprocessable() {
        let client = client();
        let mut form = tommy();
        form["email"] = json!("not-an-email");
        form["subjects"][0]["exam_mark"] = json!(140);

        let response = client.post("/students").json(&form).dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["error"], json!("unprocessable_entity"));
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("email"));
        assert!(message.contains("subjects[0].exam_mark"));
    }

    #[test]
    fn test_malformed_body() {
        let client = client();
        let response = client
            .post("/clients")
            .header(ContentType::JSON)
            .body("{\"name\": ")
            .dispatch();
        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["error"], json!("bad_request"));

        let response = client
            .post("/clients")
            .json(&json!({"name": "Acme", "email": "ops@acme.test", "campaigns": "none"}))
            .dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[test]
    fn test_oversized_body() {
        let client = client();
        let body = format!(
            r#"{{"name": "{}", "email": "tommy@example.com", "subjects": []}}"#,
            "a".repeat(2 * 1024 * 1024)
        );
        let response = client
            .post("/students")
            .header(ContentType::JSON)
            .body(body)
            .dispatch();
        assert_eq!(response.status(), Status::PayloadTooLarge);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["error"], json!("payload_too_large"));
    }

    #[test]
    fn test_lookup() {
        let client = client();
        let response = client.get("/clients?email=ghost@acme.test").dispatch();
        assert_eq!(response.status(), Status::NotFound);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["error"], json!("not_found"));

        let response = client.get("/clients").dispatch();
        assert_eq!(response.status(), Status::BadRequest);

        client.post("/clients").json(&acme()).dispatch();
        let response = client.get("/clients?email=OPS@acme.test").dispatch();
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["success"]["campaigns"].as_array().unwrap().len(), 2);
        assert_eq!(body["success"]["best_campaign"], json!("Spring Social"));
    }

    #[test]
    fn test_unknown_route() {
        let client = client();
        let response = client.get("/nothing-here").dispatch();
        assert_eq!(response.status(), Status::NotFound);
        let body: Value = response.into_json().unwrap();
        assert_eq!(body["error"], json!("not_found"));
    }
}
