//! Record store backed by a hosted PostgREST-style tabular API.

use super::RecordStore;
use crate::resolver::{Identified, Resolved};
use crate::{
    CampaignRecord, ClientRecord, NewCampaign, NewParent, NewSubject, REQUEST_TIMEOUT_SECS,
    StudentRecord, SubjectRecord,
};
use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

const STUDENTS: &str = "students";
const SUBJECTS: &str = "subjects";
const CLIENTS: &str = "clients";
const CAMPAIGNS: &str = "campaigns";

/// Talks to `{service_url}/rest/v1/{table}` with the service key.
///
/// Build it outside of any async runtime; the blocking client owns its own.
pub struct RestStore {
    client: Client,
    base_url: String,
}

fn eq_filter(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn prefer_header(ignore_duplicates: bool) -> &'static str {
    if ignore_duplicates {
        "return=representation,resolution=ignore-duplicates"
    } else {
        "return=representation"
    }
}

/// Turn a non-2xx response into an error carrying the status and body.
fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(anyhow!("{what} failed with {status}: {body}"))
}

fn read_rows<T: DeserializeOwned>(response: Response, what: &str) -> Result<Vec<T>> {
    check_status(response, what)?
        .json::<Vec<T>>()
        .with_context(|| format!("Failed to decode rows from {what}"))
}

fn send(request: RequestBuilder, what: &str) -> Result<Response> {
    request
        .send()
        .with_context(|| format!("Failed to reach the row store for {what}"))
}

impl RestStore {
    /// Build a store for the given service URL and key.
    ///
    /// # Errors
    /// Returns an error if the key cannot be sent as a header or the HTTP client cannot be built.
    pub fn new(service_url: &str, service_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut api_key =
            HeaderValue::from_str(service_key).context("Service key is not a valid header value")?;
        api_key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .context("Service key is not a valid header value")?;
        bearer.set_sensitive(true);
        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: service_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn select_eq<T: DeserializeOwned>(&self, table: &str, column: &str, value: &str) -> Result<Vec<T>> {
        let filter = eq_filter(value);
        let request = self.client.get(self.table_url(table)).query(&[
            ("select", "*"),
            (column, filter.as_str()),
            ("order", "id.asc"),
        ]);
        let what = format!("select from {table}");
        read_rows(send(request, &what)?, &what)
    }

    fn insert_rows<R: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        rows: &[R],
        on_conflict: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", prefer_header(on_conflict.is_some()))
            .json(rows);
        if let Some(column) = on_conflict {
            request = request.query(&[("on_conflict", column)]);
        }
        let what = format!("insert into {table}");
        read_rows(send(request, &what)?, &what)
    }

    fn update_summary(&self, table: &str, row_id: u64, summary: &str) -> Result<()> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", eq_filter(row_id))])
            .header("Prefer", "return=representation")
            .json(&json!({ "summary": summary }));
        let what = format!("update {table}");
        let updated: Vec<serde_json::Value> = read_rows(send(request, &what)?, &what)?;
        if updated.is_empty() {
            return Err(anyhow!("{table} row #{row_id} does not exist"));
        }
        Ok(())
    }

    /// Insert a parent, tolerating a concurrent insert of the same email.
    fn insert_parent<T: DeserializeOwned + Identified>(
        &self,
        table: &str,
        new: &NewParent,
    ) -> Result<Resolved<T>> {
        let inserted: Vec<T> = self.insert_rows(table, std::slice::from_ref(new), Some("email"))?;
        if let Some(record) = inserted.into_iter().next() {
            return Ok(Resolved {
                record,
                created: true,
            });
        }
        // ignored as a duplicate, so the row is already there
        let record = self
            .select_eq::<T>(table, "email", &new.email)?
            .into_iter()
            .min_by_key(|row| row.id())
            .ok_or_else(|| anyhow!("{table} row for {} vanished after an insert conflict", new.email))?;
        Ok(Resolved {
            record,
            created: false,
        })
    }

    fn list_by_parent<T: DeserializeOwned>(&self, table: &str, column: &str, parent_id: u64) -> Result<Vec<T>> {
        self.select_eq(table, column, &parent_id.to_string())
    }
}

impl RecordStore for RestStore {
    fn find_students_by_email(&self, email: &str) -> Result<Vec<StudentRecord>> {
        self.select_eq(STUDENTS, "email", email)
    }

    fn insert_student(&self, student: &NewParent) -> Result<Resolved<StudentRecord>> {
        self.insert_parent(STUDENTS, student)
    }

    fn update_student_summary(&self, student_id: u64, summary: &str) -> Result<()> {
        self.update_summary(STUDENTS, student_id, summary)
    }

    fn insert_subjects(&self, subjects: &[NewSubject]) -> Result<Vec<SubjectRecord>> {
        self.insert_rows(SUBJECTS, subjects, None)
    }

    fn list_subjects(&self, student_id: u64) -> Result<Vec<SubjectRecord>> {
        self.list_by_parent(SUBJECTS, "student_id", student_id)
    }

    fn find_clients_by_email(&self, email: &str) -> Result<Vec<ClientRecord>> {
        self.select_eq(CLIENTS, "email", email)
    }

    fn insert_client(&self, client: &NewParent) -> Result<Resolved<ClientRecord>> {
        self.insert_parent(CLIENTS, client)
    }

    fn update_client_summary(&self, client_id: u64, summary: &str) -> Result<()> {
        self.update_summary(CLIENTS, client_id, summary)
    }

    fn insert_campaigns(&self, campaigns: &[NewCampaign]) -> Result<Vec<CampaignRecord>> {
        self.insert_rows(CAMPAIGNS, campaigns, None)
    }

    fn list_campaigns(&self, client_id: u64) -> Result<Vec<CampaignRecord>> {
        self.list_by_parent(CAMPAIGNS, "client_id", client_id)
    }
}
