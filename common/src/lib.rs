//! A library with common utilities for collecting student marks and campaign results.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod conversions;
pub mod metrics;
pub mod resolver;
pub mod store;
pub mod submission;
pub mod validation;

#[cfg(feature = "network")]
pub mod client_api;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use metrics::{CampaignFigures, SubjectMarks};

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_MARK: u32 = 100;
/// Largest MQL count the `INTEGER` columns can hold.
pub const MAX_COUNT: u32 = i32::MAX.unsigned_abs();
pub const MAX_ITEMS: usize = 50;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 254;

/// One subject as typed into the student form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectForm {
    pub name: String,
    pub school_mark: u32,
    pub exam_mark: u32,
}

/// A student submission: the student plus every subject they entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    pub subjects: Vec<SubjectForm>,
}

/// One campaign as typed into the client form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignForm {
    pub campaign_name: String,
    pub channel: String,
    pub spend: f64,
    pub mql_target: u32,
    #[serde(default)]
    pub actual_mqls: u32,
}

/// A client submission: the client plus every campaign they ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    pub campaigns: Vec<CampaignForm>,
}

/// The fields needed to create a parent row. Shared by students and clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewParent {
    pub name: String,
    pub email: String,
    pub start_date: Option<NaiveDate>,
}

/// A stored student row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub start_date: Option<NaiveDate>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored subject row, always attached to one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub id: u64,
    pub student_id: u64,
    pub name: String,
    pub school_mark: u32,
    pub exam_mark: u32,
    pub average: f64,
}

/// A subject row that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSubject {
    pub student_id: u64,
    pub name: String,
    pub school_mark: u32,
    pub exam_mark: u32,
    pub average: f64,
}

/// A stored client row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub start_date: Option<NaiveDate>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored campaign row, always attached to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: u64,
    pub client_id: u64,
    pub campaign_name: String,
    pub channel: String,
    pub spend: f64,
    pub mql_target: u32,
    pub actual_mqls: u32,
}

/// A campaign row that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCampaign {
    pub client_id: u64,
    pub campaign_name: String,
    pub channel: String,
    pub spend: f64,
    pub mql_target: u32,
    pub actual_mqls: u32,
}

/// Per-subject line of a student report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub name: String,
    pub school_mark: u32,
    pub exam_mark: u32,
    pub average: f64,
}

/// What the student gets back after submitting or looking up their marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentReport {
    pub student: StudentRecord,
    pub subjects: Vec<SubjectSummary>,
    pub prediction: Option<f64>,
    pub created: bool,
}

/// Per-campaign line of a client report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub campaign_name: String,
    pub channel: String,
    pub spend: f64,
    pub mql_target: u32,
    pub actual_mqls: u32,
    pub conversion_rate: f64,
    pub cost_per_mql: f64,
}

/// What the client gets back after submitting or looking up their campaigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientReport {
    pub client: ClientRecord,
    pub campaigns: Vec<CampaignSummary>,
    pub total_spend: f64,
    pub total_mql_target: u64,
    pub total_mqls: u64,
    pub conversion_rate: f64,
    pub cost_per_mql: f64,
    pub best_campaign: Option<String>,
    pub top_channel: Option<String>,
    pub created: bool,
}

impl fmt::Display for SubjectForm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {:.2}", self.name, self.average())
    }
}

impl fmt::Display for SubjectSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {:.2}", self.name, self.average)
    }
}

impl fmt::Display for StudentForm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let subject_list = self
            .subjects
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} has subjects: {subject_list}", self.name)
    }
}

impl fmt::Display for CampaignForm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({}): ${} | Target: {} | Actual: {}",
            self.campaign_name, self.channel, self.spend, self.mql_target, self.actual_mqls
        )
    }
}

impl fmt::Display for ClientForm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let campaign_list = self
            .campaigns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} has campaigns: {campaign_list}", self.name)
    }
}
