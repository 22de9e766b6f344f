//! Interfaces between the application code and the row store.

use crate::resolver::Resolved;
use crate::{
    CampaignRecord, ClientRecord, NewCampaign, NewParent, NewSubject, StudentRecord,
    SubjectRecord,
};
use anyhow::Result;

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "network")]
mod rest;
#[cfg(feature = "network")]
pub use rest::RestStore;

#[cfg(feature = "database")]
mod postgres;
#[cfg(feature = "database")]
pub use postgres::PgStore;

/// A tabular store holding students, clients and their dependent rows.
///
/// Lookups return every matching row ordered by ascending id. Batch inserts are
/// all-or-nothing and return the new rows in input order.
pub trait RecordStore: Send + Sync {
    fn find_students_by_email(&self, email: &str) -> Result<Vec<StudentRecord>>;

    /// Insert a student. If a row with the same email appeared concurrently the
    /// backend returns that row with `created: false` instead of failing.
    fn insert_student(&self, student: &NewParent) -> Result<Resolved<StudentRecord>>;

    fn update_student_summary(&self, student_id: u64, summary: &str) -> Result<()>;

    fn insert_subjects(&self, subjects: &[NewSubject]) -> Result<Vec<SubjectRecord>>;

    fn list_subjects(&self, student_id: u64) -> Result<Vec<SubjectRecord>>;

    fn find_clients_by_email(&self, email: &str) -> Result<Vec<ClientRecord>>;

    /// Insert a client. Same conflict behavior as `insert_student`.
    fn insert_client(&self, client: &NewParent) -> Result<Resolved<ClientRecord>>;

    fn update_client_summary(&self, client_id: u64, summary: &str) -> Result<()>;

    fn insert_campaigns(&self, campaigns: &[NewCampaign]) -> Result<Vec<CampaignRecord>>;

    fn list_campaigns(&self, client_id: u64) -> Result<Vec<CampaignRecord>>;
}
