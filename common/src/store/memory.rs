//! In-process record store for tests and offline evaluation.

use super::RecordStore;
use crate::resolver::Resolved;
use crate::{
    CampaignRecord, ClientRecord, NewCampaign, NewParent, NewSubject, StudentRecord,
    SubjectRecord,
};
use anyhow::{Result, anyhow};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    students: Vec<StudentRecord>,
    subjects: Vec<SubjectRecord>,
    clients: Vec<ClientRecord>,
    campaigns: Vec<CampaignRecord>,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Rows kept in vectors behind a single lock. Ids are shared across tables and start at 1.
/// Emails are unique per parent table, like the unique index on the real tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock was poisoned"))
    }

    /// Number of student rows, for assertions about duplicates.
    ///
    /// # Errors
    /// Returns an error if the lock was poisoned.
    pub fn student_count(&self) -> Result<usize> {
        Ok(self.lock()?.students.len())
    }

    /// Number of client rows, for assertions about duplicates.
    ///
    /// # Errors
    /// Returns an error if the lock was poisoned.
    pub fn client_count(&self) -> Result<usize> {
        Ok(self.lock()?.clients.len())
    }
}

impl RecordStore for MemoryStore {
    fn find_students_by_email(&self, email: &str) -> Result<Vec<StudentRecord>> {
        let tables = self.lock()?;
        Ok(tables
            .students
            .iter()
            .filter(|s| s.email == email)
            .cloned()
            .collect())
    }

    fn insert_student(&self, student: &NewParent) -> Result<Resolved<StudentRecord>> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.students.iter().find(|r| r.email == student.email) {
            return Ok(Resolved {
                record: existing.clone(),
                created: false,
            });
        }
        let record = StudentRecord {
            id: tables.allocate_id(),
            name: student.name.clone(),
            email: student.email.clone(),
            start_date: student.start_date,
            summary: None,
            created_at: Utc::now(),
        };
        tables.students.push(record.clone());
        Ok(Resolved {
            record,
            created: true,
        })
    }

    fn update_student_summary(&self, student_id: u64, summary: &str) -> Result<()> {
        let mut tables = self.lock()?;
        let student = tables
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| anyhow!("student #{student_id} does not exist"))?;
        student.summary = Some(summary.to_string());
        Ok(())
    }

    fn insert_subjects(&self, subjects: &[NewSubject]) -> Result<Vec<SubjectRecord>> {
        let mut tables = self.lock()?;
        if let Some(orphan) = subjects
            .iter()
            .find(|new| !tables.students.iter().any(|s| s.id == new.student_id))
        {
            return Err(anyhow!(
                "subject '{}' references missing student #{}",
                orphan.name,
                orphan.student_id
            ));
        }

        let mut inserted = Vec::with_capacity(subjects.len());
        for new in subjects {
            let record = SubjectRecord {
                id: tables.allocate_id(),
                student_id: new.student_id,
                name: new.name.clone(),
                school_mark: new.school_mark,
                exam_mark: new.exam_mark,
                average: new.average,
            };
            tables.subjects.push(record.clone());
            inserted.push(record);
        }
        Ok(inserted)
    }

    fn list_subjects(&self, student_id: u64) -> Result<Vec<SubjectRecord>> {
        let tables = self.lock()?;
        Ok(tables
            .subjects
            .iter()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect())
    }

    fn find_clients_by_email(&self, email: &str) -> Result<Vec<ClientRecord>> {
        let tables = self.lock()?;
        Ok(tables
            .clients
            .iter()
            .filter(|c| c.email == email)
            .cloned()
            .collect())
    }

    fn insert_client(&self, client: &NewParent) -> Result<Resolved<ClientRecord>> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.clients.iter().find(|r| r.email == client.email) {
            return Ok(Resolved {
                record: existing.clone(),
                created: false,
            });
        }
        let record = ClientRecord {
            id: tables.allocate_id(),
            name: client.name.clone(),
            email: client.email.clone(),
            start_date: client.start_date,
            summary: None,
            created_at: Utc::now(),
        };
        tables.clients.push(record.clone());
        Ok(Resolved {
            record,
            created: true,
        })
    }

    fn update_client_summary(&self, client_id: u64, summary: &str) -> Result<()> {
        let mut tables = self.lock()?;
        let client = tables
            .clients
            .iter_mut()
            .find(|c| c.id == client_id)
            .ok_or_else(|| anyhow!("client #{client_id} does not exist"))?;
        client.summary = Some(summary.to_string());
        Ok(())
    }

    fn insert_campaigns(&self, campaigns: &[NewCampaign]) -> Result<Vec<CampaignRecord>> {
        let mut tables = self.lock()?;
        if let Some(orphan) = campaigns
            .iter()
            .find(|new| !tables.clients.iter().any(|c| c.id == new.client_id))
        {
            return Err(anyhow!(
                "campaign '{}' references missing client #{}",
                orphan.campaign_name,
                orphan.client_id
            ));
        }

        let mut inserted = Vec::with_capacity(campaigns.len());
        for new in campaigns {
            let record = CampaignRecord {
                id: tables.allocate_id(),
                client_id: new.client_id,
                campaign_name: new.campaign_name.clone(),
                channel: new.channel.clone(),
                spend: new.spend,
                mql_target: new.mql_target,
                actual_mqls: new.actual_mqls,
            };
            tables.campaigns.push(record.clone());
            inserted.push(record);
        }
        Ok(inserted)
    }

    fn list_campaigns(&self, client_id: u64) -> Result<Vec<CampaignRecord>> {
        let tables = self.lock()?;
        Ok(tables
            .campaigns
            .iter()
            .filter(|c| c.client_id == client_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(email: &str) -> NewParent {
        NewParent {
            name: "Tommy".to_string(),
            email: email.to_string(),
            start_date: None,
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let store = MemoryStore::new();
        let a = store.insert_student(&parent("a@example.com")).unwrap().record;
        let b = store.insert_client(&parent("b@example.com")).unwrap().record;
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_insert_same_email_returns_existing_row() {
        let store = MemoryStore::new();
        let first = store.insert_student(&parent("a@example.com")).unwrap();
        let second = store.insert_student(&parent("a@example.com")).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.record.id, second.record.id);
        assert_eq!(store.student_count().unwrap(), 1);
    }

    #[test]
    fn test_orphan_batch_inserts_nothing() {
        let store = MemoryStore::new();
        let student = store.insert_student(&parent("a@example.com")).unwrap().record;
        let batch = vec![
            NewSubject {
                student_id: student.id,
                name: "Math".to_string(),
                school_mark: 1,
                exam_mark: 2,
                average: 1.5,
            },
            NewSubject {
                student_id: 999,
                name: "Ghost".to_string(),
                school_mark: 1,
                exam_mark: 2,
                average: 1.5,
            },
        ];
        assert!(store.insert_subjects(&batch).is_err());
        assert!(store.list_subjects(student.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_summary() {
        let store = MemoryStore::new();
        let client = store.insert_client(&parent("ops@acme.test")).unwrap().record;
        store.update_client_summary(client.id, "first").unwrap();
        store.update_client_summary(client.id, "second").unwrap();
        let found = store.find_clients_by_email("ops@acme.test").unwrap();
        assert_eq!(found[0].summary.as_deref(), Some("second"));
        assert!(store.update_client_summary(42, "nope").is_err());
    }
}
