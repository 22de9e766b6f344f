//! Resolve-or-create parents by their natural key, then attach dependent rows.

use crate::store::RecordStore;
use crate::{
    CampaignForm, CampaignRecord, ClientRecord, NewCampaign, NewParent, NewSubject,
    StudentRecord, SubjectForm, SubjectMarks, SubjectRecord,
};
use anyhow::{Context, Result};
use log::{debug, info, warn};

/// A parent row and whether this call created it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub record: T,
    pub created: bool,
}

/// Anything with a store-assigned id.
pub trait Identified {
    fn id(&self) -> u64;
}

impl Identified for StudentRecord {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Identified for ClientRecord {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Pick the row to use out of everything the lookup matched.
/// More than one match means an earlier race created duplicates; the oldest row wins.
pub fn pick_existing<T: Identified>(kind: &str, key: &str, mut matches: Vec<T>) -> Option<T> {
    if matches.len() > 1 {
        warn!(
            "Found {} {kind} rows for {key}, using the lowest id",
            matches.len()
        );
    }
    matches.sort_by_key(|m| m.id());
    matches.into_iter().next()
}

/// Look the key up; if nothing matches, create the row.
///
/// `create` reports whether it inserted a row or found one written by a concurrent
/// request, and that flag is passed through.
///
/// # Errors
/// Returns the first error from either store call. Nothing is retried.
pub fn resolve_or_create<T, F, C>(kind: &str, key: &str, find: F, create: C) -> Result<Resolved<T>>
where
    T: Identified,
    F: FnOnce() -> Result<Vec<T>>,
    C: FnOnce() -> Result<Resolved<T>>,
{
    let matches = find().with_context(|| format!("Failed to look up {kind} {key}"))?;
    if let Some(record) = pick_existing(kind, key, matches) {
        debug!("Resolved {kind} {key} to existing #{}", record.id());
        return Ok(Resolved {
            record,
            created: false,
        });
    }

    let resolved = create().with_context(|| format!("Failed to create {kind} {key}"))?;
    if resolved.created {
        info!("Created {kind} #{} for {key}", resolved.record.id());
    } else {
        debug!(
            "Resolved {kind} {key} to #{} written by a concurrent request",
            resolved.record.id()
        );
    }
    Ok(resolved)
}

/// Find the student with this email or create one.
///
/// # Errors
/// Returns an error if the store cannot be reached.
pub fn resolve_student(store: &dyn RecordStore, new: &NewParent) -> Result<Resolved<StudentRecord>> {
    resolve_or_create(
        "student",
        &new.email,
        || store.find_students_by_email(&new.email),
        || store.insert_student(new),
    )
}

/// Find the client with this email or create one.
///
/// # Errors
/// Returns an error if the store cannot be reached.
pub fn resolve_client(store: &dyn RecordStore, new: &NewParent) -> Result<Resolved<ClientRecord>> {
    resolve_or_create(
        "client",
        &new.email,
        || store.find_clients_by_email(&new.email),
        || store.insert_client(new),
    )
}

/// Insert one subject row per form entry, all referencing the student.
///
/// # Errors
/// Returns an error if the batch could not be inserted; no rows from it are kept.
pub fn attach_subjects(
    store: &dyn RecordStore,
    student_id: u64,
    subjects: &[SubjectForm],
) -> Result<Vec<SubjectRecord>> {
    let rows: Vec<NewSubject> = subjects
        .iter()
        .map(|s| NewSubject {
            student_id,
            name: s.name.clone(),
            school_mark: s.school_mark,
            exam_mark: s.exam_mark,
            average: s.average(),
        })
        .collect();

    let inserted = store
        .insert_subjects(&rows)
        .with_context(|| format!("Failed to insert subjects for student #{student_id}"))?;
    debug!("Inserted {} subjects for student #{student_id}", inserted.len());
    Ok(inserted)
}

/// Insert one campaign row per form entry, all referencing the client.
///
/// # Errors
/// Returns an error if the batch could not be inserted; no rows from it are kept.
pub fn attach_campaigns(
    store: &dyn RecordStore,
    client_id: u64,
    campaigns: &[CampaignForm],
) -> Result<Vec<CampaignRecord>> {
    let rows: Vec<NewCampaign> = campaigns
        .iter()
        .map(|c| NewCampaign {
            client_id,
            campaign_name: c.campaign_name.clone(),
            channel: c.channel.clone(),
            spend: c.spend,
            mql_target: c.mql_target,
            actual_mqls: c.actual_mqls,
        })
        .collect();

    let inserted = store
        .insert_campaigns(&rows)
        .with_context(|| format!("Failed to insert campaigns for client #{client_id}"))?;
    debug!("Inserted {} campaigns for client #{client_id}", inserted.len());
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use std::cell::Cell;

    fn tommy() -> NewParent {
        NewParent {
            name: "Tommy".to_string(),
            email: "tommy@example.com".to_string(),
            start_date: None,
        }
    }

    #[test_log::test]
    fn test_resolve_student_is_idempotent() {
        let store = MemoryStore::new();
        let first = resolve_student(&store, &tommy()).unwrap();
        let second = resolve_student(&store, &tommy()).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.record.id, second.record.id);
        assert_eq!(store.student_count().unwrap(), 1);
    }

    #[test_log::test]
    fn test_resolve_client_is_idempotent() {
        let store = MemoryStore::new();
        let mut acme = tommy();
        acme.name = "Acme Corp".to_string();
        acme.email = "ops@acme.test".to_string();

        let first = resolve_client(&store, &acme).unwrap();
        let second = resolve_client(&store, &acme).unwrap();
        assert_eq!(first.record.id, second.record.id);
        assert_eq!(store.client_count().unwrap(), 1);
    }

    #[test_log::test]
    fn test_existing_row_skips_create() {
        let created = Cell::new(false);
        let resolved = resolve_or_create(
            "student",
            "tommy@example.com",
            || {
                Ok(vec![StudentRecord {
                    id: 7,
                    name: "Tommy".to_string(),
                    email: "tommy@example.com".to_string(),
                    start_date: None,
                    summary: None,
                    created_at: chrono::Utc::now(),
                }])
            },
            || {
                created.set(true);
                Err(anyhow!("should not be called"))
            },
        )
        .unwrap();
        assert_eq!(resolved.record.id, 7);
        assert!(!resolved.created);
        assert!(!created.get());
    }

    #[test_log::test]
    fn test_create_that_finds_a_concurrent_row_is_not_created() {
        let store = MemoryStore::new();
        let existing = store.insert_student(&tommy()).unwrap().record;

        // the lookup ran before the other request's insert landed
        let resolved = resolve_or_create(
            "student",
            "tommy@example.com",
            || Ok(Vec::new()),
            || store.insert_student(&tommy()),
        )
        .unwrap();
        assert!(!resolved.created);
        assert_eq!(resolved.record.id, existing.id);
        assert_eq!(store.student_count().unwrap(), 1);
    }

    #[test_log::test]
    fn test_lookup_error_is_reported() {
        let result: Result<Resolved<ClientRecord>> = resolve_or_create(
            "client",
            "ops@acme.test",
            || Err(anyhow!("connection refused")),
            || Err(anyhow!("should not be called")),
        );
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
        assert!(err.to_string().contains("Failed to look up client ops@acme.test"));
    }

    #[test_log::test]
    fn test_pick_existing_prefers_lowest_id() {
        let make = |id| ClientRecord {
            id,
            name: "Acme".to_string(),
            email: "ops@acme.test".to_string(),
            start_date: None,
            summary: None,
            created_at: chrono::Utc::now(),
        };
        let picked = pick_existing("client", "ops@acme.test", vec![make(9), make(3), make(5)]);
        assert_eq!(picked.unwrap().id, 3);
        assert!(pick_existing::<ClientRecord>("client", "x", Vec::new()).is_none());
    }

    #[test]
    fn test_attach_subjects_references_parent() {
        let store = MemoryStore::new();
        let student = resolve_student(&store, &tommy()).unwrap().record;
        let subjects = vec![
            SubjectForm {
                name: "Math".to_string(),
                school_mark: 88,
                exam_mark: 92,
            },
            SubjectForm {
                name: "English".to_string(),
                school_mark: 75,
                exam_mark: 78,
            },
        ];
        let inserted = attach_subjects(&store, student.id, &subjects).unwrap();
        assert_eq!(inserted.len(), 2);
        assert!(inserted.iter().all(|s| s.student_id == student.id));
        assert_eq!(inserted[0].name, "Math");
        assert!((inserted[1].average - 76.5).abs() < f64::EPSILON);
    }
}
