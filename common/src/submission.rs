//! Handle one form submission or lookup end to end.

use crate::metrics;
use crate::resolver::{attach_campaigns, attach_subjects, resolve_client, resolve_student};
use crate::store::RecordStore;
use crate::validation::{self, ValidationError};
use crate::{ClientForm, ClientReport, NewParent, StudentForm, StudentReport};
use anyhow::Context;
use log::info;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid submission: {0}")]
    Invalid(#[from] ValidationError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type SubmitResult<T> = Result<T, SubmitError>;

/// Validate a student form, resolve the student, store the subjects and
/// overwrite the student's summary.
///
/// The report covers the subjects from this submission only.
///
/// # Errors
/// `Invalid` if the form fails validation, `Backend` if any store call fails.
pub fn submit_student(store: &dyn RecordStore, form: &StudentForm) -> SubmitResult<StudentReport> {
    let mut form = validation::validate_student_form(form)?;
    let resolved = resolve_student(
        store,
        &NewParent {
            name: form.name.clone(),
            email: form.email.clone(),
            start_date: form.start_date,
        },
    )?;
    let mut student = resolved.record;

    let subjects = attach_subjects(store, student.id, &form.subjects)?;

    // the stored name is kept on repeat submissions
    form.name.clone_from(&student.name);
    let summary = form.to_string();
    store
        .update_student_summary(student.id, &summary)
        .with_context(|| format!("Failed to update summary for student #{}", student.id))?;
    student.summary = Some(summary);

    let report = metrics::student_report(student, &subjects, resolved.created);
    info!(
        "Stored {} subjects for student #{}, prediction {:?}",
        report.subjects.len(),
        report.student.id,
        report.prediction
    );
    Ok(report)
}

/// Validate a client form, resolve the client, store the campaigns and
/// overwrite the client's summary.
///
/// The report covers the campaigns from this submission only.
///
/// # Errors
/// `Invalid` if the form fails validation, `Backend` if any store call fails.
pub fn submit_client(store: &dyn RecordStore, form: &ClientForm) -> SubmitResult<ClientReport> {
    let mut form = validation::validate_client_form(form)?;
    let resolved = resolve_client(
        store,
        &NewParent {
            name: form.name.clone(),
            email: form.email.clone(),
            start_date: form.start_date,
        },
    )?;
    let mut client = resolved.record;

    let campaigns = attach_campaigns(store, client.id, &form.campaigns)?;

    form.name.clone_from(&client.name);
    let summary = form.to_string();
    store
        .update_client_summary(client.id, &summary)
        .with_context(|| format!("Failed to update summary for client #{}", client.id))?;
    client.summary = Some(summary);

    let report = metrics::client_report(client, &campaigns, resolved.created);
    info!(
        "Stored {} campaigns for client #{}, conversion {:.1}%",
        report.campaigns.len(),
        report.client.id,
        report.conversion_rate
    );
    Ok(report)
}

/// Report over every subject stored for the student with this email.
///
/// # Errors
/// `Invalid` for a malformed email, `NotFound` if no student has it,
/// `Backend` if a store call fails.
pub fn student_report(store: &dyn RecordStore, email: &str) -> SubmitResult<StudentReport> {
    let email = validation::validate_email(email)?;
    let matches = store
        .find_students_by_email(&email)
        .with_context(|| format!("Failed to look up student {email}"))?;
    let student = crate::resolver::pick_existing("student", &email, matches)
        .ok_or_else(|| SubmitError::NotFound(format!("no student with email {email}")))?;
    let subjects = store
        .list_subjects(student.id)
        .with_context(|| format!("Failed to list subjects for student #{}", student.id))?;
    Ok(metrics::student_report(student, &subjects, false))
}

/// Report over every campaign stored for the client with this email.
///
/// # Errors
/// `Invalid` for a malformed email, `NotFound` if no client has it,
/// `Backend` if a store call fails.
pub fn client_report(store: &dyn RecordStore, email: &str) -> SubmitResult<ClientReport> {
    let email = validation::validate_email(email)?;
    let matches = store
        .find_clients_by_email(&email)
        .with_context(|| format!("Failed to look up client {email}"))?;
    let client = crate::resolver::pick_existing("client", &email, matches)
        .ok_or_else(|| SubmitError::NotFound(format!("no client with email {email}")))?;
    let campaigns = store
        .list_campaigns(client.id)
        .with_context(|| format!("Failed to list campaigns for client #{}", client.id))?;
    Ok(metrics::client_report(client, &campaigns, false))
}
