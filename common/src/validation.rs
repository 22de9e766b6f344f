//! Whole-form validation and normalization.

use crate::{
    CampaignForm, ClientForm, MAX_COUNT, MAX_EMAIL_LEN, MAX_ITEMS, MAX_MARK, MAX_NAME_LEN,
    StudentForm, SubjectForm,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// One problem with one field of a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// Every problem found in a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let joined = self
            .issues
            .iter()
            .map(|issue| format!("{}: {}", issue.field, issue.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

impl std::error::Error for ValidationError {}

#[derive(Default)]
struct Issues(Vec<FieldIssue>);

impl Issues {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError { issues: self.0 })
        }
    }
}

/// Trim and lower-case an email so it can be used as a lookup key.
#[must_use]
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A deliberately loose shape check: `local@domain.tld`, no spaces.
#[must_use]
pub fn is_valid_email(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_EMAIL_LEN || value.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Normalize and check an email used as a natural key.
///
/// # Errors
/// Returns a `ValidationError` naming the `email` field if the address is malformed.
pub fn validate_email(value: &str) -> Result<String, ValidationError> {
    let mut issues = Issues::default();
    let email = check_email(&mut issues, value);
    issues.finish(email)
}

fn check_email(issues: &mut Issues, value: &str) -> String {
    let email = normalize_email(value);
    if email.is_empty() {
        issues.push("email", "is required");
    } else if !is_valid_email(&email) {
        issues.push("email", "is not a valid email address");
    }
    email
}

fn check_name(issues: &mut Issues, field: &str, value: &str) -> String {
    let name = value.trim().to_string();
    if name.is_empty() {
        issues.push(field, "is required");
    } else if name.chars().count() > MAX_NAME_LEN {
        issues.push(field, format!("must be at most {MAX_NAME_LEN} characters"));
    }
    name
}

fn check_item_count(issues: &mut Issues, field: &str, count: usize) {
    if count == 0 {
        issues.push(field, "must contain at least one entry");
    } else if count > MAX_ITEMS {
        issues.push(field, format!("must contain at most {MAX_ITEMS} entries"));
    }
}

fn check_subject(issues: &mut Issues, index: usize, subject: &SubjectForm) -> SubjectForm {
    let prefix = format!("subjects[{index}]");
    let name = check_name(issues, &format!("{prefix}.name"), &subject.name);
    for (field, mark) in [
        ("school_mark", subject.school_mark),
        ("exam_mark", subject.exam_mark),
    ] {
        if mark > MAX_MARK {
            issues.push(
                format!("{prefix}.{field}"),
                format!("must be between 0 and {MAX_MARK}"),
            );
        }
    }
    SubjectForm {
        name,
        school_mark: subject.school_mark,
        exam_mark: subject.exam_mark,
    }
}

fn check_campaign(issues: &mut Issues, index: usize, campaign: &CampaignForm) -> CampaignForm {
    let prefix = format!("campaigns[{index}]");
    let campaign_name = check_name(
        issues,
        &format!("{prefix}.campaign_name"),
        &campaign.campaign_name,
    );
    let channel = check_name(issues, &format!("{prefix}.channel"), &campaign.channel);
    if !campaign.spend.is_finite() || campaign.spend < 0.0 {
        issues.push(
            format!("{prefix}.spend"),
            "must be a non-negative number",
        );
    }
    for (field, count) in [
        ("mql_target", campaign.mql_target),
        ("actual_mqls", campaign.actual_mqls),
    ] {
        if count > MAX_COUNT {
            issues.push(
                format!("{prefix}.{field}"),
                format!("must be at most {MAX_COUNT}"),
            );
        }
    }
    CampaignForm {
        campaign_name,
        channel,
        spend: campaign.spend,
        mql_target: campaign.mql_target,
        actual_mqls: campaign.actual_mqls,
    }
}

/// Validate a student form as a whole and return its normalized copy.
///
/// # Errors
/// Returns every issue found in the form.
pub fn validate_student_form(form: &StudentForm) -> Result<StudentForm, ValidationError> {
    let mut issues = Issues::default();
    let name = check_name(&mut issues, "name", &form.name);
    let email = check_email(&mut issues, &form.email);
    check_item_count(&mut issues, "subjects", form.subjects.len());

    let mut seen = HashSet::new();
    let mut subjects = Vec::with_capacity(form.subjects.len());
    for (index, subject) in form.subjects.iter().enumerate() {
        let subject = check_subject(&mut issues, index, subject);
        if !subject.name.is_empty() && !seen.insert(subject.name.to_lowercase()) {
            issues.push(
                format!("subjects[{index}].name"),
                format!("duplicates an earlier subject '{}'", subject.name),
            );
        }
        subjects.push(subject);
    }

    issues.finish(StudentForm {
        name,
        email,
        start_date: form.start_date,
        subjects,
    })
}

/// Validate a client form as a whole and return its normalized copy.
///
/// # Errors
/// Returns every issue found in the form.
pub fn validate_client_form(form: &ClientForm) -> Result<ClientForm, ValidationError> {
    let mut issues = Issues::default();
    let name = check_name(&mut issues, "name", &form.name);
    let email = check_email(&mut issues, &form.email);
    check_item_count(&mut issues, "campaigns", form.campaigns.len());

    let campaigns = form
        .campaigns
        .iter()
        .enumerate()
        .map(|(index, campaign)| check_campaign(&mut issues, index, campaign))
        .collect();

    issues.finish(ClientForm {
        name,
        email,
        start_date: form.start_date,
        campaigns,
    })
}
