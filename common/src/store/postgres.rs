//! Record store talking to Postgres directly through diesel.

use super::RecordStore;
use crate::conversions::{i32_to_u32, i64_to_u64, u32_to_i32, u64_to_i64};
use crate::resolver::Resolved;
use crate::{
    CampaignRecord, ClientRecord, NewCampaign, NewParent, NewSubject, StudentRecord,
    SubjectRecord,
};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

table! {
    students (id) {
        id -> BigInt,
        name -> Varchar,
        email -> Varchar,
        start_date -> Nullable<Date>,
        summary -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

table! {
    subjects (id) {
        id -> BigInt,
        student_id -> BigInt,
        name -> Varchar,
        school_mark -> Integer,
        exam_mark -> Integer,
        average -> Double,
    }
}

table! {
    clients (id) {
        id -> BigInt,
        name -> Varchar,
        email -> Varchar,
        start_date -> Nullable<Date>,
        summary -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

table! {
    campaigns (id) {
        id -> BigInt,
        client_id -> BigInt,
        campaign_name -> Varchar,
        channel -> Varchar,
        spend -> Double,
        mql_target -> Integer,
        actual_mqls -> Integer,
    }
}

#[derive(Queryable)]
#[diesel(table_name = students)]
struct StudentPrivate {
    id: i64,
    name: String,
    email: String,
    start_date: Option<NaiveDate>,
    summary: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = students)]
struct StudentPrivateNew<'a> {
    name: &'a str,
    email: &'a str,
    start_date: Option<NaiveDate>,
}

#[derive(Queryable)]
#[diesel(table_name = subjects)]
struct SubjectPrivate {
    id: i64,
    student_id: i64,
    name: String,
    school_mark: i32,
    exam_mark: i32,
    average: f64,
}

#[derive(Insertable)]
#[diesel(table_name = subjects)]
struct SubjectPrivateNew<'a> {
    student_id: i64,
    name: &'a str,
    school_mark: i32,
    exam_mark: i32,
    average: f64,
}

#[derive(Queryable)]
#[diesel(table_name = clients)]
struct ClientPrivate {
    id: i64,
    name: String,
    email: String,
    start_date: Option<NaiveDate>,
    summary: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = clients)]
struct ClientPrivateNew<'a> {
    name: &'a str,
    email: &'a str,
    start_date: Option<NaiveDate>,
}

#[derive(Queryable)]
#[diesel(table_name = campaigns)]
struct CampaignPrivate {
    id: i64,
    client_id: i64,
    campaign_name: String,
    channel: String,
    spend: f64,
    mql_target: i32,
    actual_mqls: i32,
}

#[derive(Insertable)]
#[diesel(table_name = campaigns)]
struct CampaignPrivateNew<'a> {
    client_id: i64,
    campaign_name: &'a str,
    channel: &'a str,
    spend: f64,
    mql_target: i32,
    actual_mqls: i32,
}

fn student_to_public(p: StudentPrivate) -> Result<StudentRecord> {
    Ok(StudentRecord {
        id: i64_to_u64(p.id)?,
        name: p.name,
        email: p.email,
        start_date: p.start_date,
        summary: p.summary,
        created_at: p.created_at,
    })
}

fn subject_to_public(p: SubjectPrivate) -> Result<SubjectRecord> {
    Ok(SubjectRecord {
        id: i64_to_u64(p.id)?,
        student_id: i64_to_u64(p.student_id)?,
        name: p.name,
        school_mark: i32_to_u32(p.school_mark)?,
        exam_mark: i32_to_u32(p.exam_mark)?,
        average: p.average,
    })
}

fn client_to_public(p: ClientPrivate) -> Result<ClientRecord> {
    Ok(ClientRecord {
        id: i64_to_u64(p.id)?,
        name: p.name,
        email: p.email,
        start_date: p.start_date,
        summary: p.summary,
        created_at: p.created_at,
    })
}

fn campaign_to_public(p: CampaignPrivate) -> Result<CampaignRecord> {
    Ok(CampaignRecord {
        id: i64_to_u64(p.id)?,
        client_id: i64_to_u64(p.client_id)?,
        campaign_name: p.campaign_name,
        channel: p.channel,
        spend: p.spend,
        mql_target: i32_to_u32(p.mql_target)?,
        actual_mqls: i32_to_u32(p.actual_mqls)?,
    })
}

fn build_subject_row(new: &NewSubject) -> Result<SubjectPrivateNew<'_>> {
    Ok(SubjectPrivateNew {
        student_id: u64_to_i64(new.student_id)?,
        name: &new.name,
        school_mark: u32_to_i32(new.school_mark)?,
        exam_mark: u32_to_i32(new.exam_mark)?,
        average: new.average,
    })
}

fn build_campaign_row(new: &NewCampaign) -> Result<CampaignPrivateNew<'_>> {
    Ok(CampaignPrivateNew {
        client_id: u64_to_i64(new.client_id)?,
        campaign_name: &new.campaign_name,
        channel: &new.channel,
        spend: new.spend,
        mql_target: u32_to_i32(new.mql_target)?,
        actual_mqls: u32_to_i32(new.actual_mqls)?,
    })
}

/// Diesel-backed store over an r2d2 connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a pool against `database_url`. Fails if no connection can be made.
    ///
    /// # Errors
    /// Returns an error if the pool cannot establish its first connections.
    pub fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .context("Failed to create database connection pool")?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PgPooled> {
        self.pool
            .get()
            .context("Failed to get a pooled database connection")
    }
}

impl RecordStore for PgStore {
    fn find_students_by_email(&self, key: &str) -> Result<Vec<StudentRecord>> {
        let mut conn = self.conn()?;
        students::table
            .filter(students::email.eq(key))
            .order(students::id.asc())
            .load::<StudentPrivate>(&mut conn)
            .context("Failed to select students")?
            .into_iter()
            .map(student_to_public)
            .collect()
    }

    fn insert_student(&self, new: &NewParent) -> Result<Resolved<StudentRecord>> {
        let mut conn = self.conn()?;
        let insert_row = StudentPrivateNew {
            name: &new.name,
            email: &new.email,
            start_date: new.start_date,
        };

        let inserted = diesel::insert_into(students::table)
            .values(&insert_row)
            .on_conflict(students::email)
            .do_nothing()
            .get_result::<StudentPrivate>(&mut conn)
            .optional()
            .context("Failed to insert student")?;

        let (row, created) = match inserted {
            Some(row) => (row, true),
            // lost a race with another insert of the same email
            None => (
                students::table
                    .filter(students::email.eq(&new.email))
                    .order(students::id.asc())
                    .first::<StudentPrivate>(&mut conn)
                    .context("Failed to re-read student after insert conflict")?,
                false,
            ),
        };
        Ok(Resolved {
            record: student_to_public(row)?,
            created,
        })
    }

    fn update_student_summary(&self, student_id: u64, text: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let row_id = u64_to_i64(student_id)?;
        let updated = diesel::update(students::table.filter(students::id.eq(row_id)))
            .set(students::summary.eq(text))
            .execute(&mut conn)
            .context("Failed to update student summary")?;
        if updated == 0 {
            return Err(anyhow!("student #{student_id} does not exist"));
        }
        Ok(())
    }

    fn insert_subjects(&self, new_subjects: &[NewSubject]) -> Result<Vec<SubjectRecord>> {
        let insert_rows = new_subjects
            .iter()
            .map(build_subject_row)
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.conn()?;
        let inserted = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(subjects::table)
                    .values(&insert_rows)
                    .get_results::<SubjectPrivate>(conn)
            })
            .context("Failed to insert subjects")?;

        inserted.into_iter().map(subject_to_public).collect()
    }

    fn list_subjects(&self, student_id: u64) -> Result<Vec<SubjectRecord>> {
        let mut conn = self.conn()?;
        let parent_id = u64_to_i64(student_id)?;
        subjects::table
            .filter(subjects::student_id.eq(parent_id))
            .order(subjects::id.asc())
            .load::<SubjectPrivate>(&mut conn)
            .context("Failed to select subjects")?
            .into_iter()
            .map(subject_to_public)
            .collect()
    }

    fn find_clients_by_email(&self, key: &str) -> Result<Vec<ClientRecord>> {
        let mut conn = self.conn()?;
        clients::table
            .filter(clients::email.eq(key))
            .order(clients::id.asc())
            .load::<ClientPrivate>(&mut conn)
            .context("Failed to select clients")?
            .into_iter()
            .map(client_to_public)
            .collect()
    }

    fn insert_client(&self, new: &NewParent) -> Result<Resolved<ClientRecord>> {
        let mut conn = self.conn()?;
        let insert_row = ClientPrivateNew {
            name: &new.name,
            email: &new.email,
            start_date: new.start_date,
        };

        let inserted = diesel::insert_into(clients::table)
            .values(&insert_row)
            .on_conflict(clients::email)
            .do_nothing()
            .get_result::<ClientPrivate>(&mut conn)
            .optional()
            .context("Failed to insert client")?;

        let (row, created) = match inserted {
            Some(row) => (row, true),
            None => (
                clients::table
                    .filter(clients::email.eq(&new.email))
                    .order(clients::id.asc())
                    .first::<ClientPrivate>(&mut conn)
                    .context("Failed to re-read client after insert conflict")?,
                false,
            ),
        };
        Ok(Resolved {
            record: client_to_public(row)?,
            created,
        })
    }

    fn update_client_summary(&self, client_id: u64, text: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let row_id = u64_to_i64(client_id)?;
        let updated = diesel::update(clients::table.filter(clients::id.eq(row_id)))
            .set(clients::summary.eq(text))
            .execute(&mut conn)
            .context("Failed to update client summary")?;
        if updated == 0 {
            return Err(anyhow!("client #{client_id} does not exist"));
        }
        Ok(())
    }

    fn insert_campaigns(&self, new_campaigns: &[NewCampaign]) -> Result<Vec<CampaignRecord>> {
        let insert_rows = new_campaigns
            .iter()
            .map(build_campaign_row)
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.conn()?;
        let inserted = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(campaigns::table)
                    .values(&insert_rows)
                    .get_results::<CampaignPrivate>(conn)
            })
            .context("Failed to insert campaigns")?;

        inserted.into_iter().map(campaign_to_public).collect()
    }

    fn list_campaigns(&self, client_id: u64) -> Result<Vec<CampaignRecord>> {
        let mut conn = self.conn()?;
        let parent_id = u64_to_i64(client_id)?;
        campaigns::table
            .filter(campaigns::client_id.eq(parent_id))
            .order(campaigns::id.asc())
            .load::<CampaignPrivate>(&mut conn)
            .context("Failed to select campaigns")?
            .into_iter()
            .map(campaign_to_public)
            .collect()
    }
}
