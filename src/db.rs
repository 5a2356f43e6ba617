use std::collections::BTreeSet;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{
    ActivityRecord, AttendanceEntry, AttendanceRecord, AttendanceStatus, EvaluationRecord,
    FollowState, Responsibility, RosterEntry, RosterFilter, StoredEvaluation, SubmissionEntry,
};
use crate::store::{ActivityStore, AttendanceStore, ClassDirectory, EvaluationStore, FollowStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    let students = vec![
        ("stu-avery", "Avery Lee", "avery.lee@example.edu"),
        ("stu-jules", "Jules Moreno", "jules.moreno@example.edu"),
        ("stu-kiara", "Kiara Patel", "kiara.patel@example.edu"),
        ("stu-noor", "Noor Haddad", "noor.haddad@example.edu"),
    ];

    for (id, name, email) in students {
        sqlx::query(
            r#"
            INSERT INTO engagement.students (id, full_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, email = EXCLUDED.email
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let classes = vec![
        ("cls-algebra", "Algebra II", "tch-rivera"),
        ("cls-chem", "Chemistry", "tch-okafor"),
    ];

    for (id, name, teacher_id) in classes {
        sqlx::query(
            r#"
            INSERT INTO engagement.classes (id, name, teacher_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, teacher_id = EXCLUDED.teacher_id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(teacher_id)
        .execute(pool)
        .await?;
    }

    let members = vec![
        ("cls-algebra", "stu-avery"),
        ("cls-algebra", "stu-jules"),
        ("cls-algebra", "stu-kiara"),
        ("cls-chem", "stu-kiara"),
        ("cls-chem", "stu-noor"),
    ];

    for (class_id, student_id) in members {
        sqlx::query(
            r#"
            INSERT INTO engagement.class_members (class_id, student_id)
            VALUES ($1, $2)
            ON CONFLICT (class_id, student_id) DO NOTHING
            "#,
        )
        .bind(class_id)
        .bind(student_id)
        .execute(pool)
        .await?;
    }

    let submissions = vec![
        ("stu-avery", 1, Some("https://drive.example.edu/avery-q1")),
        ("stu-avery", 3, Some("https://drive.example.edu/avery-q2")),
        ("stu-jules", 10, Some("https://drive.example.edu/jules-q1")),
        ("stu-noor", 2, Some("   ")),
    ];

    for (question, (student_id, days_ago, link)) in submissions.into_iter().enumerate() {
        let entry = SubmissionEntry {
            submission_type: "homework".to_string(),
            question_number: question as i32 + 1,
            link: link.map(str::to_string),
            feedback: None,
        };
        upsert_submission(pool, student_id, today - Duration::days(days_ago), entry).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO engagement.support_classes (id, name, teacher_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind("sup-algebra")
    .bind("Algebra Support")
    .bind("tch-rivera")
    .execute(pool)
    .await?;

    let sessions = [
        (14, AttendanceStatus::Present),
        (7, AttendanceStatus::Late),
        (0, AttendanceStatus::Absent),
    ];

    for (days_ago, status) in sessions {
        let entries = vec![AttendanceEntry {
            student_id: "stu-jules".to_string(),
            status,
        }];
        sqlx::query(
            r#"
            INSERT INTO engagement.attendance_records (class_id, session_date, entries)
            VALUES ($1, $2, $3)
            ON CONFLICT (class_id, session_date) DO UPDATE
            SET entries = EXCLUDED.entries
            "#,
        )
        .bind("sup-algebra")
        .bind(today - Duration::days(days_ago))
        .bind(Json(entries))
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn upsert_submission(
    pool: &PgPool,
    student_id: &str,
    date: NaiveDate,
    entry: SubmissionEntry,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO engagement.activity_records (student_id, record_date, submissions)
        VALUES ($1, $2, $3)
        ON CONFLICT (student_id, record_date) DO UPDATE
        SET submissions = engagement.activity_records.submissions || EXCLUDED.submissions
        "#,
    )
    .bind(student_id)
    .bind(date)
    .bind(Json(vec![entry]))
    .execute(pool)
    .await
    .with_context(|| format!("failed to record submission for {student_id} on {date}"))?;
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        date: NaiveDate,
        #[serde(rename = "type")]
        submission_type: String,
        question_number: i32,
        link: Option<String>,
        feedback: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let entry = SubmissionEntry {
            submission_type: row.submission_type,
            question_number: row.question_number,
            link: row.link,
            feedback: row.feedback,
        };
        upsert_submission(pool, &row.student_id, row.date, entry).await?;
        imported += 1;
    }

    Ok(imported)
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn activity_from_row(row: &PgRow) -> Result<ActivityRecord> {
    let submissions: Json<Vec<SubmissionEntry>> = row.try_get("submissions")?;
    Ok(ActivityRecord {
        student_id: row.try_get("student_id")?,
        date: row.try_get("record_date")?,
        submissions: submissions.0,
    })
}

fn evaluation_from_row(row: &PgRow) -> Result<StoredEvaluation> {
    let responsibility: String = row.try_get("responsibility")?;
    let responsibility = Responsibility::parse(&responsibility).ok_or_else(|| {
        EngineError::SourceUnavailable(format!("unexpected responsibility value {responsibility}"))
    })?;

    Ok(StoredEvaluation {
        id: row.try_get("id")?,
        record: EvaluationRecord {
            student_id: row.try_get("student_id")?,
            support_class_id: row.try_get("support_class_id")?,
            date: row.try_get("evaluation_date")?,
            attendance_rate: row.try_get("attendance_rate")?,
            homework_completion_rate: row.try_get("homework_completion_rate")?,
            progress_improved: row.try_get("progress_improved")?,
            responsibility,
            notes: row.try_get("notes")?,
        },
    })
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn fetch_activity_records(&self, student_id: &str) -> Result<Vec<ActivityRecord>> {
        let exists = sqlx::query("SELECT 1 FROM engagement.students WHERE id = $1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(EngineError::NotFound(format!("student {student_id}")));
        }

        let rows = sqlx::query(
            "SELECT student_id, record_date, submissions \
             FROM engagement.activity_records \
             WHERE student_id = $1 \
             ORDER BY record_date",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(activity_from_row).collect()
    }

    async fn fetch_activity_since(
        &self,
        student_ids: &[String],
        since: NaiveDate,
    ) -> Result<Vec<ActivityRecord>> {
        // Postgres dates stop at 4713 BC; earlier bounds mean all history.
        let since = NaiveDate::from_ymd_opt(1, 1, 1).map_or(since, |floor| since.max(floor));
        let rows = sqlx::query(
            "SELECT student_id, record_date, submissions \
             FROM engagement.activity_records \
             WHERE student_id = ANY($1) AND record_date >= $2 \
             ORDER BY record_date DESC",
        )
        .bind(student_ids)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        debug!("Window query since {} returned {} records", since, rows.len());
        rows.iter().map(activity_from_row).collect()
    }
}

#[async_trait]
impl ClassDirectory for PgStore {
    async fn fetch_class_roster(&self, filter: &RosterFilter) -> Result<Vec<RosterEntry>> {
        let mut query = String::from(
            "SELECT s.id AS student_id, s.full_name, s.email, \
             c.id AS class_id, c.name AS class_name, c.teacher_id \
             FROM engagement.class_members m \
             JOIN engagement.students s ON s.id = m.student_id \
             JOIN engagement.classes c ON c.id = m.class_id \
             WHERE TRUE",
        );
        let mut binds: Vec<&str> = Vec::new();

        if let Some(teacher_id) = filter.teacher_id.as_deref() {
            binds.push(teacher_id);
            query.push_str(&format!(" AND c.teacher_id = ${}", binds.len()));
        }
        if let Some(class_id) = filter.class_id.as_deref() {
            binds.push(class_id);
            query.push_str(&format!(" AND c.id = ${}", binds.len()));
        }
        query.push_str(" ORDER BY c.name, m.position");

        let mut rows = sqlx::query(&query);
        for value in binds {
            rows = rows.bind(value);
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut roster = Vec::with_capacity(records.len());

        for row in records {
            roster.push(RosterEntry {
                student_id: row.try_get("student_id")?,
                student_name: row.try_get("full_name")?,
                student_email: row.try_get("email")?,
                class_id: row.try_get("class_id")?,
                class_name: row.try_get("class_name")?,
                teacher_id: row.try_get("teacher_id")?,
            });
        }

        Ok(roster)
    }
}

#[async_trait]
impl FollowStore for PgStore {
    async fn get_follow_state(&self, user_id: &str) -> Result<FollowState> {
        let row = sqlx::query(
            "SELECT following_student_ids, missing_homework_follow_initialized \
             FROM engagement.follow_states WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(FollowState::default());
        };

        let ids: Vec<String> = row.try_get("following_student_ids")?;
        Ok(FollowState {
            following_student_ids: ids.into_iter().collect(),
            missing_homework_follow_initialized: row
                .try_get("missing_homework_follow_initialized")?,
        })
    }

    async fn initialize_follow(
        &self,
        user_id: &str,
        candidates: &BTreeSet<String>,
    ) -> Result<bool> {
        let ids: Vec<&str> = candidates.iter().map(String::as_str).collect();
        // Flag check and seed happen in the same statement.
        let seeded = sqlx::query(
            r#"
            INSERT INTO engagement.follow_states
            (user_id, following_student_ids, missing_homework_follow_initialized)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (user_id) DO UPDATE
            SET following_student_ids = EXCLUDED.following_student_ids,
                missing_homework_follow_initialized = TRUE
            WHERE engagement.follow_states.missing_homework_follow_initialized = FALSE
            RETURNING user_id
            "#,
        )
        .bind(user_id)
        .bind(&ids[..])
        .fetch_optional(&self.pool)
        .await?;

        Ok(seeded.is_some())
    }

    async fn set_following(&self, user_id: &str, student_id: &str, following: bool) -> Result<()> {
        if following {
            sqlx::query(
                r#"
                INSERT INTO engagement.follow_states (user_id, following_student_ids)
                VALUES ($1, ARRAY[$2::TEXT])
                ON CONFLICT (user_id) DO UPDATE
                SET following_student_ids = CASE
                    WHEN $2::TEXT = ANY(engagement.follow_states.following_student_ids)
                        THEN engagement.follow_states.following_student_ids
                    ELSE array_append(engagement.follow_states.following_student_ids, $2::TEXT)
                END
                "#,
            )
            .bind(user_id)
            .bind(student_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE engagement.follow_states
                SET following_student_ids = array_remove(following_student_ids, $2::TEXT)
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .bind(student_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn fetch_attendance_records(
        &self,
        support_class_id: &str,
    ) -> Result<Vec<AttendanceRecord>> {
        let exists = sqlx::query("SELECT 1 FROM engagement.support_classes WHERE id = $1")
            .bind(support_class_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(EngineError::NotFound(format!(
                "support class {support_class_id}"
            )));
        }

        let rows = sqlx::query(
            "SELECT class_id, session_date, entries \
             FROM engagement.attendance_records \
             WHERE class_id = $1 \
             ORDER BY session_date",
        )
        .bind(support_class_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let entries: Json<Vec<AttendanceEntry>> = row.try_get("entries")?;
            records.push(AttendanceRecord {
                class_id: row.try_get("class_id")?,
                date: row.try_get("session_date")?,
                entries: entries.0,
            });
        }

        Ok(records)
    }
}

#[async_trait]
impl EvaluationStore for PgStore {
    async fn persist_evaluation(&self, record: &EvaluationRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO engagement.evaluations
            (id, student_id, support_class_id, evaluation_date, attendance_rate,
             homework_completion_rate, progress_improved, responsibility, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(&record.student_id)
        .bind(&record.support_class_id)
        .bind(record.date)
        .bind(record.attendance_rate)
        .bind(record.homework_completion_rate)
        .bind(record.progress_improved)
        .bind(record.responsibility.as_str())
        .bind(record.notes.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_evaluation_notes(&self, id: Uuid, notes: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE engagement.evaluations SET notes = $2 WHERE id = $1")
            .bind(id)
            .bind(notes)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("evaluation {id}")));
        }
        Ok(())
    }

    async fn list_evaluations(&self, student_id: &str) -> Result<Vec<StoredEvaluation>> {
        let rows = sqlx::query(
            "SELECT id, student_id, support_class_id, evaluation_date, attendance_rate, \
             homework_completion_rate, progress_improved, responsibility, notes \
             FROM engagement.evaluations \
             WHERE student_id = $1 \
             ORDER BY created_at DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(evaluation_from_row).collect()
    }
}
