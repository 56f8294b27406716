//! Entry store: durable CRUD for [`KnowledgeEntry`] rows.
//!
//! All writes run in a transaction. A write that fails returns the error to
//! the caller and leaves the table untouched; the transaction is rolled back
//! when it is dropped without a commit. Nothing here triggers an index build.

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{EntryUpdate, KnowledgeEntry, NewEntry};

const SELECT_COLUMNS: &str = "SELECT id, intent, problem_context, root_cause, solution_steps, \
     evidence, tags, contributor, created_at, updated_at FROM knowledge_entries";

fn row_to_entry(row: &SqliteRow) -> KnowledgeEntry {
    KnowledgeEntry {
        id: row.get("id"),
        intent: row.get("intent"),
        problem_context: row.get("problem_context"),
        root_cause: row.get("root_cause"),
        solution_steps: row.get("solution_steps"),
        evidence: row.get("evidence"),
        tags: row.get("tags"),
        contributor: row.get("contributor"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn validate_intent(intent: &str) -> Result<()> {
    if intent.trim().is_empty() {
        return Err(Error::InvalidEntry("intent must not be empty".into()));
    }
    Ok(())
}

/// Write a new experience entry and return its generated id.
pub async fn record_experience(pool: &SqlitePool, new: &NewEntry) -> Result<String> {
    validate_intent(&new.intent)?;

    let now = chrono::Utc::now().timestamp();
    let entry = KnowledgeEntry {
        id: Uuid::new_v4().to_string(),
        intent: new.intent.trim().to_string(),
        problem_context: new.problem_context.clone(),
        root_cause: new.root_cause.clone(),
        solution_steps: new.solution_steps.clone(),
        evidence: new.evidence.clone(),
        tags: new.tags.clone(),
        contributor: new.contributor.clone(),
        created_at: now,
        updated_at: now,
    };

    insert_entry(pool, &entry).await?;
    debug!(id = %entry.id, intent = %entry.intent, "recorded entry");
    Ok(entry.id)
}

/// Insert a fully-formed entry. Fails if the id already exists.
pub async fn insert_entry(pool: &SqlitePool, entry: &KnowledgeEntry) -> Result<()> {
    validate_intent(&entry.intent)?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO knowledge_entries
            (id, intent, problem_context, root_cause, solution_steps, evidence, tags, contributor, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.intent)
    .bind(&entry.problem_context)
    .bind(&entry.root_cause)
    .bind(&entry.solution_steps)
    .bind(&entry.evidence)
    .bind(&entry.tags)
    .bind(&entry.contributor)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(())
}

async fn upsert_on(conn: &mut SqliteConnection, entry: &KnowledgeEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO knowledge_entries
            (id, intent, problem_context, root_cause, solution_steps, evidence, tags, contributor, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            intent = excluded.intent,
            problem_context = excluded.problem_context,
            root_cause = excluded.root_cause,
            solution_steps = excluded.solution_steps,
            evidence = excluded.evidence,
            tags = excluded.tags,
            contributor = excluded.contributor,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.intent)
    .bind(&entry.problem_context)
    .bind(&entry.root_cause)
    .bind(&entry.solution_steps)
    .bind(&entry.evidence)
    .bind(&entry.tags)
    .bind(&entry.contributor)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert or replace an entry by id, keeping the supplied id and timestamps.
pub async fn upsert_entry(pool: &SqlitePool, entry: &KnowledgeEntry) -> Result<()> {
    validate_intent(&entry.intent)?;

    let mut tx = pool.begin().await?;
    upsert_on(&mut *tx, entry).await?;
    tx.commit().await?;
    Ok(())
}

/// Upsert a batch of entries as one transaction: either every entry is
/// written or, on any failure, none is.
pub async fn import_entries(pool: &SqlitePool, entries: &[KnowledgeEntry]) -> Result<usize> {
    for entry in entries {
        validate_intent(&entry.intent)
            .map_err(|e| Error::InvalidEntry(format!("entry {}: {}", entry.id, e)))?;
    }

    let mut tx = pool.begin().await?;
    for entry in entries {
        upsert_on(&mut *tx, entry).await?;
    }
    tx.commit().await?;

    debug!(count = entries.len(), "imported entries");
    Ok(entries.len())
}

/// Apply a partial update and return the stored result.
///
/// `updated_at` always moves forward, even for two updates within the same
/// second. The id never changes.
pub async fn update_entry(
    pool: &SqlitePool,
    id: &str,
    update: &EntryUpdate,
) -> Result<KnowledgeEntry> {
    if let Some(intent) = &update.intent {
        validate_intent(intent)?;
    }

    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let mut entry = match row {
        Some(row) => row_to_entry(&row),
        None => return Err(Error::EntryNotFound(id.to_string())),
    };

    fn apply(slot: &mut String, value: &Option<String>) {
        if let Some(v) = value {
            *slot = v.clone();
        }
    }
    apply(&mut entry.intent, &update.intent);
    apply(&mut entry.problem_context, &update.problem_context);
    apply(&mut entry.root_cause, &update.root_cause);
    apply(&mut entry.solution_steps, &update.solution_steps);
    apply(&mut entry.evidence, &update.evidence);
    apply(&mut entry.tags, &update.tags);
    apply(&mut entry.contributor, &update.contributor);
    entry.updated_at = chrono::Utc::now().timestamp().max(entry.updated_at + 1);

    sqlx::query(
        r#"
        UPDATE knowledge_entries SET
            intent = ?, problem_context = ?, root_cause = ?, solution_steps = ?,
            evidence = ?, tags = ?, contributor = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&entry.intent)
    .bind(&entry.problem_context)
    .bind(&entry.root_cause)
    .bind(&entry.solution_steps)
    .bind(&entry.evidence)
    .bind(&entry.tags)
    .bind(&entry.contributor)
    .bind(entry.updated_at)
    .bind(&entry.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    debug!(id = %entry.id, "updated entry");
    Ok(entry)
}

pub async fn get_entry(pool: &SqlitePool, id: &str) -> Result<Option<KnowledgeEntry>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_entry))
}

/// Full scan in creation order. Used by every index build.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<KnowledgeEntry>> {
    let rows = sqlx::query(&format!("{} ORDER BY created_at ASC, id ASC", SELECT_COLUMNS))
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_entry).collect())
}

/// Delete an entry. Returns `false` if no such id existed.
pub async fn delete_entry(pool: &SqlitePool, id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query("DELETE FROM knowledge_entries WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_entries(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_entries")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
