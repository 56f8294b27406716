//! JSONL import and export of knowledge entries.
//!
//! One JSON object per line, carrying every column of `knowledge_entries`.
//! Export writes all entries in creation order; import upserts by id, so
//! re-importing an export is a no-op and ids survive a round trip between
//! machines. Lines without an `id` get a fresh one, and missing timestamps
//! default to the time of import. An import is a single transaction: a bad
//! line or a failed write leaves the store as it was.

use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::KnowledgeEntry;
use crate::{db, migrate, store};

#[derive(Debug, Deserialize)]
struct ImportRecord {
    #[serde(default)]
    id: Option<String>,
    intent: String,
    #[serde(default)]
    problem_context: String,
    #[serde(default)]
    root_cause: String,
    #[serde(default)]
    solution_steps: String,
    #[serde(default)]
    evidence: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    contributor: String,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    updated_at: Option<i64>,
}

impl ImportRecord {
    fn into_entry(self, now: i64) -> KnowledgeEntry {
        let created_at = self.created_at.unwrap_or(now);
        KnowledgeEntry {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            intent: self.intent,
            problem_context: self.problem_context,
            root_cause: self.root_cause,
            solution_steps: self.solution_steps,
            evidence: self.evidence,
            tags: self.tags,
            contributor: self.contributor,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}

/// Parse a JSONL stream into entries. Blank lines are skipped; a malformed
/// line fails the whole import with its line number.
pub fn parse_jsonl(reader: impl BufRead) -> Result<Vec<KnowledgeEntry>> {
    let now = chrono::Utc::now().timestamp();
    let mut entries = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ImportRecord = serde_json::from_str(&line).map_err(|e| {
            Error::InvalidEntry(format!("line {}: {}", lineno + 1, e))
        })?;
        if record.intent.trim().is_empty() {
            return Err(Error::InvalidEntry(format!(
                "line {}: intent must not be empty",
                lineno + 1
            )));
        }
        entries.push(record.into_entry(now));
    }

    Ok(entries)
}

pub fn write_jsonl(mut writer: impl Write, entries: &[KnowledgeEntry]) -> Result<()> {
    for entry in entries {
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Export all entries as JSONL to `output`, or to stdout when `None`.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let entries = store::list_all(&pool).await;
    pool.close().await;
    let entries = entries?;

    match output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            write_jsonl(std::io::BufWriter::new(file), &entries)?;
            eprintln!("Exported {} entries to {}", entries.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            write_jsonl(stdout.lock(), &entries)?;
        }
    }
    Ok(())
}

/// Import entries from a JSONL file, upserting by id.
pub async fn run_import(config: &Config, input: &Path) -> Result<()> {
    let file = std::fs::File::open(input)?;
    let entries = parse_jsonl(BufReader::new(file))?;

    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let result = store::import_entries(&pool, &entries).await;
    pool.close().await;
    let imported = result?;

    info!(imported, path = %input.display(), "import complete");
    println!("Imported {} entries from {}", imported, input.display());
    println!("  run `kb build` to index them");
    Ok(())
}
