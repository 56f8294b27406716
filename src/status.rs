//! Knowledge base status and index reset.
//!
//! `kb status` summarizes the entry store and the last build: how many
//! entries exist, what the manifest says, and whether the index looks stale
//! relative to the store. `kb reset` deletes the persisted index and manifest
//! so the next build starts from scratch; entries are never touched.

use crate::config::Config;
use crate::error::Result;
use crate::manifest::{self, Manifest};
use crate::{db, migrate, storage, store};

/// What `kb reset` removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetReport {
    pub removed_manifest: bool,
    /// Index files and temp leftovers.
    pub removed_files: usize,
}

/// Delete the manifest, then every other file in the storage directory.
///
/// The manifest goes first so a concurrent reader sees "not built" rather
/// than a manifest pointing at a missing index.
pub fn reset_index(config: &Config) -> Result<ResetReport> {
    let removed_manifest = storage::remove_if_exists(&config.index.manifest_path())?;
    let removed_files = storage::remove_unreferenced(&config.index.storage_dir, &[])?;
    Ok(ResetReport {
        removed_manifest,
        removed_files,
    })
}

pub fn run_reset(config: &Config) -> Result<()> {
    let report = reset_index(config)?;

    if !report.removed_manifest && report.removed_files == 0 {
        println!("Nothing to reset: no index in {}", config.index.storage_dir.display());
        return Ok(());
    }
    println!("✅ Index cleared: {}", config.index.storage_dir.display());
    println!("  run `kb build` to rebuild it");
    Ok(())
}

pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let entry_count = store::count_entries(&pool).await;
    let last_update: std::result::Result<Option<i64>, sqlx::Error> =
        sqlx::query_scalar("SELECT MAX(updated_at) FROM knowledge_entries")
            .fetch_one(&pool)
            .await;
    pool.close().await;
    let entry_count = entry_count?;
    let last_update = last_update?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Knowledge Harness Status");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Entries:     {}", entry_count);
    if let Some(ts) = last_update {
        println!(
            "  Last write:  {}",
            crate::reconstruct::format_ts_iso(ts)
        );
    }
    println!();
    println!("  Index dir:   {}", config.index.storage_dir.display());

    match manifest::read(&config.index.manifest_path()) {
        Ok(Some(m)) => {
            let index_size = std::fs::metadata(m.index_path(&config.index.storage_dir))
                .map(|meta| meta.len())
                .ok();
            print_manifest(&m, index_size);
            if m.doc_count as i64 != entry_count || stale_since(&m, last_update) {
                println!("  State:       stale (run `kb build`)");
            } else {
                println!("  State:       up to date");
            }
        }
        Ok(None) => println!("  State:       not built (run `kb build`)"),
        Err(e) => println!("  State:       unreadable manifest ({})", e),
    }
    println!();
    Ok(())
}

fn print_manifest(m: &Manifest, index_size: Option<u64>) {
    println!("  Model:       {}", m.embedding_model);
    println!("  Built:       {} ({})", m.build_time, m.strategy);
    println!("  Documents:   {}", m.doc_count);
    match index_size {
        Some(size) => println!("  Index size:  {}", format_bytes(size)),
        None => println!("  Index size:  missing"),
    }
}

/// True if some entry was written after the manifest's build started.
fn stale_since(m: &Manifest, last_update: Option<i64>) -> bool {
    let built = match chrono::DateTime::parse_from_rfc3339(&m.build_time) {
        Ok(dt) => dt.timestamp(),
        Err(_) => return true,
    };
    last_update.is_some_and(|ts| ts > built)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Strategy;
    use tempfile::TempDir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_stale_since() {
        let mut m = Manifest::new("hash:feature-hash-v1", Strategy::Full, 1, "index.json");
        m.build_time = "2024-01-01T00:00:00.000000000Z".into();
        let built = 1_704_067_200;
        assert!(!stale_since(&m, None));
        assert!(!stale_since(&m, Some(built)));
        assert!(stale_since(&m, Some(built + 1)));
    }

    #[test]
    fn test_reset_index() {
        let tmp = TempDir::new().unwrap();
        let config = Config::from_toml(&format!(
            "[db]\npath = \"{}\"\n\n[index]\nstorage_dir = \"{}\"\n",
            tmp.path().join("kb.sqlite").display(),
            tmp.path().join("index").display()
        ))
        .unwrap();

        let report = reset_index(&config).unwrap();
        assert!(!report.removed_manifest);
        assert_eq!(report.removed_files, 0);

        let dir = &config.index.storage_dir;
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(config.index.manifest_path(), "{}").unwrap();
        std::fs::write(dir.join("index-20240101T000000000000000Z.json"), "{}").unwrap();
        std::fs::write(dir.join("index.json.tmp"), "x").unwrap();

        let report = reset_index(&config).unwrap();
        assert_eq!(
            report,
            ResetReport {
                removed_manifest: true,
                removed_files: 2,
            }
        );
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
    }
}
