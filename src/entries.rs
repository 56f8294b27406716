//! Entry commands: `kb record`, `kb update`, `kb get`, `kb list`, `kb delete`.
//!
//! Thin CLI wrappers around [`crate::store`]. None of them touch the index;
//! changes become searchable after the next `kb build`.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{EntryUpdate, KnowledgeEntry, NewEntry};
use crate::reconstruct::{format_ts_iso, reconstruct};
use crate::{db, migrate, store};

async fn open(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(pool)
}

pub async fn run_record(config: &Config, new: &NewEntry) -> Result<()> {
    let pool = open(config).await?;
    let id = store::record_experience(&pool, new).await;
    pool.close().await;
    let id = id?;

    println!("✅ Experience recorded successfully: '{}'", new.intent.trim());
    println!("  id: {}", id);
    Ok(())
}

pub async fn run_update(config: &Config, id: &str, update: &EntryUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(Error::InvalidEntry(
            "nothing to update: pass at least one field flag".into(),
        ));
    }

    let pool = open(config).await?;
    let entry = store::update_entry(&pool, id, update).await;
    pool.close().await;
    let entry = entry?;

    println!("Updated entry {}", entry.id);
    println!("  updated_at: {}", format_ts_iso(entry.updated_at));
    Ok(())
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = open(config).await?;
    let entry = store::get_entry(&pool, id).await;
    pool.close().await;
    let entry = entry?.ok_or_else(|| Error::EntryNotFound(id.to_string()))?;

    print_entry(&entry);
    Ok(())
}

fn print_entry(entry: &KnowledgeEntry) {
    println!("--- Entry ---");
    println!("id:           {}", entry.id);
    println!("intent:       {}", entry.intent);
    if !entry.tags.is_empty() {
        println!("tags:         {}", entry.tags);
    }
    if !entry.contributor.is_empty() {
        println!("contributor:  {}", entry.contributor);
    }
    println!("created_at:   {}", format_ts_iso(entry.created_at));
    println!("updated_at:   {}", format_ts_iso(entry.updated_at));
    println!();
    print!("{}", reconstruct(entry));
}

pub async fn run_list(config: &Config) -> Result<()> {
    let pool = open(config).await?;
    let entries = store::list_all(&pool).await;
    pool.close().await;
    let entries = entries?;

    if entries.is_empty() {
        println!("No entries.");
        return Ok(());
    }

    println!("{:<36}  {:<20}  {}", "ID", "UPDATED", "INTENT");
    println!("{}", "-".repeat(80));
    for entry in &entries {
        println!(
            "{:<36}  {:<20}  {}",
            entry.id,
            format_ts_iso(entry.updated_at),
            entry.intent
        );
    }
    println!();
    println!("{} entries", entries.len());
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let pool = open(config).await?;
    let deleted = store::delete_entry(&pool, id).await;
    pool.close().await;

    if !deleted? {
        return Err(Error::EntryNotFound(id.to_string()));
    }
    println!("Deleted entry {}", id);
    println!("  run `kb build` to remove it from the index");
    Ok(())
}
