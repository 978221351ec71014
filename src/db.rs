use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::warn;

use crate::catalog::ProductKind;
use crate::extract::ComponentDescriptor;
use crate::settings::TargetSpec;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS targets (
            id           INTEGER PRIMARY KEY,
            url          TEXT UNIQUE NOT NULL,
            service_type TEXT NOT NULL,
            descriptor   TEXT NOT NULL,
            visited      BOOLEAN NOT NULL DEFAULT 0,
            visited_at   TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_targets_visited ON targets(visited);

        CREATE TABLE IF NOT EXISTS page_data (
            id         INTEGER PRIMARY KEY,
            target_id  INTEGER NOT NULL REFERENCES targets(id),
            url        TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_target ON page_data(target_id);

        -- Latest extraction per target
        CREATE TABLE IF NOT EXISTS records (
            id           INTEGER PRIMARY KEY,
            target_id    INTEGER UNIQUE NOT NULL REFERENCES targets(id),
            page_data_id INTEGER REFERENCES page_data(id),
            url          TEXT NOT NULL,
            service_type TEXT NOT NULL,
            outcome      TEXT NOT NULL
                         CHECK(outcome IN ('found','not_found','fetch_error','document_error')),
            content      TEXT NOT NULL,
            extracted_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_outcome ON records(outcome);

        -- Catalog products found on listing pages, then filled from the API
        CREATE TABLE IF NOT EXISTS products (
            id           INTEGER PRIMARY KEY,
            product_id   TEXT UNIQUE NOT NULL,
            service_type TEXT NOT NULL,
            kind         TEXT NOT NULL,
            name         TEXT,
            source_url   TEXT NOT NULL,
            details      TEXT,
            error        TEXT,
            fetched      BOOLEAN NOT NULL DEFAULT 0,
            fetched_at   TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_products_fetched ON products(fetched);
        ",
    )?;
    Ok(())
}

// ── Queue ──

pub fn insert_targets(conn: &Connection, targets: &[TargetSpec]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO targets (url, service_type, descriptor) VALUES (?1, ?2, ?3)",
        )?;
        for t in targets {
            let descriptor = serde_json::to_string(&t.component)?;
            count += stmt.execute(rusqlite::params![t.url, t.service_type, descriptor])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct Target {
    pub id: i64,
    pub url: String,
}

/// Queue entries still to fetch. Descriptors stay in the row until processing.
pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<Target>> {
    let sql = format!(
        "SELECT id, url FROM targets WHERE visited = 0 ORDER BY id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let targets = stmt
        .query_map([], |row| {
            Ok(Target {
                id: row.get(0)?,
                url: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(targets)
}

// Latest attempt per target.
const LATEST_ATTEMPT: &str = "pd.id = (SELECT MAX(id) FROM page_data WHERE target_id = pd.target_id)";

/// Put targets whose last attempt failed before extraction back in the queue.
///
/// A record only counts while it was built from the latest attempt; a newer
/// fetch that has not been processed yet speaks for itself.
pub fn requeue_failed(conn: &Connection) -> Result<usize> {
    let sql = format!(
        "UPDATE targets SET visited = 0, visited_at = NULL
         WHERE visited = 1 AND id IN (
             SELECT pd.target_id FROM page_data pd
             LEFT JOIN records r ON r.target_id = pd.target_id AND r.page_data_id = pd.id
             WHERE {}
               AND (pd.error IS NOT NULL
                    OR r.outcome IN ('fetch_error', 'document_error'))
         )",
        LATEST_ATTEMPT
    );
    Ok(conn.execute(&sql, [])?)
}

// ── Fetching ──

pub struct FetchRow {
    pub target_id: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Store one fetch attempt and mark its target visited.
pub fn save_fetch(conn: &Connection, row: &FetchRow) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO page_data (target_id, url, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![row.target_id, row.url, row.html, row.status, row.error, row.latency_ms],
    )?;
    tx.execute(
        "UPDATE targets SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
        rusqlite::params![row.target_id],
    )?;
    tx.commit()?;
    Ok(())
}

// ── Processing ──

pub struct FetchedPage {
    pub page_data_id: i64,
    pub target_id: i64,
    pub url: String,
    pub service_type: String,
    pub descriptor: ComponentDescriptor,
    pub html: Option<String>,
    pub error: Option<String>,
}

/// Latest fetch attempt per target that has no record built from it yet.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<FetchedPage>> {
    let sql = format!(
        "SELECT pd.id, pd.target_id, pd.url, t.service_type, t.descriptor, pd.html, pd.error
         FROM page_data pd
         JOIN targets t ON t.id = pd.target_id
         LEFT JOIN records r ON r.target_id = pd.target_id
         WHERE {}
           AND (r.page_data_id IS NULL OR r.page_data_id < pd.id)
         ORDER BY pd.id{}",
        LATEST_ATTEMPT,
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(page_data_id, target_id, url, service_type, raw, html, error)| -> Result<FetchedPage> {
            let descriptor = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt descriptor for target {}", target_id))?;
            Ok(FetchedPage {
                page_data_id,
                target_id,
                url,
                service_type,
                descriptor,
                html,
                error,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found,
    NotFound,
    FetchError,
    DocumentError,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Found => "found",
            Outcome::NotFound => "not_found",
            Outcome::FetchError => "fetch_error",
            Outcome::DocumentError => "document_error",
        }
    }
}

pub struct RecordRow {
    pub target_id: i64,
    pub page_data_id: Option<i64>,
    pub url: String,
    pub service_type: String,
    pub outcome: Outcome,
    pub content: String,
    pub extracted_at: String,
}

pub fn save_records(conn: &Connection, rows: &[RecordRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO records
             (target_id, page_data_id, url, service_type, outcome, content, extracted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(target_id) DO UPDATE SET
                 page_data_id = excluded.page_data_id,
                 url = excluded.url,
                 service_type = excluded.service_type,
                 outcome = excluded.outcome,
                 content = excluded.content,
                 extracted_at = excluded.extracted_at",
        )?;
        for r in rows {
            stmt.execute(rusqlite::params![
                r.target_id, r.page_data_id, r.url, r.service_type,
                r.outcome.as_str(), r.content, r.extracted_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Stored records in target order, as `(url, service_type, content, extracted_at)`.
pub fn fetch_records(conn: &Connection) -> Result<Vec<(String, String, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT url, service_type, content, extracted_at FROM records ORDER BY target_id",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Catalog ──

pub struct NewProduct {
    pub product_id: String,
    pub service_type: String,
    pub kind: ProductKind,
    pub name: Option<String>,
    pub source_url: String,
}

/// Queue products for a details lookup. Already known ids are left alone.
pub fn insert_products(conn: &Connection, products: &[NewProduct]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO products (product_id, service_type, kind, name, source_url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for p in products {
            count += stmt.execute(rusqlite::params![
                p.product_id, p.service_type, p.kind.as_str(), p.name, p.source_url,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct PendingProduct {
    pub id: i64,
    pub product_id: String,
    pub kind: ProductKind,
}

pub fn fetch_pending_products(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingProduct>> {
    let sql = format!(
        "SELECT id, product_id, kind FROM products WHERE fetched = 0 ORDER BY id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut pending = Vec::with_capacity(rows.len());
    for (id, product_id, kind) in rows {
        match ProductKind::parse(&kind) {
            Some(kind) => pending.push(PendingProduct { id, product_id, kind }),
            None => warn!("Skipping product {}: unknown kind '{}'", product_id, kind),
        }
    }
    Ok(pending)
}

/// Store the outcome of one details lookup. Exactly one of `details` or
/// `error` is expected.
pub fn save_product_details(
    conn: &Connection,
    id: i64,
    details: Option<&str>,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE products SET details = ?2, error = ?3, fetched = 1, fetched_at = datetime('now')
         WHERE id = ?1",
        rusqlite::params![id, details, error],
    )?;
    Ok(())
}

/// Stored details in listing order, as `(product_id, service_type, details)`.
pub fn fetch_product_details(conn: &Connection) -> Result<Vec<(String, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT product_id, service_type, details FROM products
         WHERE details IS NOT NULL ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn requeue_failed_products(conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE products SET fetched = 0, fetched_at = NULL WHERE fetched = 1 AND error IS NOT NULL",
        [],
    )?)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub fetch_errors: usize,
    pub found: usize,
    pub not_found: usize,
    pub document_errors: usize,
    pub products: usize,
    pub product_details: usize,
    pub product_errors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let outcome = |kind: Outcome| -> Result<usize> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM records WHERE outcome = ?1",
            [kind.as_str()],
            |r| r.get(0),
        )?)
    };

    let total = count("SELECT COUNT(*) FROM targets")?;
    let visited = count("SELECT COUNT(*) FROM targets WHERE visited = 1")?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        fetched: count("SELECT COUNT(*) FROM page_data")?,
        fetch_errors: count(&format!(
            "SELECT COUNT(*) FROM page_data pd WHERE {} AND pd.error IS NOT NULL",
            LATEST_ATTEMPT
        ))?,
        found: outcome(Outcome::Found)?,
        not_found: outcome(Outcome::NotFound)?,
        document_errors: outcome(Outcome::DocumentError)?,
        products: count("SELECT COUNT(*) FROM products")?,
        product_details: count("SELECT COUNT(*) FROM products WHERE details IS NOT NULL")?,
        product_errors: count("SELECT COUNT(*) FROM products WHERE error IS NOT NULL")?,
    })
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    }
}
