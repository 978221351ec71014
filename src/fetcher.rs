use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use rusqlite::Connection;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{FetchRow, Target};
use crate::settings::Settings;

/// Page could not be acquired. Kept apart from "page had no state tree".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("blocked by server (HTTP {0})")]
    Blocked(u16),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Body(#[from] serde_json::Error),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            FetchError::Blocked(code) | FetchError::Status(code) => Some(*code),
            FetchError::Body(_) => None,
        }
    }
}

pub struct FetchedHtml {
    pub html: String,
    pub status: u16,
}

/// One client per run. Failing to build it ends the run.
pub fn build_client(settings: &Settings) -> Result<Client> {
    Client::builder()
        .user_agent(&settings.user_agent)
        .timeout(settings.timeout())
        .build()
        .context("Failed to build HTTP client")
}

/// 401/403/429 are how the bank sites turn away automated clients.
pub(crate) fn check_status(status: StatusCode) -> Result<(), FetchError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            Err(FetchError::Blocked(status.as_u16()))
        }
        s => Err(FetchError::Status(s.as_u16())),
    }
}

pub async fn fetch_page(client: &Client, url: &str) -> Result<FetchedHtml, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    check_status(status)?;
    let html = response.text().await?;
    Ok(FetchedHtml {
        html,
        status: status.as_u16(),
    })
}

pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Fetch targets one after another with a fixed pause in between, saving
/// each attempt as soon as it completes. A failed URL never stops the batch.
pub async fn fetch_targets(
    conn: &Connection,
    client: &Client,
    targets: Vec<Target>,
    delay: Duration,
) -> Result<FetchStats> {
    let total = targets.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut ok = 0usize;
    let mut errors = 0usize;

    for (i, target) in targets.into_iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let row = fetch_one(client, &target).await;
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        crate::db::save_fetch(conn, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

async fn fetch_one(client: &Client, target: &Target) -> FetchRow {
    let start = Instant::now();
    let result = fetch_page(client, &target.url).await;
    let latency_ms = Some(start.elapsed().as_millis() as i64);

    match result {
        Ok(page) => FetchRow {
            target_id: target.id,
            url: target.url.clone(),
            html: Some(page.html),
            status: Some(page.status as i32),
            error: None,
            latency_ms,
        },
        Err(e) => {
            warn!("Fetch failed for {}: {}", target.url, e);
            FetchRow {
                target_id: target.id,
                url: target.url.clone(),
                html: None,
                status: e.status().map(i32::from),
                error: Some(e.to_string()),
                latency_ms,
            }
        }
    }
}
