//! TTL sweep over stored objects

use crate::error::Result;
use crate::storage::BlobStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deleted: u64,
    pub errors: u64,
    pub scanned: u64,
    #[serde(skip)]
    pub duration: Duration,
}

/// Delete every object older than `ttl` at `now`.
///
/// Failed deletions are counted and skipped; a listing failure aborts the
/// sweep.
pub async fn sweep(store: &dyn BlobStore, ttl: Duration, now: DateTime<Utc>) -> Result<SweepReport> {
    let started = Instant::now();
    let mut report = SweepReport::default();
    let mut cursor: Option<String> = None;

    loop {
        let page = store.list(cursor.as_deref()).await?;

        for object in page.objects {
            report.scanned += 1;
            let age = (now - object.created_at).to_std().unwrap_or_default();
            if age <= ttl {
                continue;
            }

            match store.delete(&object.url).await {
                Ok(()) => {
                    report.deleted += 1;
                    tracing::debug!(key = %object.key, age_secs = age.as_secs(), "deleted expired object");
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(key = %object.key, error = %e, "failed to delete expired object");
                }
            }
        }

        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    report.duration = started.elapsed();
    Ok(report)
}

/// Run [`sweep`] now and then every `interval`. A zero interval disables the
/// timer and returns `None`.
pub fn spawn_cleanup_task(
    store: Arc<dyn BlobStore>,
    ttl: Duration,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        tracing::info!("automatic cleanup disabled");
        return None;
    }

    tracing::info!(
        interval = %humantime::format_duration(interval),
        ttl = %humantime::format_duration(ttl),
        backend = store.name(),
        "starting automatic cleanup"
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep(store.as_ref(), ttl, Utc::now()).await {
                Ok(report) if report.deleted > 0 || report.errors > 0 => {
                    tracing::info!(
                        deleted = report.deleted,
                        errors = report.errors,
                        scanned = report.scanned,
                        "automatic cleanup finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "automatic cleanup failed"),
            }
        }
    }))
}
