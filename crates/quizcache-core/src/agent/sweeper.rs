//! Age-based pruning of the dynamic store.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::store::{CacheStore, StoredResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub deleted: usize,
    /// Entries kept because they carry no usable timestamp
    pub undated: usize,
}

/// When the stored response was produced, from its `Date` header.
fn stored_at(response: &StoredResponse) -> Option<DateTime<Utc>> {
    let raw = response.header("date")?;
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Delete every entry older than `max_age` at `now`.
///
/// Entries without a parseable timestamp are kept.
pub async fn sweep(store: &CacheStore, max_age: Duration, now: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    for (key, response) in store.entries().await {
        report.examined += 1;
        let Some(at) = stored_at(&response) else {
            report.undated += 1;
            continue;
        };
        if now - at <= max_age {
            continue;
        }
        match store.delete_key(&key).await {
            Ok(true) => {
                debug!(key = %key, stored_at = %at, "Swept expired entry");
                report.deleted += 1;
            }
            Ok(false) => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to delete expired entry"),
        }
    }

    info!(
        store = %store.name(),
        examined = report.examined,
        deleted = report.deleted,
        undated = report.undated,
        "Dynamic store sweep complete"
    );
    report
}
