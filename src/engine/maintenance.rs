use chrono::{DateTime, Duration, Utc};

use super::{Workspace, now};
use crate::error::{Error, Result};
use crate::types::{PurgeReport, WorkspaceStats};

impl Workspace {
    /// Physically removes rows soft-deleted more than `retention_days` ago
    /// (the configured window when `None`).
    pub fn purge_deleted(&self, retention_days: Option<i64>) -> Result<PurgeReport> {
        self.touch();
        let days = retention_days.unwrap_or(self.retention_days);
        if days < 0 {
            return Err(Error::validation(
                "retention_days",
                format!("must not be negative, got {days}"),
            ));
        }
        let window = Duration::try_days(days).ok_or_else(|| {
            Error::validation("retention_days", format!("{days} days is out of range"))
        })?;
        let cutoff = now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.store.purge_deleted(cutoff)
    }

    pub fn workspace_stats(&self) -> Result<WorkspaceStats> {
        self.touch();
        self.store.stats()
    }
}
