//! Startup reconciliation: bring the stored channel set in line with the
//! accounts that should be watched.

use std::sync::Arc;

use calwatch_calendar::DirectoryClient;
use chrono::Utc;
use tokio::task::JoinSet;

use crate::channel::ChannelKind;
use crate::error::BootstrapError;
use crate::lease::LeaseManager;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Accounts that should have an event channel.
    pub accounts: usize,
    /// Stale records removed before reconciling.
    pub swept: usize,
    /// Channels now being renewed, the directory channel included.
    pub renewing: usize,
    /// Calendars (or `directory`) whose channel could not be established.
    pub failed: Vec<String>,
}

pub struct Bootstrap {
    lease: Arc<LeaseManager>,
    directory: Arc<DirectoryClient>,
    whitelist: Vec<String>,
}

impl Bootstrap {
    /// With a non-empty `whitelist` only those accounts are watched and the
    /// directory itself is not.
    pub fn new(
        lease: Arc<LeaseManager>,
        directory: Arc<DirectoryClient>,
        whitelist: Vec<String>,
    ) -> Self {
        Self {
            lease,
            directory,
            whitelist,
        }
    }

    async fn accounts(&self) -> Result<Vec<String>, BootstrapError> {
        if !self.whitelist.is_empty() {
            return Ok(self.whitelist.clone());
        }

        let users = self
            .directory
            .list_all_users()
            .await
            .map_err(BootstrapError::Directory)?;

        Ok(users
            .into_iter()
            .filter(|u| !u.suspended)
            .map(|u| u.primary_email)
            .collect())
    }

    /// Sweep stale channels, then resume or create the directory channel and
    /// one event channel per account. A failure for one account is logged
    /// and does not stop the others.
    pub async fn run(&self) -> Result<BootstrapReport, BootstrapError> {
        let accounts = self.accounts().await?;

        let webhooks = &self.lease.settings().webhooks;
        let swept = self.lease.store().remove_stale(Utc::now(), webhooks)?;
        if swept > 0 {
            tracing::info!(swept, "Removed stale channels");
        }

        let mut kinds: Vec<ChannelKind> = accounts.iter().map(ChannelKind::event).collect();
        if self.whitelist.is_empty() {
            kinds.push(ChannelKind::Directory);
        }

        let mut tasks = JoinSet::new();
        for kind in kinds {
            let lease = Arc::clone(&self.lease);
            tasks.spawn(async move {
                let result = lease.ensure(&kind).await;
                (kind, result)
            });
        }

        let mut report = BootstrapReport {
            accounts: accounts.len(),
            swept,
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => report.renewing += 1,
                Ok((kind, Err(e))) => {
                    tracing::error!(kind = %kind, error = %e, "Failed to establish channel");
                    report
                        .failed
                        .push(kind.calendar_id().unwrap_or("directory").to_string());
                }
                Err(e) => tracing::error!(error = %e, "Channel setup task panicked"),
            }
        }

        report.failed.sort();
        tracing::info!(
            accounts = report.accounts,
            renewing = report.renewing,
            failed = report.failed.len(),
            "Bootstrap complete"
        );
        Ok(report)
    }
}
