//! Fallback implementations of the external collaborators the core crate
//! only specifies as trait interfaces: the persistent user store and the
//! outbound email transport. Real deployments wire a database-backed user
//! store and a provider (SMTP, SES, ...) behind these traits instead; when
//! neither is configured the server still starts, the way the teacher's
//! database layer falls back to an in-memory backend when `DATABASE_URL`
//! is unset rather than refusing to boot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use wikisurge_core::digest::model::{DigestFrequency, UserRecord};
use wikisurge_core::digest::traits::{EmailTransport, UserStore};
use wikisurge_core::Result;

/// No subscribers: every digest run processes zero users until a real user
/// store is wired in.
#[derive(Debug, Default)]
pub struct NoopUserStore;

#[async_trait]
impl UserStore for NoopUserStore {
    async fn get_users_for_digest(&self, _frequency: DigestFrequency) -> Result<Vec<UserRecord>> {
        Ok(Vec::new())
    }

    async fn get_user_by_id(&self, _id: &str) -> Result<Option<UserRecord>> {
        Ok(None)
    }

    async fn mark_digest_sent(&self, _id: &str, _at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}

/// Logs the subject and recipient instead of sending mail. Useful for local
/// development and for environments that haven't configured a transport yet.
#[derive(Debug, Default)]
pub struct LoggingEmailTransport;

#[async_trait]
impl EmailTransport for LoggingEmailTransport {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        info!(%to, %subject, body_len = html_body.len(), "no email transport configured, dropping digest");
        Ok(())
    }
}
