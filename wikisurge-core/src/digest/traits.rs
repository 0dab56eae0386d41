use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::digest::model::{DigestFrequency, UserRecord};
use crate::error::Result;

/// Read-only contracts the scheduler needs from the persistent user store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_users_for_digest(&self, frequency: DigestFrequency) -> Result<Vec<UserRecord>>;
    async fn get_user_by_id(&self, id: &str) -> Result<Option<UserRecord>>;
    async fn mark_digest_sent(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Opaque outbound email contract; the transport implementation (SMTP,
/// a provider API, ...) lives entirely outside this crate.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}
