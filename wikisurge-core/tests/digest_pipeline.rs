//! Digest scenario 6: a daily run with three users of differing content
//! preference and watchlist overlap, exercising the collector and scheduler
//! together against the fake store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wikisurge_core::clock::{SharedClock, TestClock};
use wikisurge_core::digest::model::{DigestContent, DigestFrequency, UserRecord};
use wikisurge_core::digest::scheduler::{Scheduler, SchedulerConfig};
use wikisurge_core::digest::traits::{EmailTransport, UserStore};
use wikisurge_core::digest::Collector;
use wikisurge_core::store::{Keys, Store};
use wikisurge_core::{EditWarAlert, Result, Severity};

struct FixedUserStore {
    users: Vec<UserRecord>,
}

#[async_trait]
impl UserStore for FixedUserStore {
    async fn get_users_for_digest(&self, frequency: DigestFrequency) -> Result<Vec<UserRecord>> {
        Ok(self.users.iter().filter(|u| u.frequency == frequency).cloned().collect())
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    async fn mark_digest_sent(&self, _id: &str, _at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingEmailTransport {
    sent: Arc<Mutex<Vec<(String, String, String)>>>,
}

#[async_trait]
impl EmailTransport for RecordingEmailTransport {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string(), html_body.to_string()));
        Ok(())
    }
}

fn user(id: &str, content: DigestContent, watchlist: Vec<&str>) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        verified: true,
        frequency: DigestFrequency::Daily,
        content,
        spike_threshold: 5.0,
        watchlist: watchlist.into_iter().map(String::from).collect(),
        unsubscribe_token: "tok".into(),
        last_digest_at: None,
    }
}

#[tokio::test]
async fn daily_run_sends_to_interested_users_and_skips_the_rest() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());

    // Seed one edit war alert and some hot-page stats so the global digest
    // has content, and a watchlisted page's stats so the personalized view
    // picks it up for user C.
    let alert = EditWarAlert {
        page: "Disputed Article".into(),
        editor_count: 2,
        revert_count: 4,
        severity: Severity::High,
        timestamp: clock.now_utc(),
        start_time: clock.now_utc(),
        server_url: "https://en.wikipedia.org".into(),
    };
    store
        .xadd_bounded(
            Keys::alerts_editwars(),
            &[
                ("data", serde_json::to_string(&alert).unwrap()),
                ("severity", alert.severity.to_string()),
                ("page", alert.page.clone()),
            ],
            1000,
        )
        .await
        .unwrap();

    store
        .hset_many(
            &Keys::hot_stats("Quiet Watchlist Page"),
            &[("edits_1h", "2".to_string()), ("edits_5min", "0".to_string())],
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

    // User A wants everything and watches a page with no recent activity.
    let user_a = user("a", DigestContent::All, vec!["Quiet Watchlist Page"]);
    // User B only wants the global digest, which has one highlight.
    let user_b = user("b", DigestContent::Global, vec![]);
    // User C only wants their watchlist, which has no notable activity, so
    // they should be skipped.
    let user_c = user("c", DigestContent::Watchlist, vec!["Quiet Watchlist Page"]);

    let user_store: Arc<dyn UserStore> =
        Arc::new(FixedUserStore { users: vec![user_a, user_b, user_c] });
    let email = RecordingEmailTransport::default();
    let email_dyn: Arc<dyn EmailTransport> = Arc::new(email.clone());

    let collector = Collector::new(store, clock.clone());
    let scheduler = Scheduler::new(collector, user_store, email_dyn, clock, SchedulerConfig::default());

    let result = scheduler.run_now(wikisurge_core::digest::model::DigestPeriod::Daily).await.unwrap();

    assert_eq!(result.sent, 2, "users A and B should receive a digest");
    assert_eq!(result.skipped, 1, "user C has no notable watchlist activity and no interest in global");
    assert_eq!(result.errored, 0);

    let sent = email.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    let recipients: Vec<&str> = sent.iter().map(|(to, _, _)| to.as_str()).collect();
    assert!(recipients.contains(&"a@example.com"));
    assert!(recipients.contains(&"b@example.com"));

    let a_body = &sent.iter().find(|(to, _, _)| to == "a@example.com").unwrap().2;
    assert!(a_body.contains("Global Highlights"));
    assert!(a_body.contains("Your Watchlist"));
}
