//! End-to-end coverage for `HotPageTracker` against the in-process fake
//! store: promotion threshold, `MaxTracked` enforcement, and the bounded
//! editor set.

use std::time::Duration;

use chrono::Utc;
use wikisurge_core::clock::{SharedClock, TestClock};
use wikisurge_core::hotpage::{HotPageConfig, HotPageTracker};
use wikisurge_core::store::Store;
use wikisurge_core::EditEvent;

fn edit(title: &str, user: &str) -> EditEvent {
    EditEvent {
        title: title.to_string(),
        user: user.to_string(),
        wiki: "enwiki".to_string(),
        server_url: "https://en.wikipedia.org".to_string(),
        bot: false,
        timestamp: 0,
        old_length: 1000,
        new_length: 1010,
        old_revision_id: Some(1),
        new_revision_id: Some(2),
        comment: String::new(),
    }
}

#[tokio::test]
async fn promotes_a_page_once_its_activity_crosses_the_threshold() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let config = HotPageConfig { promotion_threshold: 3, ..HotPageConfig::default() };
    let tracker = HotPageTracker::new(store, config, clock);

    assert!(!tracker.is_hot("PageA").await.unwrap());

    for i in 0..3 {
        tracker.observe(&edit("PageA", &format!("user{i}"))).await.unwrap();
    }

    assert!(tracker.is_hot("PageA").await.unwrap());
    let stats = tracker.get_page_stats("PageA").await.unwrap().expect("stats recorded");
    assert_eq!(stats.stats.editors, 3);
}

#[tokio::test]
async fn max_tracked_blocks_promotion_of_further_pages() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let config = HotPageConfig { promotion_threshold: 1, max_tracked: 1, ..HotPageConfig::default() };
    let tracker = HotPageTracker::new(store, config, clock);

    tracker.observe(&edit("PageA", "alice")).await.unwrap();
    assert!(tracker.is_hot("PageA").await.unwrap());

    tracker.observe(&edit("PageB", "bob")).await.unwrap();
    assert!(
        !tracker.is_hot("PageB").await.unwrap(),
        "a second page should not be promoted once MaxTracked is reached"
    );
}

#[tokio::test]
async fn editor_set_is_capped_at_max_members_per_page() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let config =
        HotPageConfig { promotion_threshold: 1, max_members_per_page: 5, ..HotPageConfig::default() };
    let tracker = HotPageTracker::new(store, config, clock);

    for i in 0..20 {
        tracker.observe(&edit("PageA", &format!("user{i}"))).await.unwrap();
    }

    let stats = tracker.get_page_stats("PageA").await.unwrap().expect("stats recorded");
    assert_eq!(stats.stats.editors, 5);
}

#[tokio::test]
async fn marker_expiry_is_reflected_immediately_by_is_hot() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let config = HotPageConfig {
        promotion_threshold: 1,
        window: Duration::from_secs(60),
        ..HotPageConfig::default()
    };
    let tracker = HotPageTracker::new(store.clone(), config, clock);

    tracker.observe(&edit("PageA", "alice")).await.unwrap();
    assert!(tracker.is_hot("PageA").await.unwrap());

    store.delete(&wikisurge_core::store::Keys::hot_marker("PageA")).await.unwrap();
    assert!(!tracker.is_hot("PageA").await.unwrap());
}
