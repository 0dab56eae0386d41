//! Edit-war detector scenarios: a clear edit war, collaborative editing that
//! never alerts, a single vandalism revert that falls short of `MinReverts`,
//! and the `MinEditors`/`MinEdits` boundary conditions.

use chrono::Utc;
use wikisurge_core::clock::{SharedClock, TestClock};
use wikisurge_core::editwar::{EditWarConfig, EditWarDetector};
use wikisurge_core::hotpage::{HotPageConfig, HotPageTracker};
use wikisurge_core::store::Store;
use wikisurge_core::EditEvent;

fn edit(title: &str, user: &str, byte_change: i64) -> EditEvent {
    EditEvent {
        title: title.to_string(),
        user: user.to_string(),
        wiki: "enwiki".to_string(),
        server_url: "https://en.wikipedia.org".to_string(),
        bot: false,
        timestamp: 0,
        old_length: 1000,
        new_length: 1000 + byte_change,
        old_revision_id: Some(1),
        new_revision_id: Some(2),
        comment: String::new(),
    }
}

async fn hot_tracker(store: Store, clock: SharedClock) -> std::sync::Arc<HotPageTracker> {
    let config = HotPageConfig { promotion_threshold: 1, ..HotPageConfig::default() };
    HotPageTracker::new(store, config, clock)
}

#[tokio::test]
async fn clear_edit_war_between_two_editors_is_flagged() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let tracker = hot_tracker(store.clone(), clock.clone()).await;
    let detector = EditWarDetector::new(store, tracker.clone(), EditWarConfig::default(), clock);

    let sequence = [
        ("alice", 500),
        ("bob", -480),
        ("alice", 510),
        ("bob", -495),
        ("alice", 520),
    ];

    let mut alert = None;
    for (user, change) in sequence {
        let e = edit("Disputed Article", user, change);
        tracker.observe(&e).await.unwrap();
        let result = detector.observe(&e).await.unwrap();
        if result.is_some() {
            alert = result;
        }
    }

    let alert = alert.expect("a back-and-forth revert pattern should raise an edit war alert");
    assert_eq!(alert.page, "Disputed Article");
    assert_eq!(alert.editor_count, 2);
    assert!(alert.revert_count >= EditWarConfig::default().min_reverts);
}

#[tokio::test]
async fn collaborative_editing_in_the_same_direction_never_alerts() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let tracker = hot_tracker(store.clone(), clock.clone()).await;
    let detector = EditWarDetector::new(store, tracker.clone(), EditWarConfig::default(), clock);

    let sequence = [("alice", 100), ("bob", 150), ("carol", 200), ("alice", 80), ("bob", 120)];
    for (user, change) in sequence {
        let e = edit("Collaborative Article", user, change);
        tracker.observe(&e).await.unwrap();
        assert!(detector.observe(&e).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn a_single_reverted_vandalism_edit_falls_short_of_min_reverts() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let tracker = hot_tracker(store.clone(), clock.clone()).await;
    let config = EditWarConfig { min_edits: 2, ..EditWarConfig::default() };
    let detector = EditWarDetector::new(store, tracker.clone(), config, clock);

    // Two editors, enough edits to clear MinEditors/MinEdits, but only one
    // revert pair -- one short of the default MinReverts of 2.
    let sequence = [("vandal", 900), ("patroller", -900), ("vandal", 50), ("patroller", 60)];
    for (user, change) in sequence {
        let e = edit("Lightly Vandalized Article", user, change);
        tracker.observe(&e).await.unwrap();
        assert!(detector.observe(&e).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn below_min_editors_never_alerts_even_with_reverts() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let tracker = hot_tracker(store.clone(), clock.clone()).await;
    // MinEditors - 1: a single editor cannot constitute an edit war no
    // matter how much their own edits oscillate.
    let config = EditWarConfig { min_editors: 2, min_edits: 2, ..EditWarConfig::default() };
    let detector = EditWarDetector::new(store, tracker.clone(), config, clock);

    for change in [500, -480, 510, -495, 520, -500] {
        let e = edit("Solo Oscillation", "lone_editor", change);
        tracker.observe(&e).await.unwrap();
        assert!(detector.observe(&e).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn below_min_edits_never_alerts() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let tracker = hot_tracker(store.clone(), clock.clone()).await;
    // MinEdits - 1: two editors trading one revert each, stopped one edit
    // short of the configured minimum.
    let config = EditWarConfig { min_editors: 2, min_edits: 6, min_reverts: 1, ..EditWarConfig::default() };
    let detector = EditWarDetector::new(store, tracker.clone(), config, clock);

    for (user, change) in [("alice", 500), ("bob", -480), ("alice", 510), ("bob", -495), ("alice", 10)] {
        let e = edit("Short Dispute", user, change);
        tracker.observe(&e).await.unwrap();
        assert!(detector.observe(&e).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn a_published_alert_adds_the_page_to_the_active_set() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let tracker = hot_tracker(store.clone(), clock.clone()).await;
    let detector = EditWarDetector::new(store.clone(), tracker.clone(), EditWarConfig::default(), clock);

    for (user, change) in [("alice", 500), ("bob", -480), ("alice", 510), ("bob", -495), ("alice", 520)] {
        let e = edit("Disputed Article", user, change);
        tracker.observe(&e).await.unwrap();
        detector.observe(&e).await.unwrap();
    }

    let active = store.smembers(wikisurge_core::store::Keys::editwar_active_set()).await.unwrap();
    assert!(active.contains(&"Disputed Article".to_string()));
}
