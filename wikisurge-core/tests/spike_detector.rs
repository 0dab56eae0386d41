//! Scenario 4 from the detection design: a quiet baseline followed by a
//! burst large enough to cross the ratio threshold, then a cooldown that
//! suppresses the next alert.

use std::time::Duration;

use chrono::Utc;
use wikisurge_core::clock::{SharedClock, TestClock};
use wikisurge_core::hotpage::{HotPageConfig, HotPageTracker};
use wikisurge_core::spike::{SpikeConfig, SpikeDetector};
use wikisurge_core::store::Store;
use wikisurge_core::{EditEvent, Severity};

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
async fn baseline_then_burst_triggers_a_spike_and_then_cools_down() {
    let store = Store::fake();
    let test_clock = TestClock::new(Utc::now());
    let clock: SharedClock = test_clock.clone();

    let hot_config = HotPageConfig { promotion_threshold: 1, ..HotPageConfig::default() };
    let tracker = HotPageTracker::new(store.clone(), hot_config, clock.clone());

    // A quiet baseline: 4 edits spread across the prior hour.
    for i in 0..4 {
        tracker.observe(&edit("PageA", &format!("baseline{i}"))).await.unwrap();
        test_clock.advance(Duration::from_secs(14 * 60));
    }

    let spike_config = SpikeConfig::default();
    let detector = SpikeDetector::new(store, tracker.clone(), spike_config, clock);

    // A burst: 20 edits by 5 distinct editors inside a 5-minute window.
    let mut first_alert = None;
    for i in 0..20 {
        let e = edit("PageA", &format!("burst{}", i % 5));
        tracker.observe(&e).await.unwrap();
        let alert = detector.observe(&e).await.unwrap();
        if first_alert.is_none() && alert.is_some() {
            first_alert = alert;
        }
        test_clock.advance(Duration::from_secs(15));
    }

    let alert = first_alert.expect("the burst should have crossed the ratio threshold");
    assert!(alert.ratio >= spike_config.ratio_threshold);
    assert!(alert.severity >= Severity::Medium);
    assert_eq!(alert.page, "PageA");

    // Immediately afterwards, the same page is still within cooldown.
    let again = detector.observe(&edit("PageA", "burst0")).await.unwrap();
    assert!(again.is_none(), "a repeat spike within the cooldown window must not re-alert");
}

#[tokio::test]
async fn a_page_that_never_goes_hot_never_spikes() {
    let store = Store::fake();
    let clock: SharedClock = TestClock::new(Utc::now());
    let hot_config = HotPageConfig { promotion_threshold: 1000, ..HotPageConfig::default() };
    let tracker = HotPageTracker::new(store.clone(), hot_config, clock.clone());
    let detector = SpikeDetector::new(store, tracker.clone(), SpikeConfig::default(), clock);

    for i in 0..10 {
        let e = edit("ColdPage", &format!("u{i}"));
        tracker.observe(&e).await.unwrap();
        assert!(detector.observe(&e).await.unwrap().is_none());
    }
}
