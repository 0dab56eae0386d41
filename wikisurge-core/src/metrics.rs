//! Process-global counters exposed to the server binary's `/metrics` route.
//! Lock-free: every counter is an `AtomicU64`, and the registry itself is a
//! `OnceLock` so detectors can reach it without threading a handle through
//! every constructor.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

#[derive(Debug, Default)]
pub struct Metrics {
    pub edits_processed: AtomicU64,
    pub spikes_emitted: AtomicU64,
    pub wars_emitted: AtomicU64,
    pub analysis_cache_hits: AtomicU64,
    pub analysis_cache_misses: AtomicU64,
    pub digest_sent: AtomicU64,
    pub digest_skipped: AtomicU64,
    pub digest_errored: AtomicU64,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Returns the process-wide metrics registry, initializing it on first call.
pub fn registry() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

impl Metrics {
    pub fn record_edit_processed(&self) {
        self.edits_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spike_emitted(&self) {
        self.spikes_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_war_emitted(&self) {
        self.wars_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_cache_hit(&self) {
        self.analysis_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_cache_miss(&self) {
        self.analysis_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_digest_sent(&self, sent: u64, skipped: u64, errored: u64) {
        self.digest_sent.fetch_add(sent, Ordering::Relaxed);
        self.digest_skipped.fetch_add(skipped, Ordering::Relaxed);
        self.digest_errored.fetch_add(errored, Ordering::Relaxed);
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        let mut gauge = |name: &str, help: &str, value: u64| {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        };

        gauge(
            "wikisurge_edits_processed_total",
            "Edit events consumed from the stream",
            self.edits_processed.load(Ordering::Relaxed),
        );
        gauge(
            "wikisurge_spikes_emitted_total",
            "Spike alerts published",
            self.spikes_emitted.load(Ordering::Relaxed),
        );
        gauge(
            "wikisurge_wars_emitted_total",
            "Edit-war alerts published",
            self.wars_emitted.load(Ordering::Relaxed),
        );
        gauge(
            "wikisurge_analysis_cache_hits_total",
            "Conflict analysis cache hits",
            self.analysis_cache_hits.load(Ordering::Relaxed),
        );
        gauge(
            "wikisurge_analysis_cache_misses_total",
            "Conflict analysis cache misses",
            self.analysis_cache_misses.load(Ordering::Relaxed),
        );
        gauge(
            "wikisurge_digest_sent_total",
            "Digest emails sent",
            self.digest_sent.load(Ordering::Relaxed),
        );
        gauge(
            "wikisurge_digest_skipped_total",
            "Digest recipients skipped (nothing worth sending)",
            self.digest_skipped.load(Ordering::Relaxed),
        );
        gauge(
            "wikisurge_digest_errored_total",
            "Digest sends that failed",
            self.digest_errored.load(Ordering::Relaxed),
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_all_counters() {
        let metrics = Metrics::default();
        metrics.record_edit_processed();
        metrics.record_spike_emitted();
        metrics.record_digest_sent(2, 1, 0);
        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("wikisurge_edits_processed_total 1"));
        assert!(rendered.contains("wikisurge_spikes_emitted_total 1"));
        assert!(rendered.contains("wikisurge_digest_sent_total 2"));
        assert!(rendered.contains("wikisurge_digest_skipped_total 1"));
    }
}
