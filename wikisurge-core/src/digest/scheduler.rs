use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc, Weekday};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::digest::collector::Collector;
use crate::digest::model::{DigestData, DigestFrequency, DigestPeriod, UserRecord};
use crate::digest::render::{render_digest, subject_for};
use crate::digest::traits::{EmailTransport, UserStore};
use crate::error::Result;
use crate::metrics;

const SCHEDULER_DEADLINE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub daily_hour: u32,
    pub weekly_weekday: Weekday,
    pub weekly_hour: u32,
    pub max_concurrent_sends: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_hour: 6,
            weekly_weekday: Weekday::Mon,
            weekly_hour: 6,
            max_concurrent_sends: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    pub sent: u64,
    pub skipped: u64,
    pub errored: u64,
}

enum Outcome {
    Sent,
    Skipped,
}

pub struct Scheduler {
    collector: Collector,
    user_store: Arc<dyn UserStore>,
    email: Arc<dyn EmailTransport>,
    clock: SharedClock,
    config: SchedulerConfig,
    cancel: CancellationToken,
    last_run: Mutex<HashMap<&'static str, chrono::DateTime<Utc>>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("config", &self.config).finish()
    }
}

impl Scheduler {
    pub fn new(
        collector: Collector,
        user_store: Arc<dyn UserStore>,
        email: Arc<dyn EmailTransport>,
        clock: SharedClock,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            collector,
            user_store,
            email,
            clock,
            config,
            cancel: CancellationToken::new(),
            last_run: Mutex::new(HashMap::new()),
        })
    }

    /// Samples the current UTC time once a minute and triggers a period run
    /// when its wall-clock trigger fires and the minimum interval since the
    /// last run of that kind has elapsed.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => {
                        info!("digest scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        scheduler.sample_and_maybe_run().await;
                    }
                }
            }
        })
    }

    async fn sample_and_maybe_run(&self) {
        let now = self.clock.now_utc();
        if now.minute() != 0 {
            return;
        }

        if now.hour() == self.config.daily_hour && self.due("daily", now, DigestPeriod::Daily) {
            self.dispatch_run(DigestPeriod::Daily, "daily").await;
        }
        if now.weekday() == self.config.weekly_weekday
            && now.hour() == self.config.weekly_hour
            && self.due("weekly", now, DigestPeriod::Weekly)
        {
            self.dispatch_run(DigestPeriod::Weekly, "weekly").await;
        }
    }

    fn due(&self, key: &'static str, now: chrono::DateTime<Utc>, period: DigestPeriod) -> bool {
        let last_run = self.last_run.lock();
        match last_run.get(key) {
            Some(last) => now - *last >= period.min_interval(),
            None => true,
        }
    }

    async fn dispatch_run(&self, period: DigestPeriod, key: &'static str) {
        match self.run_now(period).await {
            Ok(result) => {
                info!(sent = result.sent, skipped = result.skipped, errored = result.errored, "digest run complete");
                metrics::registry().record_digest_sent(result.sent, result.skipped, result.errored);
                self.last_run.lock().insert(key, self.clock.now_utc());
            }
            Err(err) => warn!(error = %err, "digest run failed"),
        }
    }

    /// Manual trigger used by operators and tests, bypassing the wall-clock
    /// schedule. A collection or user-store failure fatally fails the run
    /// (reported as `errored=1, sent=skipped=0`) rather than propagating,
    /// since the scheduler's wall-clock loop has nowhere to route an `Err`.
    pub async fn run_now(&self, period: DigestPeriod) -> Result<RunResult> {
        match tokio::time::timeout(SCHEDULER_DEADLINE, self.run(period)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => {
                warn!(error = %err, "digest run failed fatally during collection");
                Ok(RunResult { sent: 0, skipped: 0, errored: 1 })
            }
            Err(_) => {
                warn!("digest run deadline exceeded");
                Ok(RunResult { sent: 0, skipped: 0, errored: 1 })
            }
        }
    }

    async fn run(&self, period: DigestPeriod) -> Result<RunResult> {
        let global = self.collector.collect_global(period).await?;

        let frequency = match period {
            DigestPeriod::Daily => DigestFrequency::Daily,
            DigestPeriod::Weekly => DigestFrequency::Weekly,
        };
        let mut users = self.user_store.get_users_for_digest(frequency).await?;
        let mut both = self.user_store.get_users_for_digest(DigestFrequency::Both).await?;
        users.append(&mut both);

        self.process_users(global, users).await
    }

    async fn process_users(&self, global: DigestData, users: Vec<UserRecord>) -> Result<RunResult> {
        let pool_size = self.config.max_concurrent_sends.max(1);
        let (tx, rx) = mpsc::channel::<UserRecord>(pool_size * 2);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = JoinSet::new();
        for _ in 0..pool_size {
            let rx = Arc::clone(&rx);
            let global = global.clone();
            let cancel = self.cancel.clone();
            let collector = self.collector.clone();
            let user_store = Arc::clone(&self.user_store);
            let email = Arc::clone(&self.email);
            let clock = Arc::clone(&self.clock);
            workers.spawn(worker_loop(rx, global, cancel, user_store, email, clock, collector));
        }

        for user in users {
            if self.cancel.is_cancelled() {
                break;
            }
            if tx.send(user).await.is_err() {
                break;
            }
        }
        drop(tx);

        let mut total = RunResult::default();
        while let Some(outcome) = workers.join_next().await {
            if let Ok((sent, skipped, errored)) = outcome {
                total.sent += sent;
                total.skipped += skipped;
                total.errored += errored;
            }
        }
        Ok(total)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn worker_loop(
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<UserRecord>>>,
    global: DigestData,
    cancel: CancellationToken,
    user_store: Arc<dyn UserStore>,
    email: Arc<dyn EmailTransport>,
    clock: SharedClock,
    collector: Collector,
) -> (u64, u64, u64) {
    let mut sent = 0u64;
    let mut skipped = 0u64;
    let mut errored = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let user = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(user) = user else { break };

        match process_one(&collector, &global, &user, &user_store, &email, &clock).await {
            Ok(Outcome::Sent) => sent += 1,
            Ok(Outcome::Skipped) => skipped += 1,
            Err(err) => {
                warn!(user = %user.id, error = %err, "digest send failed for user");
                errored += 1;
            }
        }
    }

    (sent, skipped, errored)
}

async fn process_one(
    collector: &Collector,
    global: &DigestData,
    user: &UserRecord,
    user_store: &Arc<dyn UserStore>,
    email: &Arc<dyn EmailTransport>,
    clock: &SharedClock,
) -> Result<Outcome> {
    let personalized = collector.personalize_for_user(global, user).await?;

    if !collector.should_send_to_user(&personalized, user) {
        return Ok(Outcome::Skipped);
    }

    let body = render_digest(&personalized, user);
    let subject = subject_for(&personalized);
    email.send(&user.email, &subject, &body).await?;
    user_store.mark_digest_sent(&user.id, clock.now_utc()).await?;
    Ok(Outcome::Sent)
}
