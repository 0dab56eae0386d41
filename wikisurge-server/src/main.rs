//! WikiSurge server binary: wires the detection pipeline, the conflict
//! analysis service, and the digest scheduler to a live Redis-backed store
//! and serves the HTTP/WebSocket front end.
//!
//! The upstream edit source and the message bus that delivers it are
//! external collaborators (see `pipeline::run_consumer`): this binary
//! creates the broadcast channel every handler reads from, but populating
//! it is left to whatever ingestion task a deployment plugs in.

mod config;
mod errors;
mod http;
mod pipeline;
mod stubs;
mod ws;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wikisurge_core::analysis::{AnalysisService, LlmClient, LlmConfig, LlmProvider};
use wikisurge_core::digest::{Collector, Scheduler, SchedulerConfig};
use wikisurge_core::editwar::{EditWarConfig, EditWarDetector};
use wikisurge_core::hotpage::{HotPageConfig, HotPageTracker};
use wikisurge_core::spike::{SpikeConfig, SpikeDetector};
use wikisurge_core::stats::StatsRecorder;
use wikisurge_core::store::Store;
use wikisurge_core::trending::{TrendingConfig, TrendingScorer};
use wikisurge_core::{clock, EditEvent};

use crate::config::AppConfig;
use crate::http::{build_router, AppState};
use crate::pipeline::{
    EditWarHandler, HotPageHandler, LiveFeedHandler, SpikeHandler, StatsHandler, TrendingHandler,
};
use crate::stubs::{LoggingEmailTransport, NoopUserStore};
use crate::ws::LocalBroadcaster;

const BROADCAST_CHANNEL_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wikisurge_server=info,wikisurge_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    info!(host = %config.server_host, port = config.server_port, "server configuration loaded");

    let store = Store::connect(&config.redis_url).await?;
    store.ping().await?;
    info!("connected to redis");

    let clock = clock::system_clock();

    let hot_pages = HotPageTracker::new(store.clone(), HotPageConfig::default(), clock.clone());
    let trending = TrendingScorer::new(store.clone(), TrendingConfig::default(), clock.clone());
    let spike_detector =
        SpikeDetector::new(store.clone(), hot_pages.clone(), SpikeConfig::default(), clock.clone());
    let editwar_detector = EditWarDetector::new(
        store.clone(),
        hot_pages.clone(),
        EditWarConfig::default(),
        clock.clone(),
    );

    let llm = build_llm_client(&config)?;
    if llm.is_none() {
        warn!("no llm_provider configured, conflict analysis will use the heuristic rubric");
    }
    let analysis = AnalysisService::new(store.clone(), llm, clock.clone())?;
    editwar_detector.set_analyzer(analysis.clone());

    let stats_recorder = Arc::new(StatsRecorder::new(store.clone(), clock.clone()));

    let local_broadcaster = Arc::new(LocalBroadcaster::new());
    let handlers: Vec<Arc<dyn pipeline::EditHandler>> = vec![
        Arc::new(HotPageHandler { tracker: hot_pages.clone() }),
        Arc::new(TrendingHandler { scorer: trending.clone() }),
        Arc::new(SpikeHandler { detector: spike_detector.clone() }),
        Arc::new(EditWarHandler { detector: editwar_detector.clone() }),
        Arc::new(StatsHandler { recorder: stats_recorder.clone() }),
        Arc::new(LiveFeedHandler { store: store.clone(), local: local_broadcaster.clone() }),
    ];

    // `_edit_tx` stands in for whatever ingestion task feeds the upstream
    // edit stream in a real deployment; nothing here produces edits on it.
    let (_edit_tx, edit_rx) = broadcast::channel::<EditEvent>(BROADCAST_CHANNEL_CAPACITY);
    let consumer_cancel = CancellationToken::new();
    tokio::spawn(pipeline::run_consumer(edit_rx, handlers, consumer_cancel.clone()));

    let _hot_page_cleanup = hot_pages.spawn_cleanup();
    let _trending_prune = trending.spawn_prune_task();
    let _editwar_sweep = editwar_detector.spawn_deactivation_sweep();

    let collector = Collector::new(store.clone(), clock.clone());
    let user_store: Arc<dyn wikisurge_core::digest::UserStore> = Arc::new(NoopUserStore);
    let email: Arc<dyn wikisurge_core::digest::EmailTransport> = Arc::new(LoggingEmailTransport);
    let scheduler_config = SchedulerConfig {
        daily_hour: config.scheduler_daily_hour,
        weekly_hour: config.scheduler_weekly_hour,
        max_concurrent_sends: config.scheduler_max_concurrent_sends,
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::new(collector, user_store, email, clock.clone(), scheduler_config);
    let _scheduler_ticker = scheduler.spawn();

    let state = AppState { store, scheduler, broadcaster: local_broadcaster };
    let app = build_router(state, &config.cors_allowed_origins);

    let addr = std::net::SocketAddr::from((
        config.server_host.parse::<std::net::IpAddr>().unwrap_or([0, 0, 0, 0].into()),
        config.server_port,
    ));
    info!(%addr, "starting wikisurge server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    consumer_cancel.cancel();
    Ok(())
}

fn build_llm_client(config: &AppConfig) -> anyhow::Result<Option<LlmClient>> {
    let Some(provider) = config.llm_provider()? else {
        return Ok(None);
    };

    let default_base_url = match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    };

    let llm_config = LlmConfig {
        provider,
        base_url: config.llm_base_url.clone().unwrap_or_else(|| default_base_url.to_string()),
        api_key: config.llm_api_key.clone(),
        model: config.llm_model.clone(),
        max_tokens: 512,
        temperature: 0.2,
    };

    if !llm_config.enabled() {
        warn!(provider = ?provider, "llm_provider configured but not enabled (missing credentials)");
        return Ok(None);
    }

    Ok(Some(LlmClient::new(llm_config)?))
}
