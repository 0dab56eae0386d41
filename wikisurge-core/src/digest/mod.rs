//! Digest collection, rendering, and scheduling: periodic email summaries
//! of global trending activity and per-user watchlists.

pub mod collector;
pub mod model;
pub mod render;
pub mod scheduler;
pub mod traits;

pub use collector::Collector;
pub use model::{
    DigestContent, DigestData, DigestFrequency, DigestPeriod, Highlight, HighlightKind,
    LanguageShare, UserRecord, WatchlistEvent,
};
pub use render::{render_digest, subject_for};
pub use scheduler::{RunResult, Scheduler, SchedulerConfig};
pub use traits::{EmailTransport, UserStore};
