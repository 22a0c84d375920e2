//! Confluence Engine Library
//!
//! Multi-timeframe confluence signal engine: analyzes a watchlist on a
//! fixed cadence, emits only high-conviction risk-validated signals, and
//! re-weights its analysis methods from closed outcomes.

pub mod analysis;
pub mod config;
pub mod confluence;
pub mod cooldown;
pub mod error;
pub mod indicators;
pub mod learning;
pub mod market;
pub mod notify;
pub mod outcome;
pub mod pipeline;
pub mod risk;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod types;


// Re-export main types for convenience
pub use analysis::{PressureZoneDetector, TimeframeAnalyzer};
pub use config::EngineConfig;
pub use confluence::{AggregateOutcome, ConfluenceAggregator};
pub use cooldown::{EmissionGate, SkipReason};
pub use error::{EngineError, Result};
pub use learning::LearningEngine;
pub use market::{FundamentalSource, HttpFundamentals, HttpMarketData, MarketData, NeutralFundamentals};
pub use notify::{LogNotifier, NotificationQueue, Notifier, WebhookNotifier};
pub use outcome::OutcomeTracker;
pub use risk::{RiskValidator, Verdict};
pub use scheduler::{CycleReport, Emission, Scheduler, SchedulerState, SymbolStatus};
pub use store::{InMemoryStore, JsonFileStore, RetryPolicy, SignalStore};
pub use types::{
    Action, Candle, EmittedSignal, MethodWeight, PressureZone, RejectionReason, RejectionRecord,
    SignalCandidate, SignalOutcome, Timeframe, TimeframeScore, VolumePoint,
};
