//! Series analysis: per-timeframe scoring and pressure zones

pub mod detectors;
pub mod pressure;
pub mod timeframe;

pub use pressure::{PressureConfig, PressureZoneDetector};
pub use timeframe::{AnalyzerConfig, TimeframeAnalyzer};
