//! Cross-cutting services module
//!
//! Observability and view projection around the sequence runner.

pub mod events;
pub mod metrics;
pub mod presentation;

// Re-export commonly used types
pub use events::{
    ChallengeEvent, EventDispatcher, EventHandler, LoggingHandler, MetricsHandler, RunEvent,
    RunnerEvent, StepEvent,
};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use presentation::{COMPLETED_MESSAGE, DisplayState, parse_target};
