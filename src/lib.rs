pub mod audio;
pub mod config;
pub mod pipeline;
pub mod retry;
pub mod stt;
mod telemetry;
#[cfg(feature = "vad_earshot")]
pub mod vad_earshot;
pub mod wake;
pub mod wake_rustpotter;

mod app;

pub use app::logging::{init_logging, log_debug, log_debug_content};
pub use pipeline::{Coordinator, InteractionOutcome, PlaybackControl};
pub use telemetry::init_tracing;
pub use wake::{DetectionEvent, KeywordSpotter, SuppressionGate, WakeDetector};
