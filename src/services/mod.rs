//! Services - capture pipeline logic
//!
//! - `configurator` - applies capture settings to an open camera
//! - `attempt` - one open/configure/warm-up/read/release cycle
//! - `pipeline` - retry loop and terminal notification
//! - `scheduler` - daily wall-clock trigger

pub mod attempt;
pub mod configurator;
pub mod pipeline;
pub mod scheduler;

// Re-export commonly used types
pub use attempt::{AttemptGate, CaptureAttempt, CaptureSource, DeviceCapture};
pub use configurator::{ConfigReport, DeviceConfigurator};
pub use pipeline::{CapturePipeline, RunOutcome};
pub use scheduler::Scheduler;
