pub mod engine;
pub mod registry;
pub mod watch;

pub use engine::{LoopStart, MonitorEngine};
pub use registry::{MonitorRegistry, RuntimeState};
pub use watch::{foreground_definition, watch_foreground, WatchError};
