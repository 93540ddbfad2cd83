pub mod bulk;
pub mod error;
pub mod events;
pub mod history;
pub mod lifecycle;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod ticks;
pub mod validation;
