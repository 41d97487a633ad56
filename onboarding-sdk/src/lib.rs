//! Shared model for the onboarding workflow engine.
//!
//! Holds the data types, the collaborator traits the engine consumes, the
//! error taxonomy and the structured event stream. Engine logic lives in
//! the `onboarding-engine` crate.

pub mod clock;
pub mod collaborators;
pub mod error;
pub mod events;
pub mod types;

// Re-export async trait for collaborator implementations
pub use async_trait::async_trait;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{HireDirectory, Notifier, TaskStore, TemplateSource};
pub use error::{EngineError, EngineResult, EntityKind};
pub use events::{EngineEvent, EventBus};
pub use types::*;
