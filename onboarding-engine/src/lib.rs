//! Onboarding workflow engine.
//!
//! Turns workflow templates into per-hire task lists, drives task state
//! transitions, evaluates automation rules on a schedule and runs bulk
//! administrative operations across many hires.

// Template checks and dependency layering
pub mod catalog;
pub mod dependency;
pub mod targeting;

// Per-hire task generation and state
pub mod lifecycle;
pub mod locks;
pub mod materializer;

// Rules and scheduled scans
pub mod automation;
pub mod scheduler;

// Bulk operations
pub mod batch;
pub mod bulk;

// Storage backends
pub mod database;
pub mod memory;

pub mod cli;
pub mod config;
pub mod engine;

pub use automation::{AutomationEngine, ScanReport};
pub use bulk::{BulkCoordinator, BulkReport, HireOutcome, HireResult};
pub use catalog::{builtin_templates, TemplateCatalog, TemplateState};
pub use config::EngineConfig;
pub use database::SqliteTaskStore;
pub use engine::{EngineBuilder, OnboardingEngine};
pub use lifecycle::{AppliedWorkflow, LifecycleManager, TransitionOutcome};
pub use materializer::{materialize, MaterializationPlan, SkipReason, SkippedTask};
pub use memory::{LogNotifier, MemoryHireDirectory, MemoryNotifier, MemoryTaskStore};
pub use scheduler::{AutomationScheduler, TickOutcome};
