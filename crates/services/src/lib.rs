#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod launcher;
pub mod progress;
pub mod questions;
pub mod sessions;
pub mod tab_scope;
pub mod telemetry;

pub use exam_core::Clock;

pub use app_services::AppServices;
pub use config::EngineConfig;
pub use error::{AppServicesError, ConfigError, ControllerError, LaunchError, SupplierError};
pub use launcher::{Launch, SimulationLauncher};
pub use progress::{ConflictResolver, ProgressStore, ResetReport, SaveReport};
pub use questions::QuestionSupplier;
pub use sessions::{
    EmptyState, MountReport, Notice, QuestionView, ResumeDecision, SaveOutcome, SessionContext,
    SessionController, SessionPhase, SessionRuntime, SessionView,
};
pub use tab_scope::{LaunchToken, Milestone, TabScope};
pub use telemetry::{
    FanoutTelemetry, MilestoneTracker, RecordingTelemetry, TelemetryEvent, TelemetryKind,
    TelemetrySink, TracingTelemetry,
};
