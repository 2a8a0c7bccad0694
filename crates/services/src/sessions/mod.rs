mod controller;
mod runtime;
mod view;

pub use controller::{
    EmptyState, MountReport, Notice, ResumeDecision, SaveOutcome, SessionContext,
    SessionController, SessionPhase,
};
pub use runtime::SessionRuntime;
pub use view::{QuestionView, SessionView};
