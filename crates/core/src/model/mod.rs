mod descriptor;
mod ids;
mod progress;
mod question;

pub use descriptor::{DescriptorError, ModeParams, PageWindow, SimulationDescriptor, SimulationMode};
pub use ids::{ParseIdError, QuestionId, SetId, SimulationId, StoryId, TopicId, UserId};
pub use progress::{ProgressDraft, ProgressRecord, ProgressRecordError};
pub use question::{Difficulty, Question, QuestionError, QuestionTags, QuestionType};
