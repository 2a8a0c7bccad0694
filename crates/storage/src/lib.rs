#![forbid(unsafe_code)]

pub mod remote;
pub mod repository;
pub mod sample;
pub mod sqlite;

pub use remote::{RemoteProgressRow, RemoteProgressStore};
pub use repository::{
    InMemoryProgressRepository, InMemoryQuestionBank, ProgressRepository, QuestionCatalog,
    QuestionQuery, QuestionSource, Storage, StorageError,
};
