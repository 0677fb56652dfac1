pub mod config;
pub mod database;
pub mod job_repository;
pub mod notify;
pub mod source_repository;
pub mod task_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use job_repository::TaskJobRepository;
pub use notify::{NotifyPublisher, TaskEvent, TaskListener};
pub use source_repository::{NewSource, SourceRepository};
pub use task_repository::TaskRepository;
