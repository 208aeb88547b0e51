pub mod checkpoint_repository;
pub mod database;
pub mod execution_repository;

pub use checkpoint_repository::CheckpointRepository;
pub use database::Database;
pub use execution_repository::{ExecutionRepository, ExecutionStats};
