pub mod aggregator;
pub mod config;
pub mod deployment;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod models;
pub mod notifier;
pub mod price;
pub mod query;
pub mod reconstructor;
pub mod report;
pub mod repository;
pub mod rpc;
pub mod scanner;

pub use aggregator::{ActivityAggregator, ActivityBatch, AggregatorSettings, LoadMore};
pub use config::{Config, Deployment};
pub use error::FetchError;
pub use models::{Asset, Checkpoint, ExecutionRecord, ExecutionStep, StepKind, TokenTransfer};
pub use rpc::{ChainSource, LogQuery, RpcClient};
