//! Adapters - Infrastructure Implementations
//!
//! This crate contains the implementations of the ports defined in
//! jobledger-ports: the MongoDB-backed stores and an in-memory variant
//! sharing the same semantics.

pub mod config;
pub mod memory;
pub mod mongo;
pub mod observability;

pub use crate::config::{AppConfig, ConfigError, LoggingConfig, MongoConfig};
pub use crate::memory::{
    InMemoryDatabase, InMemoryExecutionContextRepository, InMemoryJobExecutionRepository,
    InMemoryJobInstanceRepository, InMemorySequenceGenerator, InMemoryStepExecutionRepository,
};
pub use crate::mongo::{
    MongoExecutionContextRepository, MongoJobExecutionRepository, MongoJobInstanceRepository,
    MongoSequenceGenerator, MongoStepExecutionRepository,
};
pub use crate::observability::init_tracing;
