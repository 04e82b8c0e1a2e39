//! Regional registry server: tenant, system and auth managers over a
//! transactional repository, job orchestration, and the tower operation
//! pipeline that exposes them.

pub mod app;
pub mod jobs;
pub mod lifecycle;
pub mod manager;
pub mod orchestrator;
pub mod repository;
pub mod service;
pub mod telemetry;

pub use app::RegistryApp;
pub use lifecycle::{HealthState, Lifecycle};
pub use service::{Operation, OperationError, OperationResponse, RegistryConfig};
