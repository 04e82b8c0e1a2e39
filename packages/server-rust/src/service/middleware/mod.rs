//! Tower middleware layers for the operation pipeline.
//!
//! - [`load_shed`]: semaphore-based concurrency limiting
//! - [`timeout`]: per-operation deadlines
//! - [`instrument`]: tracing spans with duration and outcome
//! - [`pipeline`]: composes the layers around the router

pub mod instrument;
pub mod load_shed;
pub mod pipeline;
pub mod timeout;

pub use instrument::InstrumentLayer;
pub use load_shed::LoadShedLayer;
pub use pipeline::{build_operation_pipeline, OperationPipeline};
pub use timeout::TimeoutLayer;
