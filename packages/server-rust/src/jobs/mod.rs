//! Job-protocol adapters.
//!
//! One [`JobHandler`](crate::orchestrator::JobHandler) per manager. Each
//! adapter also builds the job specs its manager enqueues, so payload layout
//! is defined in one place.

pub mod auth;
pub mod tenant;

pub use auth::AuthJobHandler;
pub use tenant::TenantJobHandler;
