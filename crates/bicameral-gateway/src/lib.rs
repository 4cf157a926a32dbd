//! Bicameral Gateway - adapter registry, admission control, HTTP and live-status transport

pub mod admission;
pub mod auth;
pub mod gateway;
pub mod registry;
pub mod server;
pub mod tasks;
pub mod ws;

pub use admission::{Admission, AdmissionPermit};
pub use auth::ResolvedAuth;
pub use gateway::{Gateway, HealthReport, ANONYMOUS_PLATFORM, PLATFORM_CONTEXT_KEY};
pub use registry::AdapterRegistry;
pub use server::{router, start_gateway, ApiError};
pub use tasks::TaskQueue;
