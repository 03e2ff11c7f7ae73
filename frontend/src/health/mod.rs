pub mod handlers;

pub use handlers::{ReadinessResponse, liveness_handler, readiness_handler};
