//! The API layer, containing web handlers and routing.

pub mod handlers;
pub mod router;

pub use handlers::{ApiDoc, FETCH_MISSING_JOB};
pub use router::create_router;
