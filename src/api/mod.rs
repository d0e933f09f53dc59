//! JSON status API for the dashboard.
//!
//! Read-only views of the live snapshot, ledger and event log, plus two
//! operator actions: queueing a force-close and adjusting parameters.

mod error;
mod handlers;
mod router;

pub use error::ApiError;
pub use router::{create_router, serve, AppState};
