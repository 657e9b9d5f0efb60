pub mod ingest;
pub mod session;

pub use ingest::{LocationReport, LocationTarget, TrackingGateway};
pub use session::{LocationOutcome, SessionManager};
