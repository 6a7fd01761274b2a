mod routes;

pub mod app;
pub mod config;
pub mod error;
pub mod interpret;
pub mod prediction;
pub mod preprocess;
pub mod server;
pub mod telemetry;

pub use app::start_app;
pub use server::{build_router, SharedState};
