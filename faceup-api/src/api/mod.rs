//! HTTP API handlers for faceup-api

pub mod billing;
pub mod health;
pub mod scan;
pub mod sse;
pub mod upload;

pub use billing::billing_routes;
pub use health::health_routes;
pub use scan::scan_routes;
pub use sse::sse_routes;
pub use upload::upload_routes;
