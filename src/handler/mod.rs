//! Request handler module
//!
//! Dispatch, the static asset middleware with its file streamer, and the
//! uploads endpoint.

pub mod fs;
pub mod router;
pub mod static_files;
pub mod stream;
pub mod upload;
pub mod variant;

// Re-export main entry point
pub use router::handle_request;
