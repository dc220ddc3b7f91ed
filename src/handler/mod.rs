//! Request handler module
//!
//! Responsible for request routing dispatch and the assembly validation
//! endpoint.

pub mod router;
pub mod validate;

// Re-export main entry point
pub use router::handle_request;
