//! HTTP protocol layer module
//!
//! Request model, conditional and range semantics, negotiation and response
//! builders, decoupled from the handlers that use them.

pub mod body;
pub mod conditional;
pub mod disposition;
pub mod mime;
pub mod negotiate;
pub mod range;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use body::Body;
pub use range::{ByteRange, RangeOutcome};
pub use request::IncomingRequest;
pub use response::{
    build_304_response, build_405_response, build_416_response, build_error_response,
    build_json_response, build_options_response, build_text_response,
};
