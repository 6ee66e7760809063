//! Response body plumbing
//!
//! Every response uses one boxed body type so buffered and streamed
//! responses can flow through the same handler chain.

use std::io;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Body type shared by every response
pub type Body = BoxBody<Bytes, io::Error>;

pub fn full(chunk: impl Into<Bytes>) -> Body {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

pub fn empty() -> Body {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}
