//! Static asset and upload server
//!
//! Trusted proxy resolution, conditional and ranged file delivery with
//! pre-compressed variants, and multipart ingestion on top of hyper.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod multipart;
pub mod server;
pub mod trust;
