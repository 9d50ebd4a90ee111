//! # docflow-protocol
//!
//! Request protocol for docflow.
//!
//! This crate provides:
//! - Request/Response envelope types
//! - Operation-specific parameter and result types
//! - Stable error codes with HTTP-style statuses
//! - Line-delimited JSON encoding

pub mod codec;
pub mod error;
pub mod message;

pub use codec::jsonl;
pub use error::{ErrorCode, ProtocolError};
pub use message::{
    MessageKind, Operation, Request, Response, ResponseError, ResponseMeta, ResponseStatus,
};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Maximum accepted request line (4 MiB).
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;
