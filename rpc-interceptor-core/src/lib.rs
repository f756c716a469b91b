//! Core error types for the RPC interceptor pipeline.
//!
//! This crate provides the two failure representations the interceptors
//! translate between, and the mapping that connects them.
//!
//! ## Modules
//!
//! - [`error`]: Wire status codes and the transport [`Status`]
//! - [`domain`]: The internal [`DomainError`] and its [`ErrorKind`]
//! - [`taxonomy`]: The [`ErrorTaxonomy`] mapping and its default table

mod domain;
mod error;
mod taxonomy;

pub use domain::*;
pub use error::*;
pub use taxonomy::*;
