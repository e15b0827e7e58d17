//! Transport boundary.
//!
//! This module contains no framework-specific code. Framework integrations
//! build a [`RawRequest`] from their native request, hand it to
//! [`Pipeline::handle`](crate::pipeline::Pipeline::handle) and write back the
//! returned [`Response`](crate::pipeline::Response).
//!
//! # Integration Model
//!
//! 1. Build a `RawRequest` with the route the framework resolved
//! 2. Attach the body, ordinary parameters and connection metadata
//! 3. Call `Pipeline::handle`
//! 4. Write `status`, `headers` and `body()` to the wire
//!
//! Decoding into the input mapping happens inside the pipeline through
//! [`decode_input`].

mod adapter;
mod decode;

pub use adapter::RawRequest;
pub(crate) use adapter::RawParts;
pub use decode::{decode_input, strip_tags};
