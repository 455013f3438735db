//! Ordered blob store
//!
//! This module implements the blob store contract on top of a raw engine:
//! create-only and replacing writes, not-found reporting, and ordered listing
//! from a start key.

mod adapter;
mod blob;

pub use adapter::{Options, Store};
pub use blob::{BlobStore, PutOptions};
