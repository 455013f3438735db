//! # hashstore
//!
//! An ordered blob store on top of an unordered key/value engine.
//!
//! The bundled [`LogEngine`] keeps an append-only log with a hash index: fast
//! point lookups, but scans come back in no particular order and writes never
//! check for existing keys. [`Store`] closes that gap, offering create-only
//! writes, explicit not-found errors, and listing in ascending key order from
//! any start key with early stop.
//!
//! ## Example
//!
//! ```no_run
//! use hashstore::{BlobStore, Options, PutOptions, Store};
//! use std::ops::ControlFlow;
//!
//! let store = Store::open("blobs", &Options::default())?;
//! store.put(PutOptions::new("greeting", b"hello"))?;
//! assert_eq!(store.get("greeting")?, b"hello");
//!
//! store.list("", |key| {
//!     println!("{key}");
//!     Ok::<_, hashstore::Error>(ControlFlow::Continue(()))
//! })?;
//! store.close()?;
//! # Ok::<(), hashstore::Error>(())
//! ```

pub mod engine;
pub mod opener;
pub mod store;

mod error;

pub use engine::{Engine, EngineOptions, LogEngine, MemoryEngine};
pub use error::{Error, Result};
pub use opener::{open_address, Address};
pub use store::{BlobStore, Options, PutOptions, Store};

/// Log format version
pub const VERSION: u32 = 1;

/// Magic bytes for log file identification
pub const MAGIC: &[u8; 8] = b"HASHSTOR";
