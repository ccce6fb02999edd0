//! `aies-store`: persistence backends for the schedule document.
//!
//! | Backend   | Medium                                   |
//! |-----------|------------------------------------------|
//! | `sqlite`  | one row in the `documents` table         |
//! | `json`    | one file, atomically replaced            |
//! | `memory`  | process memory (tests, ephemeral setups) |
//!
//! All backends store the same versioned envelope (see [`envelope`]).

pub mod db;
pub mod envelope;
pub mod error;
pub mod file;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{open_store, DocumentStore};
