//! Core type definitions for scopefs
//!
//! Grant records persisted by the store, the file views returned by the
//! access layer, and the flat response records handed to callers.

mod file_types;
mod grant_types;
mod response_types;

pub use file_types::*;
pub use grant_types::*;
pub use response_types::*;
