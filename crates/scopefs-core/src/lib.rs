//! scopefs Core Library
//!
//! Sandboxed access to a user-chosen directory tree for an untrusted client:
//! - Path validation against traversal, absolute and sensitive paths
//! - Persisted directory grants that survive restarts
//! - An active-grant state machine with per-operation permission checks
//! - List/read/write with size and type limits, plus one-shot picker access
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       scopefs-core                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commands.rs   - Flat JSON command surface                  │
//! │  sandbox/      - Validation, grants, host traits, access    │
//! │  storage/      - SQLite grant store, migrations             │
//! │  types/        - Shared type definitions                    │
//! │  config.rs     - Access configuration                       │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod sandbox;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::AccessConfig;
pub use error::{Error, ErrorKind, Result};
pub use types::*;

pub use commands::CommandRouter;

// Re-export sandbox components
pub use sandbox::{
    DirectoryGrantManager, FileAccessService, HostProvider, LocalHost, PathValidator,
    ScriptedPicker,
};

// Re-export storage
pub use storage::{GrantStore, SqliteGrantStore, Storage};
