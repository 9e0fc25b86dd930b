//! Permission-scoped file access
//!
//! This module provides:
//! - Path validation for client-supplied relative paths
//! - Host capability traits and a local filesystem host
//! - The directory grant manager (active grant state machine)
//! - The file access service built on top of both

mod access;
mod content;
pub mod grants;
pub mod host;
mod local;
mod resolver;
pub mod validation;

pub use access::FileAccessService;
pub use grants::DirectoryGrantManager;
pub use host::{
    AccessMode, DirectoryHandle, FileHandle, HostProvider, PermissionState, PickerOptions,
    WritableStream,
};
pub use local::{LocalHost, Picker, ScriptedPicker};
pub use resolver::{EphemeralResolver, FileResolver, GrantResolver, ResolverKind};
pub use validation::{PathValidator, ValidatedPath};
