//! Execution Environment Module
//!
//! Container images and execution sites referenced by job templates. Both
//! are opaque to the graph builder and passed through to the emitted
//! workflow document unchanged.

pub mod container;
pub mod site;

pub use container::{Container, ContainerKind};
pub use site::{Arch, Directory, DirectoryKind, OsType, Site};
