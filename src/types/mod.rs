//! Shared types for the storage adapter

pub mod error;

pub use error::{InvalidArgument, Result, StorageError};
