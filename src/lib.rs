//! Browse and manage a flat object store as if it had folders.
//!
//! The host application installs a `log` backend, loads an [`AppConfig`], and
//! drives a [`StorageManager`]; everything it renders comes from the manager's
//! `watch`/`broadcast` subscriptions.

pub mod config;
pub mod error;
pub mod listing;
pub mod manager;
pub mod mutator;
pub mod navigation;
pub mod notify;
pub mod preview;
pub mod provider;
pub mod s3;
pub mod sync;
pub mod transfer;
pub mod tree;

pub use config::{AppConfig, ConfigStore, S3Credentials, Theme};
pub use error::{AppError, ErrorKind, FailedItem, Result};
pub use manager::StorageManager;
pub use provider::ProviderType;
pub use s3::client::S3ClientManager;
pub use s3::gateway::ObjectStore;
pub use transfer::TransferOptions;
