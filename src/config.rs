//! Configuration for the storage adapter
//!
//! CLI arguments and environment variables via clap, plus the module-scoped
//! overrides (`<MODULE>_MONGODB_URL`, `<MODULE>_MONGODB_DATABASE`) that let
//! several modules share one process while pointing at different databases.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::storage::DEFAULT_PAGE_SIZE;

/// MongoDB-backed blob and list storage
#[derive(Parser, Debug, Clone)]
#[command(name = "storage-mongodb")]
#[command(about = "Blob and list storage on top of MongoDB")]
pub struct Args {
    /// Module name used to look up `<MODULE>_MONGODB_URL` / `<MODULE>_MONGODB_DATABASE`
    #[arg(long, env = "STORAGE_MODULE")]
    pub module: Option<String>,

    /// MongoDB connection URL
    #[arg(long, env = "MONGODB_URL", default_value = "mongodb://localhost:27017")]
    pub mongodb_url: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DATABASE", default_value = "dashboard")]
    pub database: String,

    /// Default page size for list reads
    #[arg(long, env = "PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Enable test-only operations such as flush
    #[arg(long, env = "STORAGE_TEST_MODE", default_value = "false")]
    pub test_mode: bool,

    /// Use an in-process store instead of connecting to MongoDB
    #[arg(long)]
    pub memory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Blob operations
    #[command(subcommand)]
    Blob(BlobCommand),

    /// List operations
    #[command(subcommand)]
    List(ListCommand),

    /// Delete all stored data (test mode only)
    Flush,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BlobCommand {
    Exists { key: String },
    Read { key: String },
    /// Read `prefix/key` for each key
    ReadMany {
        prefix: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Write binary contents to a file
    ReadBinary { key: String, output: PathBuf },
    Write {
        key: String,
        /// Text contents; an empty string is valid
        #[arg(long)]
        contents: Option<String>,
    },
    /// Store a file's bytes
    WriteBinary { key: String, input: PathBuf },
    Delete { key: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ListCommand {
    Add { path: String, itemid: String },
    /// Bulk add `path=itemid` pairs
    AddMany {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    Count { path: String },
    Exists { path: String, itemid: String },
    List {
        path: String,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,
        #[arg(long)]
        page_size: Option<u32>,
    },
    ListAll { path: String },
    Remove { path: String, itemid: String },
}

/// Resolved settings for one storage context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub mongodb_url: String,
    pub database: String,
    pub page_size: u32,
    pub test_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mongodb_url: "mongodb://localhost:27017".to_string(),
            database: "dashboard".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            test_mode: false,
        }
    }
}

fn module_key(module: &str, suffix: &str) -> String {
    format!("{}_{}", module.to_uppercase().replace('-', "_"), suffix)
}

impl StorageConfig {
    /// Apply module-scoped overrides from `lookup` on top of `self`
    pub fn resolve<F>(mut self, module: Option<&str>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(module) = module.filter(|m| !m.is_empty()) else {
            return self;
        };

        if let Some(url) = lookup(&module_key(module, "MONGODB_URL")).filter(|v| !v.is_empty()) {
            self.mongodb_url = url;
        }
        if let Some(db) = lookup(&module_key(module, "MONGODB_DATABASE")).filter(|v| !v.is_empty())
        {
            self.database = db;
        }
        self
    }

    /// Apply module-scoped overrides from the process environment
    pub fn resolve_env(self, module: Option<&str>) -> Self {
        self.resolve(module, |key| std::env::var(key).ok())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.mongodb_url.trim().is_empty() {
            return Err("MONGODB_URL must not be empty".to_string());
        }
        if self.database.trim().is_empty() {
            return Err("MONGODB_DATABASE must not be empty".to_string());
        }
        if self.page_size == 0 {
            return Err("PAGE_SIZE must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Args {
    /// Storage settings with module-scoped overrides applied
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            mongodb_url: self.mongodb_url.clone(),
            database: self.database.clone(),
            page_size: self.page_size,
            test_mode: self.test_mode,
        }
        .resolve_env(self.module.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_module_override_wins() {
        let config = StorageConfig::default().resolve(
            Some("organizations"),
            lookup(&[
                ("ORGANIZATIONS_MONGODB_URL", "mongodb://orgs:27017"),
                ("ORGANIZATIONS_MONGODB_DATABASE", "orgs"),
            ]),
        );
        assert_eq!(config.mongodb_url, "mongodb://orgs:27017");
        assert_eq!(config.database, "orgs");
    }

    #[test]
    fn test_falls_back_to_global_values() {
        let config = StorageConfig::default().resolve(
            Some("stripe-connect"),
            lookup(&[("OTHER_MONGODB_URL", "mongodb://other")]),
        );
        assert_eq!(config, StorageConfig::default());
    }

    #[test]
    fn test_module_key_normalizes_name() {
        assert_eq!(module_key("stripe-connect", "MONGODB_URL"), "STRIPE_CONNECT_MONGODB_URL");
    }

    #[test]
    fn test_validate() {
        assert!(StorageConfig::default().validate().is_ok());

        let config = StorageConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StorageConfig {
            database: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_list_command() {
        let args = Args::try_parse_from([
            "storage-mongodb",
            "--memory",
            "list",
            "list",
            "users/42/orders",
            "--offset",
            "-1",
        ])
        .unwrap();

        assert!(args.memory);
        match args.command {
            Command::List(ListCommand::List { path, offset, page_size }) => {
                assert_eq!(path, "users/42/orders");
                assert_eq!(offset, -1);
                assert_eq!(page_size, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
