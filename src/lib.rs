//! Memoapi - REST service for publishing PDF memos
//!
//! This crate provides the core functionality for Memoapi:
//! - PDF upload validation and blob storage
//! - SQLite storage of memo records
//! - HTTP API for listing, searching, downloading and managing memos
//!
//! # Usage
//!
//! As a library:
//! ```ignore
//! use memoapi::{Config, Core};
//!
//! let config = Config::from_file("~/.memoapi/config.toml").unwrap();
//! let core = Core::new(config).unwrap();
//! // core.start_api_server().await.unwrap();
//! ```
//!
//! As a standalone server (CLI):
//! ```text
//! memoapi --config ~/.memoapi/config.toml
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod memo;
pub mod storage;

// Re-export main types for convenience
pub use config::Config;
pub use db::Database;
pub use error::{CoreError, Result};

use api::{AppState, Credentials, RateLimiter};
use memo::naming::DateStamp;
use memo::MemoService;
use std::sync::Arc;
use storage::FilesystemBlobStore;

/// Main entry point for Memoapi functionality
pub struct Core {
    pub config: Config,
    pub db: Arc<Database>,
    memos: Arc<MemoService>,
    credentials: Option<Arc<Credentials>>,
}

impl Core {
    /// Create a new Core instance with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let db = Arc::new(Database::new(config.database_path())?);
        let blobs = FilesystemBlobStore::new(config.data_dir(), config.storage.upload_dir.clone())?;
        tracing::info!("Storing blobs in {}", blobs.root().display());

        let credentials = Credentials::from_config(&config.auth)?.map(Arc::new);
        if credentials.is_none() {
            tracing::warn!("No upload credentials configured; upload, update and delete are disabled");
        }

        let memos = Arc::new(MemoService::new(
            db.clone(),
            Arc::new(blobs),
            DateStamp::from_policy(config.storage.date_token),
            config.storage.max_upload_bytes,
        ));

        Ok(Core {
            config,
            db,
            memos,
            credentials,
        })
    }

    /// The memo service backing the HTTP API
    pub fn memos(&self) -> &Arc<MemoService> {
        &self.memos
    }

    /// Start the HTTP API server
    pub async fn start_api_server(&self) -> Result<()> {
        let addr = self.config.server_addr();
        tracing::info!("Starting API server on {}", addr);

        let state = AppState {
            memos: self.memos.clone(),
            credentials: self.credentials.clone(),
            rate_limiter: RateLimiter::per_minute(self.config.server.rate_limit_per_minute)
                .map(Arc::new),
            public_url: self.config.server.public_url.clone(),
        };
        api::serve(addr, state).await
    }
}
