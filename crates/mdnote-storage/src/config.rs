use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Configuration for the mdnote-storage operator CLI.
#[derive(Parser, Debug, Clone)]
#[command(name = "mdnote-storage")]
#[command(
    about = "Inspect and edit mdnote storage (Google Drive and ephemeral tiers) and session locks"
)]
pub struct Config {
    /// Tenant to operate on; the ephemeral prefix routes to the ephemeral tier
    #[arg(long, env = "MDNOTE_TENANT")]
    pub tenant: String,

    /// Cloudflare account ID (D1, KV and R2)
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    pub cloudflare_account_id: String,

    /// Cloudflare API token (D1 and KV REST APIs)
    #[arg(long, env = "CLOUDFLARE_API_TOKEN")]
    pub cloudflare_api_token: String,

    /// Cloudflare REST API base URL
    #[arg(
        long,
        default_value = "https://api.cloudflare.com/client/v4",
        env = "CLOUDFLARE_API_BASE"
    )]
    pub cloudflare_api_base: String,

    /// D1 database ID (stores the user_tokens table)
    #[arg(long, env = "D1_DATABASE_ID")]
    pub d1_database_id: String,

    /// KV namespace ID for ephemeral records
    #[arg(long, env = "KV_NAMESPACE_ID")]
    pub kv_namespace_id: String,

    /// R2 bucket name for lock records
    #[arg(long, env = "R2_BUCKET_NAME")]
    pub r2_bucket_name: String,

    /// R2 access key ID (for S3-compatible API)
    #[arg(long, env = "R2_ACCESS_KEY_ID")]
    pub r2_access_key_id: String,

    /// R2 secret access key (for S3-compatible API)
    #[arg(long, env = "R2_SECRET_ACCESS_KEY")]
    pub r2_secret_access_key: String,

    /// Key prefix for lock records in R2
    #[arg(long, default_value = "locks/", env = "LOCK_PREFIX")]
    pub lock_prefix: String,

    /// Lock lifetime in seconds
    #[arg(long, default_value_t = 300, env = "LOCK_TTL_SECS")]
    pub lock_ttl_secs: i64,

    /// Tenant ID prefix routed to the ephemeral tier
    #[arg(long, default_value = "ephemeral-", env = "EPHEMERAL_PREFIX")]
    pub ephemeral_prefix: String,

    /// Sliding lifetime of ephemeral records in seconds
    #[arg(long, default_value_t = 3600, env = "EPHEMERAL_TTL_SECS")]
    pub ephemeral_ttl_secs: i64,

    /// Google Drive API base URL
    #[arg(long, default_value = "https://www.googleapis.com", env = "GDRIVE_API_BASE")]
    pub gdrive_api_base: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Get the R2 endpoint URL for S3-compatible API.
    pub fn r2_endpoint(&self) -> String {
        format!(
            "https://{}.r2.cloudflarestorage.com",
            self.cloudflare_account_id
        )
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List direct children of a folder (base folder when omitted)
    Ls {
        #[arg(default_value = "")]
        folder_id: String,
    },
    /// List folders at the top of the drive
    Roots,
    /// Print a file's content
    Cat { file_id: String },
    /// Overwrite a file's content from a local file
    Put {
        file_id: String,
        path: PathBuf,
        /// Last known ETag; empty forces the write
        #[arg(long, default_value = "")]
        etag: String,
    },
    /// Create a note from a local file
    New {
        name: String,
        path: Option<PathBuf>,
        #[arg(long, default_value = "")]
        folder: String,
    },
    /// Create a folder
    Mkdir {
        name: String,
        #[arg(long)]
        parent: Vec<String>,
    },
    /// Delete a file or folder (recursively)
    Rm { file_id: String },
    /// Duplicate a file
    Cp { file_id: String },
    /// Rename a file or folder
    Mv { file_id: String, new_name: String },
    /// Star or unstar an item
    Star {
        file_id: String,
        #[arg(long)]
        off: bool,
    },
    /// List starred items below the base folder
    Starred,
    /// Search notes below the base folder
    Search { query: String },
    /// Get or create a top-level folder and print its ID
    EnsureRoot { name: String },
    /// Set the tenant's base folder in D1
    SetBase { folder_id: String },
    /// Session locks
    Lock {
        #[command(subcommand)]
        action: LockCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum LockCommand {
    Acquire { file_id: String },
    Heartbeat { file_id: String },
    Release { file_id: String },
    Status { file_id: String },
}
