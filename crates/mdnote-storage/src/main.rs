mod config;

use std::process::ExitCode;
use std::sync::Arc;

use aws_config::Region;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials};
use clap::Parser;
use mdnote_session_lock::R2LockManager;
use mdnote_storage::{D1Directory, HybridProvider};
use mdnote_storage_core::{ErrorKind, LockManager, StorageError, StorageProvider};
use mdnote_storage_ephemeral::{KvClient, KvItemStore};
use mdnote_storage_gdrive::GDriveClient;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::{Command, Config, LockCommand};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    debug!("Tenant {} via {}", config.tenant, config.gdrive_api_base);

    let directory = Arc::new(
        D1Directory::new(
            config.cloudflare_account_id.clone(),
            config.cloudflare_api_token.clone(),
            config.d1_database_id.clone(),
        )
        .with_base_url(&config.cloudflare_api_base),
    );

    let kv = KvClient::new(
        config.cloudflare_account_id.clone(),
        config.kv_namespace_id.clone(),
        config.cloudflare_api_token.clone(),
    )
    .with_base_url(&config.cloudflare_api_base);

    let provider = HybridProvider::with_directory(
        directory.clone(),
        Arc::new(GDriveClient::with_base_url(&config.gdrive_api_base)),
        Arc::new(KvItemStore::new(kv)),
        chrono::Duration::seconds(config.ephemeral_ttl_secs),
    )
    .with_prefix(&config.ephemeral_prefix);
    info!(
        "Tenant {} served by the {} tier",
        config.tenant,
        provider.backend_for(&config.tenant).as_str()
    );

    let result = match &config.command {
        Command::Lock { action } => run_lock(&config, action).await,
        Command::SetBase { folder_id } => {
            directory.update_base_folder(&config.tenant, folder_id).await
        }
        command => run_storage(&provider, &config.tenant, command).await,
    };

    Ok(match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error[{}]: {}", e.kind().code(), e);
            ExitCode::from(exit_code(e.kind()))
        }
    })
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::NotFound => 2,
        ErrorKind::Conflict => 3,
        ErrorKind::Locked => 4,
        ErrorKind::Validation => 5,
        ErrorKind::Unavailable => 6,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), StorageError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_local(path: &std::path::Path) -> Result<Vec<u8>, StorageError> {
    tokio::fs::read(path).await.map_err(|e| {
        StorageError::InvalidArgument(format!("Cannot read {}: {}", path.display(), e))
    })
}

async fn run_storage(
    provider: &HybridProvider,
    tenant: &str,
    command: &Command,
) -> Result<(), StorageError> {
    let adapter = provider.get_adapter(tenant).await?;

    match command {
        Command::Ls { folder_id } => print_json(&adapter.list_files(folder_id).await?),
        Command::Roots => print_json(&adapter.list_root_folders().await?),
        Command::Cat { file_id } => {
            let file = adapter.get_file(file_id).await?;
            eprintln!("etag: {}", file.metadata.etag);
            println!("{}", String::from_utf8_lossy(&file.content));
            Ok(())
        }
        Command::Put {
            file_id,
            path,
            etag,
        } => {
            let content = read_local(path).await?;
            print_json(&adapter.save_file(file_id, &content, etag).await?)
        }
        Command::New { name, path, folder } => {
            let content = match path {
                Some(path) => read_local(path).await?,
                None => Vec::new(),
            };
            print_json(&adapter.create_file(name, &content, folder).await?)
        }
        Command::Mkdir { name, parent } => print_json(&adapter.create_folder(name, parent).await?),
        Command::Rm { file_id } => adapter.delete_file(file_id).await,
        Command::Cp { file_id } => print_json(&adapter.duplicate_file(file_id).await?),
        Command::Mv { file_id, new_name } => {
            print_json(&adapter.rename_file(file_id, new_name).await?)
        }
        Command::Star { file_id, off } => print_json(&adapter.set_starred(file_id, !off).await?),
        Command::Starred => print_json(&adapter.list_starred().await?),
        Command::Search { query } => print_json(&adapter.search_files(query).await?),
        Command::EnsureRoot { name } => {
            println!("{}", adapter.ensure_root_folder(name).await?);
            Ok(())
        }
        Command::SetBase { .. } | Command::Lock { .. } => Err(StorageError::InvalidArgument(
            "not a storage command".to_string(),
        )),
    }
}

async fn run_lock(config: &Config, action: &LockCommand) -> Result<(), StorageError> {
    let credentials = Credentials::new(
        &config.r2_access_key_id,
        &config.r2_secret_access_key,
        None,
        None,
        "r2",
    );

    // Transient failures surface to the caller; the SDK must not retry.
    let s3_config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(credentials)
        .region(Region::new("auto"))
        .endpoint_url(config.r2_endpoint())
        .force_path_style(true)
        .retry_config(RetryConfig::disabled())
        .build();

    let locks = R2LockManager::new(
        aws_sdk_s3::Client::from_conf(s3_config),
        config.r2_bucket_name.clone(),
    )
    .with_prefix(&config.lock_prefix)
    .with_ttl(chrono::Duration::seconds(config.lock_ttl_secs));

    let user = config.tenant.as_str();
    match action {
        LockCommand::Acquire { file_id } => print_json(&locks.acquire_lock(file_id, user).await?),
        LockCommand::Heartbeat { file_id } => print_json(&locks.heartbeat(file_id, user).await?),
        LockCommand::Release { file_id } => locks.release_lock(file_id, user).await,
        LockCommand::Status { file_id } => print_json(&locks.get_lock_status(file_id).await?),
    }
}
