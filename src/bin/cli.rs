//
// blobbatch command line front end.
//
//! Bulk blob operations against a `file://` or `s3://` store, JSON out.
//!
//! Examples:
//! ```bash
//! blobbatch --store s3://bucket/docs/ upload a.pdf b.pdf https://host/c.pdf -r 2
//! blobbatch --store s3://bucket/docs/ download a.pdf b.pdf -d ./out
//! blobbatch --store s3://bucket/docs/ delete a.pdf b.pdf
//! blobbatch --store file:///srv/blobs copy report.pdf report-copy.pdf
//! blobbatch --store file:///srv/blobs rename draft.pdf final.pdf
//! blobbatch --store file:///srv/blobs list --prefix 2024/ --regex '\.pdf$'
//! blobbatch --store file:///srv/blobs url report.pdf --hours 2
//! blobbatch --store file:///srv/blobs upload-dir ~/Documents --pattern '*.pdf' -R
//! blobbatch local-ls ~/Downloads --pattern '*.pdf'
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::{self, ErrorKind, Write};
use tracing_subscriber::EnvFilter;

use blobbatch::local_fs::list_local_files;
use blobbatch::constants::ENV_STORE_URI;
use blobbatch::{BlobEngine, BlobError, BlobResult, EngineConfig, StoreConfig, UrlPermissions, store_for_uri};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Target store, e.g. s3://bucket/prefix/ or file:///srv/blobs
    #[arg(long, env = ENV_STORE_URI, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload local files or http(s) URLs, retrying failures.
    Upload {
        sources: Vec<String>,
        /// Extra passes over failed uploads (default from BLOBBATCH_RETRY_PASSES).
        #[arg(short = 'r', long)]
        retry_passes: Option<usize>,
    },
    /// Download blobs into a local directory.
    Download {
        names: Vec<String>,
        #[arg(short = 'd', long = "dest")]
        destination: String,
    },
    /// Delete blobs.
    Delete { names: Vec<String> },
    /// Server-side copy of one blob.
    Copy { source: String, destination: String },
    /// Copy then delete the source.
    Rename { source: String, destination: String },
    /// List blobs with optional prefix / name regex.
    List {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        regex: Option<String>,
        /// 0 = unlimited
        #[arg(short = 'n', long, default_value_t = 0)]
        max_results: usize,
    },
    /// Create a point-in-time snapshot of a blob.
    Snapshot { name: String },
    /// Issue a time-limited URL for a blob.
    Url {
        name: String,
        #[arg(long)]
        hours: Option<u32>,
        #[arg(long)]
        no_read: bool,
        #[arg(long)]
        write: bool,
        #[arg(long)]
        delete: bool,
    },
    /// Upload every matching file in a local directory.
    UploadDir {
        directory: String,
        #[arg(long)]
        pattern: Option<String>,
        #[arg(short = 'R', long)]
        recursive: bool,
        #[arg(long = "blob-prefix")]
        blob_prefix: Option<String>,
    },
    /// List a local directory.
    LocalLs {
        directory: String,
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long)]
        no_dirs: bool,
    },
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

/// Library errors become a JSON `error` object; the process still exits 0.
fn render(result: BlobResult<Value>) -> Value {
    match result {
        Ok(v) => v,
        Err(e) => json!({ "success": false, "error": e.to_string() }),
    }
}

async fn run(engine: &BlobEngine, cmd: Command) -> BlobResult<Value> {
    let out = match cmd {
        Command::Upload { sources, retry_passes } => {
            let passes = retry_passes.unwrap_or(engine.config().retry_passes);
            let r = engine.upload_many(&sources, passes).await?;
            json!({
                "success": !r.succeeded.is_empty(),
                "message": r.message("uploaded"),
                "uploadedBlobs": r.succeeded,
                "failedUploads": r.failed,
                "errors": r.errors,
            })
        }
        Command::Download { names, destination } => {
            let r = engine.download_many(&names, &destination).await?;
            json!({
                "message": format!(
                    "Successfully downloaded {}/{} blobs to {}",
                    r.summary.succeeded, r.summary.total, destination
                ),
                "downloadedBlobs": r.succeeded,
                "failedBlobs": r.failed,
            })
        }
        Command::Delete { names } => {
            let r = engine.delete_many(&names).await?;
            json!({
                "success": !r.succeeded.is_empty(),
                "message": r.message("deleted"),
                "deletedBlobs": r.succeeded,
                "failedBlobs": r.failed,
            })
        }
        Command::Copy { source, destination } => {
            let ok = engine.copy(&source, &destination).await?;
            if ok {
                json!({
                    "success": true,
                    "message": format!("Successfully copied blob from '{}' to '{}'", source, destination),
                    "sourceBlobName": source,
                    "destinationBlobName": destination,
                })
            } else {
                json!({
                    "success": false,
                    "error": format!("Failed to copy blob from '{}' to '{}'", source, destination),
                })
            }
        }
        Command::Rename { source, destination } => {
            let ok = engine.rename(&source, &destination).await?;
            if ok {
                json!({
                    "success": true,
                    "message": format!("Blob renamed successfully from '{}' to '{}'", source, destination),
                })
            } else {
                json!({
                    "success": false,
                    "error": format!("Failed to rename blob from '{}' to '{}'", source, destination),
                })
            }
        }
        Command::List { prefix, regex, max_results } => {
            let blobs = engine
                .list_blobs(prefix.as_deref(), regex.as_deref(), max_results)
                .await?;
            json!({
                "message": format!("Found {} blob(s)", blobs.len()),
                "blobs": to_json(&blobs),
            })
        }
        Command::Snapshot { name } => to_json(&engine.create_snapshot(&name).await?),
        Command::Url { name, hours, no_read, write, delete } => {
            let perms = UrlPermissions { read: !no_read, write, delete };
            let url = engine.generate_url(&name, hours, perms).await?;
            let mut v = to_json(&url);
            v["message"] = json!(format!(
                "Successfully generated URL for blob '{}', valid for {} hours",
                name, url.duration_hours
            ));
            v
        }
        Command::UploadDir { directory, pattern, recursive, blob_prefix } => {
            let r = engine
                .upload_directory(&directory, pattern.as_deref(), recursive, blob_prefix.as_deref())
                .await?;
            to_json(&r)
        }
        Command::LocalLs { directory, pattern, no_dirs } => {
            local_ls(&directory, pattern.as_deref(), !no_dirs).await?
        }
    };
    Ok(out)
}

async fn local_ls(directory: &str, pattern: Option<&str>, include_dirs: bool) -> BlobResult<Value> {
    let listing = list_local_files(directory, pattern, include_dirs).await?;
    let mut v = to_json(&listing);
    v["success"] = json!(true);
    v["message"] = json!(format!(
        "Found {} files in {}",
        listing.files.len(),
        listing.path
    ));
    v["totalItems"] = json!(listing.total_items());
    Ok(v)
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = EngineConfig::from_env().context("invalid BLOBBATCH_* configuration")?;

    // local-ls never touches a store.
    if let Command::LocalLs { directory, pattern, no_dirs } = &cli.cmd {
        let out = render(local_ls(directory, pattern.as_deref(), !no_dirs).await);
        safe_println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let Some(store_config) = cli.store.as_deref().filter(|s| !s.is_empty()).map(StoreConfig::new) else {
        let err = BlobError::invalid(format!("no store given: pass --store or set {}", ENV_STORE_URI));
        safe_println!("{}", serde_json::to_string_pretty(&render(Err(err)))?);
        return Ok(());
    };
    let store = store_for_uri(&store_config.uri)
        .await
        .with_context(|| format!("failed to open store {}", store_config.uri))?;

    let engine = BlobEngine::new(store, config);
    let out = render(run(&engine, cli.cmd).await);
    safe_println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
