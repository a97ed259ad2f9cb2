use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

use catalog_intake::config::AppConfig;
use catalog_intake::domain::{FileFormat, UploadStatus, Visibility};
use catalog_intake::intake::{IntakeResponse, IntakeService, UploadRequest};
use catalog_intake::logging;

#[derive(Parser)]
#[command(name = "catalog_intake")]
#[command(about = "Load CSV and Excel files into the data catalog as indicators")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage catalog categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Upload a file and process it into indicators
    Upload {
        #[arg(long)]
        file: PathBuf,
        /// csv or excel; guessed from the extension when omitted
        #[arg(long)]
        format: Option<String>,
        /// Target category id
        #[arg(long)]
        category: Uuid,
        /// public or private; defaults to the configured visibility
        #[arg(long)]
        visibility: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// List uploads, newest first
    Uploads {
        /// pending, processing, completed or failed
        #[arg(long)]
        status: Option<String>,
    },
    /// Save the report of a completed upload
    Download {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List,
}

fn write_report(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("writing report {}", path.display()))?;
    Ok(())
}

fn resolve_format(file: &Path, declared: Option<String>) -> Result<String> {
    if let Some(format) = declared {
        return Ok(format);
    }
    let name = file.to_string_lossy();
    match FileFormat::from_file_name(&name) {
        Some(format) => Ok(format.as_str().to_string()),
        None => bail!("cannot guess the format of {}; pass --format", file.display()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let _guard = logging::init_logging(&config.log_dir)?;

    if config.database_path.is_none() {
        warn!("No database configured; catalog state will not outlive this run");
    }
    let service = IntakeService::from_config(&config)?;

    match cli.command {
        Commands::Category { action } => match action {
            CategoryAction::Add { name, description } => {
                let category = service.add_category(&name, &description).await?;
                println!("{}", serde_json::to_string_pretty(&category)?);
            }
            CategoryAction::List => {
                let categories = service.list_categories().await?;
                println!("{}", serde_json::to_string_pretty(&categories)?);
            }
        },
        Commands::Upload {
            file,
            format,
            category,
            visibility,
            user,
        } => {
            let bytes =
                fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let visibility = match visibility {
                Some(v) => v.parse::<Visibility>()?,
                None => config.default_visibility,
            };
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let request = UploadRequest {
                file_name,
                bytes,
                format: resolve_format(&file, format)?,
                category_id: Some(category),
                visibility,
                uploaded_by: user,
            };

            let response = service.upload_and_process(request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            match response {
                IntakeResponse::Success { id, .. } => {
                    let report = service.download_report(id).await?;
                    let path = config.output_dir.join(&report.file_name);
                    write_report(&path, &report.bytes)?;
                    info!("Report written to {}", path.display());
                }
                IntakeResponse::Failure { error } => {
                    error!("Upload failed: {}", error);
                    bail!("upload failed: {}", error);
                }
            }
        }
        Commands::Uploads { status } => {
            let status = status.map(|s| s.parse::<UploadStatus>()).transpose()?;
            let uploads = service.list_uploads(status).await?;
            println!("{}", serde_json::to_string_pretty(&uploads)?);
        }
        Commands::Download { id, out } => {
            let report = service.download_report(id).await?;
            let path = out.unwrap_or_else(|| config.output_dir.join(&report.file_name));
            write_report(&path, &report.bytes)?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
