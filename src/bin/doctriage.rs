//! CLI binary for doctriage.
//!
//! A thin shim over the library crate that maps subcommands onto
//! `DocumentService` operations and prints results as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doctriage::{DocumentService, InstructionMode, ServiceConfig};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload a document (PDFs are paged immediately)
  doctriage upload statement.pdf

  # List stored documents
  doctriage list

  # Classify page 2 of a document
  doctriage analyze 3fa85f64-5717-4562-b3fc-2c963f66afa6 --page 2

  # Extract fields named by a JSON schema instead of classifying
  doctriage analyze 3fa85f64-5717-4562-b3fc-2c963f66afa6 --fields payslip.fields.json

  # Inspect cached inference results
  doctriage cache list
  doctriage cache show 7c9e6679-7425-40de-944b-e07fc1f90ae7

  # Save a stored page image
  doctriage asset 3fa85f64-5717-4562-b3fc-2c963f66afa6 page.2.jpeg -o page2.jpeg

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  DOCTRIAGE_DATA_DIR      Store root (same as --data-dir)
  RUST_LOG                Log filter, e.g. doctriage=debug
"#;

/// Upload, page, and classify documents with a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "doctriage",
    version,
    about = "Upload, page, and classify documents with a vision model",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Root directory for the document and cache stores.
    #[arg(long, global = true, env = "DOCTRIAGE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Inference model identifier (provider default when omitted).
    #[arg(long, global = true)]
    model: Option<String>,

    /// Inference provider name (auto-detected from the environment when omitted).
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a PDF, JPG, JPEG, or PNG file.
    Upload {
        /// Path of the file to upload.
        file: PathBuf,
    },
    /// List every stored document.
    List,
    /// Analyze one page of a stored document.
    Analyze {
        /// Document identity returned by `upload`.
        document_id: String,
        /// 1-based page to analyze; out-of-range values fall back to page 1.
        #[arg(long)]
        page: Option<usize>,
        /// JSON field schema; switches from classification to extraction.
        #[arg(long)]
        fields: Option<PathBuf>,
    },
    /// Inspect the response cache.
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Fetch a stored page or original image.
    Asset {
        document_id: String,
        /// Asset filename, e.g. `page.1.jpeg` or `original.pdf`.
        filename: String,
        /// Output path; defaults to the asset filename in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// List all cache identities.
    List,
    /// Print one cached inference result.
    Show { cache_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut builder = ServiceConfig::builder().data_dir(&cli.data_dir);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    let config = builder.build()?;
    let service = DocumentService::open(&config).await?;

    match cli.command {
        Command::Upload { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .context("upload path has no filename")?
                .to_string_lossy();
            let receipt = service.upload(&filename, &bytes).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::List => {
            let files = service.list_documents().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "files": files }))?
            );
        }
        Command::Analyze {
            document_id,
            page,
            fields,
        } => {
            let id = doctriage::DocumentId::from_str(&document_id)?;
            let mode = match fields {
                Some(path) => {
                    let schema = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    InstructionMode::Extract {
                        fields: serde_json::from_str(&schema)
                            .with_context(|| format!("parsing {}", path.display()))?,
                    }
                }
                None => InstructionMode::Classify,
            };
            let output = service.analyze(id, page, &mode).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Cache(CacheCommand::List) => {
            let entries = service.cache_entries().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "entries": entries }))?
            );
        }
        Command::Cache(CacheCommand::Show { cache_id }) => {
            let id = doctriage::CacheId::from_str(&cache_id)?;
            let entry = service.cache_entry(id).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::Asset {
            document_id,
            filename,
            output,
        } => {
            let id = doctriage::DocumentId::from_str(&document_id)?;
            let asset = service.asset(id, &filename).await?;
            let out = output.unwrap_or_else(|| PathBuf::from(&filename));
            std::fs::write(&out, &asset.bytes)
                .with_context(|| format!("writing {}", out.display()))?;
            eprintln!(
                "{} ({} bytes, {})",
                out.display(),
                asset.bytes.len(),
                asset.content_type
            );
        }
    }

    Ok(())
}
