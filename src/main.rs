use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use recon_fields::config::Config;
use recon_fields::db::SqliteMetadataStore;
use recon_fields::logging;
use recon_fields::pipeline::{AddPipeline, RemovePipeline, RunSummary};
use recon_fields::report;
use recon_fields::transaction::FsTransactionService;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "recon_fields")]
#[command(about = "Batch add or remove reconciliation fields on a resource object")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to recon_fields.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add the fields listed in a delimited file
    Add {
        /// Resource object name
        #[arg(long)]
        object: String,
        /// Add file with a ReconFieldName,FieldType[,isRequired] header
        #[arg(long)]
        file: PathBuf,
        /// Column delimiter (overrides input.delimiter)
        #[arg(long)]
        delimiter: Option<String>,
    },
    /// Remove the fields listed one per line in a file
    Remove {
        #[arg(long)]
        object: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Write the object's single-valued fields as an add file
    Export {
        #[arg(long)]
        object: String,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        delimiter: Option<String>,
    },
    /// List resource objects
    ListObjects,
    /// List every recon field of a resource object
    ListFields {
        #[arg(long)]
        object: String,
    },
}

/// Keep the document of a failed import so it can be re-imported by hand
fn write_recovery_file(dir: &Path, object: &str, xml: &str) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating recovery dir {}", dir.display()))?;
    let safe_name: String = object
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let path = dir.join(format!("{}-{}.xml", safe_name, Utc::now().format("%Y%m%dT%H%M%S")));
    fs::write(&path, xml).with_context(|| format!("writing recovery file {}", path.display()))?;
    Ok(path)
}

fn print_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("\n📊 Results for {} (key {}):", summary.object.name, summary.object.key);
    println!("   Rows read: {}", summary.rows_read);
    println!("   Staged: {}", summary.staged.len());
    for name in &summary.staged {
        println!("     + {}", name);
    }
    println!("   Rejected: {}", summary.rejected.len());
    for row in &summary.rejected {
        println!("     - line {}: {} ({})", row.line_number, row.value, row.reason);
    }
    match &summary.import_label {
        Some(label) if summary.import_submitted => println!("   ✅ Import submitted as {}", label),
        _ => println!("   ⚠️  Nothing to import"),
    }
    Ok(())
}

/// Save the payload of a failed import. When the recovery file cannot be
/// written the document is echoed to stderr instead.
fn save_payload(dir: &Path, object: &str, xml: &str) -> Option<PathBuf> {
    match write_recovery_file(dir, object, xml) {
        Ok(path) => {
            error!("Import failed; document saved to {}", path.display());
            eprintln!("💾 Unimported document saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("Import failed and the document could not be saved: {:#}", e);
            eprintln!("⚠️  Could not save the unimported document ({:#}). Document follows:", e);
            eprintln!("{}", xml);
            None
        }
    }
}

/// Report a pipeline result, saving the payload of a failed import first
fn finish_run(
    result: recon_fields::error::Result<RunSummary>,
    object: &str,
    config: &Config,
    json: bool,
) -> anyhow::Result<()> {
    match result {
        Ok(summary) => print_summary(&summary, json),
        Err(e) => {
            if let Some(xml) = e.payload() {
                save_payload(&config.transactions.recovery_dir, object, xml);
            }
            Err(anyhow::Error::new(e).context(format!("run for resource object '{}' failed", object)))
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let _guard = logging::init_logging(&config.logging)?;

    let store = SqliteMetadataStore::open(&config.store.path)
        .with_context(|| format!("opening metadata store {}", config.store.path.display()))?;
    info!("Using transaction root {}", config.transactions.root.display());

    match cli.command {
        Commands::Add {
            object,
            file,
            delimiter,
        } => {
            let transactions = FsTransactionService::new(&config.transactions.root);
            let delimiter = delimiter.unwrap_or_else(|| config.input.delimiter.clone());
            let result = AddPipeline::new(&store, &transactions, &delimiter).run(&object, &file);
            finish_run(result, &object, &config, cli.json)?;
        }
        Commands::Remove { object, file } => {
            let transactions = FsTransactionService::new(&config.transactions.root);
            let result = RemovePipeline::new(&store, &transactions).run(&object, &file);
            finish_run(result, &object, &config, cli.json)?;
        }
        Commands::Export {
            object,
            output,
            delimiter,
        } => {
            let delimiter = delimiter.unwrap_or_else(|| config.input.delimiter.clone());
            let summary = report::export_report(&store, &object, &output, Some(&delimiter))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "📝 Wrote {} recon fields of {} to {}",
                    summary.fields_written,
                    summary.object.name,
                    summary.output.display()
                );
            }
        }
        Commands::ListObjects => {
            let objects = report::list_objects(&store)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&objects)?);
            } else {
                println!("{:<10} {:<20} NAME", "KEY", "TYPE");
                for object in &objects {
                    println!(
                        "{:<10} {:<20} {}",
                        object.key,
                        object.object_type.as_deref().unwrap_or("-"),
                        object.name
                    );
                }
            }
        }
        Commands::ListFields { object } => {
            let (handle, fields) = report::list_object_fields(&store, &object)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&fields)?);
            } else {
                println!("Recon fields of {} (key {}):", handle.name, handle.key);
                println!("{:<10} {:<30} TYPE", "KEY", "NAME");
                for field in &fields {
                    println!("{:<10} {:<30} {}", field.key, field.name, field.field_type);
                }
            }
        }
    }

    Ok(())
}
