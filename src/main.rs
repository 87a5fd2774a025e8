use clap::{Parser, Subcommand};
use colored::*;
use gateway_specs::backend::validate_backend_file;
use gateway_specs::clean::clean;
use gateway_specs::config::{GatewayConfig, Layout};
use gateway_specs::convert::{convert_gateway_specs, NpxTools};
use gateway_specs::error::{AppError, AppResult};
use gateway_specs::gateway::{preview, GatewaySpecBuilder};
use gateway_specs::postman::PostmanClient;
use gateway_specs::preserve::{preserve_scripts, ScriptSource};
use gateway_specs::publish::push_all;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(version, about = "Build gateway OpenAPI specs and keep Postman collections in sync")]
struct Args {
    /// Repository root containing services/, gateway/ and postman-collections/
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Postman API key
    #[arg(long, env = "POSTMAN_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge service specs into one spec per gateway
    Merge {
        /// Show a diff against the specs on disk instead of writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Convert gateway specs to Swagger 2.0 and validate backend annotations
    Convert,
    /// Check the x-google-backend annotations of a single document
    Validate {
        /// Swagger document to check
        file: PathBuf,
    },
    /// Carry test and pre-request scripts over into regenerated collections
    PreserveScripts {
        /// Read previous collections from this directory instead of the Postman API
        #[arg(long)]
        from_dir: Option<PathBuf>,
    },
    /// Publish generated collections to Postman
    Push {
        /// Log what would be created or updated without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove generated gateway specs and intermediate files
    Clean,
}

impl Commands {
    /// Exit status used when the command fails. Publishing never blocks the
    /// workflow that runs it; everything else does.
    fn failure_code(&self) -> i32 {
        match self {
            Commands::Push { .. } => 0,
            _ => 1,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    let failure_code = args.command.failure_code();
    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("{} {}", "[FAIL]".white().on_red(), e.to_string().red());
        if failure_code == 0 {
            warn!("Continuing workflow without Postman updates...");
        }
        process::exit(failure_code);
    }
}

async fn run(args: Args) -> AppResult<()> {
    let layout = Layout::from_root(&args.root);
    info!("Starting gateway-specs in {}", args.root.display());

    match args.command {
        Commands::Merge { dry_run } => {
            let config_path = layout.config_path();
            if !config_path.exists() {
                return Err(AppError::Config(format!("Gateway config not found: {}", config_path.display())));
            }
            let config = GatewayConfig::from_file(&config_path)?;
            let tools = NpxTools;
            let builder = GatewaySpecBuilder::new(&layout, &tools);
            let built = builder.build_all(&config)?;
            if dry_run {
                preview(&built)?;
                println!("Dry run completed successfully. No files were written.");
            } else {
                let written = builder.write_all(&built)?;
                println!("Generated {} gateway specs.", written.len());
            }
        }
        Commands::Convert => {
            let written = convert_gateway_specs(&NpxTools, &layout.gateway_dir)?;
            println!("Converted and validated {} gateway specs.", written.len());
        }
        Commands::Validate { file } => {
            let count = validate_backend_file(&file)?;
            println!("{}: {} x-google-backend annotations, all with an address.", file.display(), count);
        }
        Commands::PreserveScripts { from_dir } => {
            let report = match from_dir {
                Some(dir) => preserve_scripts(ScriptSource::Directory(dir), &layout).await?,
                None => {
                    let client = PostmanClient::from_key(args.api_key.as_deref())?;
                    preserve_scripts(ScriptSource::Postman(&client), &layout).await?
                }
            };
            if !report.is_success() {
                return Err(AppError::ScriptPreservation(format!(
                    "loaded={}, found={}, merged={}; collections will not be pushed",
                    report.loaded, report.found, report.merged
                )));
            }
            println!(
                "Script preservation completed: {} entries found, {} requests updated.",
                report.found, report.merged
            );
        }
        Commands::Push { dry_run } => {
            let client = PostmanClient::from_key(args.api_key.as_deref())?;
            let outcomes = push_all(&client, &layout, dry_run).await?;
            println!("Pushed {} collections to Postman.", outcomes.len());
        }
        Commands::Clean => {
            let removed = clean(&layout)?;
            if removed > 0 {
                println!("Successfully removed {} generated files.", removed);
            } else {
                println!("No files to clean.");
            }
        }
    }
    Ok(())
}
