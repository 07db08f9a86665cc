use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genpipe::cli::commands::generate::GenerateOptions;
use genpipe::constants::jobs::DEFAULT_LIST_LIMIT;

#[derive(Parser)]
#[command(name = "genpipe")]
#[command(
    version,
    about = "Asynchronous LLM generation pipeline with output repair"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a generation job and wait for its result
    Generate {
        #[arg(long, short, help = "Prompt text")]
        prompt: String,
        #[arg(long, short, help = "JSON file with input parameters")]
        input: Option<PathBuf>,
        #[arg(long, short, help = "JSON file with the document shape template")]
        shape: Option<PathBuf>,
        #[arg(long, short, help = "Model override")]
        model: Option<String>,
        #[arg(long, help = "Use the streaming upstream call")]
        stream: bool,
        #[arg(long, short, env = "GENPIPE_OWNER", default_value = "local")]
        owner: String,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Show one job
    Job {
        #[arg(help = "Job id")]
        id: String,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// List jobs of an owner
    Jobs {
        #[arg(long, short, env = "GENPIPE_OWNER", default_value = "local")]
        owner: String,
        #[arg(long, short, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Show configured clients
    Pool {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mgenpipe encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Generate {
            prompt,
            input,
            shape,
            model,
            stream,
            owner,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(genpipe::cli::commands::generate::run(GenerateOptions {
                prompt,
                input,
                shape,
                model,
                stream,
                owner,
                format,
            }))?;
        }
        Commands::Job { id, format } => {
            let rt = Runtime::new()?;
            rt.block_on(genpipe::cli::commands::job::run(&id, &format))?;
        }
        Commands::Jobs {
            owner,
            limit,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(genpipe::cli::commands::jobs::run(&owner, limit, &format))?;
        }
        Commands::Pool { format } => {
            genpipe::cli::commands::pool::run(&format)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                genpipe::cli::commands::config::show(global, &format)?;
            }
            ConfigAction::Path => {
                genpipe::cli::commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                genpipe::cli::commands::config::init(global, force)?;
            }
        },
    }

    Ok(())
}
