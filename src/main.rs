use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use employerfinder::cli::{Cli, Commands};
use employerfinder::commands;
use employerfinder::config::{self, AppConfig};
use employerfinder::directory::CommandDirectoryClient;
use employerfinder::driver::BatchDriver;
use employerfinder::logger::{RunLogger, VerbosityLevel};
use employerfinder::rotator::{CommandRotator, IdentityRotator, NoopRotator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command();

    if command == Commands::Init {
        if cli.config.exists() {
            eprintln!("❌ Configuration file already exists at: {}", cli.config.display());
            std::process::exit(1);
        }
        match AppConfig::create_default_config(&cli.config) {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to point at your work list, then run employerfinder again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Config must be settled before any progress bar can hide the prompt
    let app_config = match AppConfig::load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config(&path) {
            Ok(Some(created_path)) => {
                println!("✅ Created default configuration file at: {}", created_path.display());
                println!("   Edit this file to point at your work list, then run employerfinder again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("❌ Configuration file not found at: {}", path.display());
                eprintln!("   Run 'employerfinder init' to create a default configuration file.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match command {
        Commands::Prepare => commands::run_prepare(&app_config),
        Commands::Status => commands::show_status(&app_config),
        Commands::Run | Commands::Init => run_batch(&cli, app_config).await,
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "employerfinder=warn",
        1 => "employerfinder=info",
        _ => "employerfinder=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with_writer(std::io::stderr)
        .init();
}

async fn run_batch(cli: &Cli, app_config: AppConfig) -> Result<()> {
    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    let logger = match cli.log_file.as_ref().or(app_config.paths.log_file.as_ref()) {
        Some(path) => RunLogger::with_log_file(verbosity, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => RunLogger::new(verbosity),
    };

    let client = Box::new(CommandDirectoryClient::new(&app_config.directory));
    let rotator: Box<dyn IdentityRotator> =
        match CommandRotator::from_config(&app_config.rotator, app_config.rotation.settle_delay()) {
            Some(rotator) => Box::new(rotator),
            None => {
                logger.warn("No rotator command configured; identity rotation is disabled");
                Box::new(NoopRotator)
            }
        };

    // First Ctrl-C stops after the current case, a second one exits immediately
    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupt);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\n⚠️  Force exiting (the last checkpoint is kept).");
            std::process::exit(130);
        }
        eprintln!("\n⚠️  Interrupt received. Finishing the current case and saving a checkpoint...");
    })
    .unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to set Ctrl-C handler: {}. Interrupts will not checkpoint.", e);
    });

    let mut driver = BatchDriver::from_config(app_config, client, rotator)?
        .with_logger(logger)
        .with_interrupt(interrupt);
    if let Some(seed) = cli.seed {
        driver = driver.with_seed(seed);
    }

    match driver.run().await {
        Ok(summary) => {
            driver.logger().print_final_summary(&summary);
            if summary.interrupted {
                std::process::exit(130);
            }
            Ok(())
        }
        Err(e) => {
            driver.logger().print_final_summary(driver.summary());
            Err(e)
        }
    }
}
