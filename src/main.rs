use anyhow::Result;
use clap::Parser;
use colored::*;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use termpal::ai::HttpCompletionClient;
use termpal::assistant::Assistant;
use termpal::config::{self, Config};
use termpal::executor::history::CommandHistory;
use termpal::executor::validation::CommandValidator;
use termpal::executor::CommandExecutor;
use termpal::logging::init_logging;
use termpal::shell::EnvironmentInfo;

/// termpal - turn plain-language requests into shell commands and run them
#[derive(Parser, Debug)]
#[command(name = "termpal", version)]
#[command(about = "Natural-language shell assistant")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log debug details to the log file
    #[arg(short, long)]
    verbose: bool,

    /// Where to keep the command history
    #[arg(long, value_name = "PATH")]
    history_file: Option<PathBuf>,

    /// Keep history in memory only
    #[arg(long, conflicts_with = "history_file")]
    no_history: bool,

    /// Seconds a command may run before it is killed
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Model name to request from the provider
    #[arg(long, value_name = "NAME")]
    model: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => {
            let path = config::get_config_path()?;
            if !path.exists() {
                Config::create_default(&path)?;
                println!("Created default config file at {:?}", path);
            }
            path
        }
    };

    let mut config = Config::load_or_default(&config_path)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    apply_cli_overrides(&mut config, &cli);
    config.ensure_usable()?;

    if !config.display.color_output {
        colored::control::set_override(false);
    }

    let log_path = config.log_path()?;
    if let Err(e) = init_logging(&log_path, config.logging.verbose) {
        eprintln!("{}: logging disabled: {:#}", "Warning".yellow(), e);
    }

    let environment = EnvironmentInfo::detect();
    tracing::info!(
        shell = %environment.shell,
        os = %environment.os,
        config = ?config_path,
        "assistant starting"
    );

    let validator = CommandValidator::new(&config.security)?;
    let client = HttpCompletionClient::new(config.ai.clone())?;
    let history = if config.history.persist {
        CommandHistory::load_or_empty(&config.history_path()?, config.history.max_entries)
    } else {
        CommandHistory::new(config.history.max_entries)
    };
    let executor = CommandExecutor::new(
        environment.shell,
        Duration::from_secs(config.execution.timeout_secs),
    );

    println!("{}", "termpal - Your Natural-Language Shell Assistant".green().bold());
    println!("Shell Type: {}", environment.shell.to_string().blue());
    println!("Operating System: {}", environment.os.to_string().blue());
    if config.logging.verbose {
        println!("Model: {} ({:?})", config.ai.model, config.ai.provider);
        println!("Log file: {:?}", log_path);
    }
    println!("Type 'help' for examples or 'exit' to quit\n");

    let mut assistant = Assistant::new(
        client,
        environment,
        history,
        validator,
        executor,
        config.display.clone(),
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    assistant.run(&mut stdin.lock(), &mut stdout.lock()).await?;

    tracing::info!(entries = assistant.history().len(), "assistant stopped");
    Ok(())
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if cli.verbose {
        config.logging.verbose = true;
    }
    if let Some(path) = &cli.history_file {
        config.history.file = Some(path.clone());
    }
    if cli.no_history {
        config.history.persist = false;
    }
    if let Some(secs) = cli.timeout {
        config.execution.timeout_secs = secs;
    }
    if let Some(model) = &cli.model {
        config.ai.model = model.clone();
    }
}
