use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "focuskeeper-cli", version, about = "Focuskeeper CLI")]
struct Cli {
    /// Log at debug level (overridden by FOCUSKEEPER_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Deliver notification interactions
    Notification {
        #[command(subcommand)]
        action: commands::notification::NotificationAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the timer loop in the foreground, reading commands from stdin
    Daemon,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "focuskeeper_core=debug,focuskeeper_cli=debug"
    } else {
        "focuskeeper_core=info,focuskeeper_cli=info"
    };
    // stdout carries JSON; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FOCUSKEEPER_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Notification { action } => commands::notification::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Daemon => commands::daemon::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
