//! Greenscreen CLI - Command-line interface
//!
//! Connects to a host, performs one action and prints the resulting screen
//! or fields. Exit codes follow [`ExitCodes`].

use anyhow::Context;
use clap::{Parser, Subcommand};
use greenscreen_core::cli::{format_fields, format_screen, print_exit_codes};
use greenscreen_core::utils::logging;
use greenscreen_core::{
    AppConfig, CliResult, ConfigError, Credentials, ExitCodes, OutputFormat, Session,
    SessionError, Transcript, TransportType,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Greenscreen CLI
#[derive(Parser, Debug)]
#[command(
    name = "greenscreen",
    version,
    about = "Drive screen-oriented hosts over SSH or Telnet",
    long_about = None
)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host name or address
    #[arg(long)]
    host: Option<String>,

    /// Port
    #[arg(long)]
    port: Option<u16>,

    /// Transport method (ssh or telnet)
    #[arg(long)]
    method: Option<TransportType>,

    /// User name
    #[arg(long, env = "GREENSCREEN_USER", default_value = "")]
    user: String,

    /// Password
    #[arg(long, env = "GREENSCREEN_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Record a transcript to this file
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the fields discovered on the current screen
    Fields {
        /// Include duplicate spans from both discovery passes
        #[arg(long)]
        all: bool,
    },

    /// Print the current screen
    Screen,

    /// Wait for text to appear
    Wait {
        /// Text to wait for
        #[arg(long)]
        text: String,

        /// Timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },

    /// Send text or a key, then print the screen
    #[command(group(
        clap::ArgGroup::new("input")
            .required(true)
            .args(["text", "key", "fkey"])
    ))]
    Send {
        /// Text, followed by a line terminator
        #[arg(long)]
        text: Option<String>,

        /// Named key (ENTER, TAB, ESCAPE)
        #[arg(long)]
        key: Option<String>,

        /// Function key number (1-24)
        #[arg(long)]
        fkey: Option<u8>,

        /// Extra wait before reading the screen, in milliseconds
        #[arg(long, default_value_t = 0)]
        wait_ms: u64,
    },

    /// Show exit codes
    ExitCodes,
}

fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env();
            config
        }
        None => AppConfig::load()?,
    };

    if let Some(host) = &cli.host {
        config.terminal.hostname.clone_from(host);
    }
    if cli.port.is_some() {
        config.terminal.port = cli.port;
    }
    if let Some(method) = cli.method {
        config.terminal.method = method;
    }
    if let Some(path) = &cli.transcript {
        config.logging.transcript = Some(path.clone());
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    Ok(config)
}

async fn execute(cli: &Cli, session: &mut Session) -> Result<CliResult, SessionError> {
    match &cli.command {
        Commands::Fields { all } => {
            let screen = session.screen().await?;
            let fields = if *all {
                screen.fields().to_vec()
            } else {
                screen.distinct_fields()
            };
            Ok(CliResult::success_with_message(format_fields(
                &fields,
                screen.geometry().columns,
                cli.format,
            )))
        }
        Commands::Screen => {
            let screen = session.screen().await?;
            Ok(CliResult::success_with_message(format_screen(&screen, cli.format)))
        }
        Commands::Wait { text, timeout_ms } => {
            if session.wait_for_text(text, Duration::from_millis(*timeout_ms)).await? {
                let screen = session.screen().await?;
                Ok(CliResult::success_with_message(format_screen(&screen, cli.format)))
            } else {
                Ok(CliResult::pattern_not_found(text))
            }
        }
        Commands::Send {
            text,
            key,
            fkey,
            wait_ms,
        } => {
            if let Some(text) = text {
                session.send_text(text).await?;
            } else if let Some(key) = key {
                session.send_key(key).await?;
            } else if let Some(number) = fkey {
                session.send_function_key(*number).await?;
            }
            session.settle(Duration::from_millis(*wait_ms)).await?;
            let screen = session.screen().await?;
            Ok(CliResult::success_with_message(format_screen(&screen, cli.format)))
        }
        Commands::ExitCodes => Ok(CliResult::success()),
    }
}

async fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<CliResult> {
    let credentials = Credentials::new(&cli.user, &cli.password);
    let session_config = match config.session_config(&credentials) {
        Ok(c) => c,
        Err(e) => return Ok(e.into()),
    };

    let mut session = Session::new(session_config);
    if let Some(path) = &config.logging.transcript {
        let transcript = Transcript::to_file(path, config.logging.transcript_format)
            .with_context(|| format!("Failed to open transcript {}", path.display()))?;
        session = session.with_transcript(transcript);
    }

    if let Err(e) = session.connect().await {
        return Ok(e.into());
    }

    let result = execute(cli, &mut session)
        .await
        .unwrap_or_else(CliResult::from);
    session.disconnect().await;
    Ok(result)
}

fn report(result: &CliResult) -> ExitCode {
    match result {
        CliResult::Success(Some(msg)) => println!("{msg}"),
        CliResult::Success(None) => {}
        CliResult::Error(code, msg) => eprintln!("Error ({code}): {msg}"),
    }
    result.to_exit_code()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::ExitCodes) {
        print_exit_codes();
        return ExitCode::from(ExitCodes::SUCCESS);
    }

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => return report(&CliResult::from(e)),
    };

    let _guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging disabled: {e}");
            None
        }
    };
    tracing::info!("Starting {} v{}", greenscreen_core::NAME, greenscreen_core::VERSION);

    let result = run(&cli, &config)
        .await
        .unwrap_or_else(|e| CliResult::error(ExitCodes::ERROR, format!("{e:#}")));
    report(&result)
}
