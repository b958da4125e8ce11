//! meteo-migrate CLI - move a meteo station database from MySQL to SQLite.

mod prompt;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use meteo_migrate::{
    Config, DanglingTokenPolicy, EntityMode, Manifest, MigrateError, MigrationEvent,
    MismatchPolicy, Orchestrator, Phase, SqliteTarget, VerifyMode,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "meteo-migrate")]
#[command(about = "Migrate a meteo station database from MySQL to SQLite")]
#[command(override_usage = "meteo-migrate [OPTIONS] [HOSTNAME DATABASE USERNAME] [DESTINATION]")]
#[command(version)]
struct Cli {
    /// MySQL hostname, database and username, and/or the SQLite destination file
    #[arg(value_name = "ARGS")]
    positionals: Vec<String>,

    /// Don't prompt for confirmation before transferring
    #[arg(short = 'y', long)]
    yes: bool,

    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MySQL port
    #[arg(long)]
    port: Option<u16>,

    /// Datapoints per page
    #[arg(long)]
    batch_size: Option<usize>,

    /// Replace existing stations and tokens instead of failing on them
    #[arg(long)]
    merge: bool,

    /// Keep migrating after a station fails verification
    #[arg(long)]
    keep_going: bool,

    /// Compare every datapoint after the count check
    #[arg(long)]
    verify_values: bool,

    /// Fail when a token references a station that does not exist
    #[arg(long)]
    reject_dangling_tokens: bool,

    /// Show what would be migrated without touching the destination
    #[arg(long, conflicts_with = "verify_only")]
    dry_run: bool,

    /// Compare counts against an existing destination without writing
    #[arg(long)]
    verify_only: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "warn")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(meteo_migrate::error::EXIT_FAILURE),
            };
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            if matches!(e, MigrateError::MalformedInput(_)) {
                eprintln!("{}", Cli::command().render_usage());
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), MigrateError> {
    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    apply_positionals(&mut config, &cli.positionals)?;
    apply_overrides(&mut config, &cli);

    prompt::complete_source(&mut config.source)?;
    prompt::complete_destination(&mut config.target)?;
    config.validate()?;

    let cancel_token = setup_signal_handler();

    if !cli.output_json {
        println!("Connecting to {} ... ", config.source.display_target());
    }
    let orchestrator = Orchestrator::connect(&config)
        .await?
        .with_cancellation(cancel_token);

    if cli.verify_only {
        return verify_only(orchestrator, &config, cli.output_json).await;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    // The confirmation prompt prints the manifest itself
    let prompted = !config.migration.assume_yes && !cli.dry_run;
    let printer = tokio::spawn(print_progress(
        rx,
        config.target.path.display().to_string(),
        !cli.output_json,
        !prompted,
    ));

    let mut confirm = |manifest: &Manifest| prompt::confirm_manifest(manifest);
    let entity_mode = config.migration.entity_mode;
    let outcome = orchestrator
        .with_progress(tx)
        .with_dry_run(cli.dry_run)
        .run(&mut confirm, || {
            SqliteTarget::open(&config.target, entity_mode)
        })
        .await;

    if let Err(e) = printer.await {
        warn!("Progress printer stopped: {}", e);
    }
    let result = outcome?;

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else {
        let status_msg = if cli.dry_run {
            "Dry run completed!"
        } else {
            "Migration completed!"
        };
        println!("\n{}", status_msg);
        println!("  Run ID: {}", result.run_id);
        println!("  Duration: {:.2}s", result.duration_seconds);
        println!("  Stations: {}", result.stations_total);
        println!("  Tokens: {}", result.tokens_total);
        println!("  Rows: {}/{}", result.rows_transferred, result.rows_expected);
        println!("  Throughput: {} rows/sec", result.rows_per_second);
        if !result.dangling_tokens.is_empty() {
            let names: Vec<_> = result.dangling_tokens.iter().map(|t| &t.token).collect();
            println!("  Dangling tokens: {:?}", names);
        }
    }

    Ok(())
}

/// Fill connection details from `[HOSTNAME DATABASE USERNAME] [DESTINATION]`.
fn apply_positionals(config: &mut Config, args: &[String]) -> Result<(), MigrateError> {
    match args {
        [] => {}
        [destination] => config.target.path = PathBuf::from(destination),
        [host, database, user] => {
            config.source.host = host.clone();
            config.source.database = database.clone();
            config.source.user = user.clone();
        }
        [host, database, user, destination] => {
            config.source.host = host.clone();
            config.source.database = database.clone();
            config.source.user = user.clone();
            config.target.path = PathBuf::from(destination);
        }
        other => {
            return Err(MigrateError::MalformedInput(format!(
                "expected 0, 1, 3 or 4 positional arguments, got {}",
                other.len()
            )))
        }
    }
    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    let migration = &mut config.migration;
    if cli.yes {
        migration.assume_yes = true;
    }
    if let Some(port) = cli.port {
        config.source.port = port;
    }
    if let Some(batch_size) = cli.batch_size {
        migration.batch_size = batch_size;
    }
    if cli.merge {
        migration.entity_mode = EntityMode::Merge;
    }
    if cli.keep_going {
        migration.on_mismatch = MismatchPolicy::Continue;
    }
    if cli.verify_values {
        migration.verify = VerifyMode::Values;
    }
    if cli.reject_dangling_tokens {
        migration.dangling_tokens = DanglingTokenPolicy::Reject;
    }
}

async fn verify_only(
    orchestrator: Orchestrator<meteo_migrate::MysqlSource>,
    config: &Config,
    output_json: bool,
) -> Result<(), MigrateError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(
        rx,
        config.target.path.display().to_string(),
        !output_json,
        true,
    ));

    let outcome = orchestrator
        .with_progress(tx)
        .validate(|| SqliteTarget::open_existing(&config.target))
        .await;

    if let Err(e) = printer.await {
        warn!("Progress printer stopped: {}", e);
    }
    let checks = outcome?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        println!("Verification completed successfully");
    }
    Ok(())
}

/// Output produced for one progress event.
#[derive(Debug, Default, PartialEq, Eq)]
struct ProgressLines {
    /// Written to stdout without a trailing newline.
    partial: Option<String>,
    stdout: Option<String>,
    stderr: Option<String>,
}

/// Format an event for the terminal. The manifest is printed separately.
fn progress_lines(event: &MigrationEvent, destination: &str) -> ProgressLines {
    let mut lines = ProgressLines::default();
    match event {
        MigrationEvent::PhaseEntered { phase } => {
            lines.stdout = match phase {
                Phase::Confirmed => Some(format!("Creating {} ... ", destination)),
                Phase::DestinationPrepared => Some("\tImporting stations ... ".to_string()),
                Phase::StationsImported => Some("\tImporting tokens ... ".to_string()),
                Phase::TokensImported => Some("\tImporting datapoints ... ".to_string()),
                _ => None,
            };
        }
        MigrationEvent::StationStarted { station, expected } => {
            lines.partial = Some(format!("\t\t{} - {} datapoints ... ", station.name, expected));
        }
        MigrationEvent::StationVerified(check) => {
            lines.stdout = Some(format!("ok ({} records counted)", check.actual));
        }
        MigrationEvent::StationMismatch(check) => {
            lines.stdout = Some("FAILED".to_string());
            lines.stderr = Some(format!(
                "{}: imported {} datapoints, but source holds {} datapoints",
                check.name, check.actual, check.expected
            ));
        }
        MigrationEvent::StationValueMismatch { name, detail, .. } => {
            lines.stdout = Some("FAILED".to_string());
            lines.stderr = Some(format!("{}: {}", name, detail));
        }
        _ => {}
    }
    lines
}

/// Print progress events until the orchestrator drops its sender.
async fn print_progress(
    mut rx: mpsc::UnboundedReceiver<MigrationEvent>,
    destination: String,
    enabled: bool,
    show_manifest: bool,
) {
    while let Some(event) = rx.recv().await {
        if !enabled {
            continue;
        }
        if let MigrationEvent::ManifestFetched(manifest) = &event {
            if show_manifest {
                prompt::print_manifest(manifest);
            }
            continue;
        }

        let lines = progress_lines(&event, &destination);
        if let Some(partial) = lines.partial {
            print!("{}", partial);
            let _ = std::io::stdout().flush();
        }
        if let Some(line) = lines.stdout {
            println!("{}", line);
        }
        if let Some(line) = lines.stderr {
            eprintln!("{}", line);
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // stdout carries progress and results
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current page...", name);
                    token.cancel();
                }
                Err(e) => warn!("Failed to set up {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping after the current page...");
                token.cancel();
            }
            Err(e) => warn!("Failed to set up Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}

#[cfg(test)]
mod tests {
    use super::*;
    use meteo_migrate::{CountCheck, Station};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("meteo-migrate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_single_positional_is_destination() {
        let mut config = Config::default();
        apply_positionals(&mut config, &["meteo.db".to_string()]).unwrap();
        assert_eq!(config.target.path, PathBuf::from("meteo.db"));
        assert!(config.source.host.is_empty());
    }

    #[test]
    fn test_four_positionals_fill_everything() {
        let cli = parse(&["db.local", "meteo", "felix", "out.db"]);
        let mut config = Config::default();
        apply_positionals(&mut config, &cli.positionals).unwrap();
        assert_eq!(config.source.host, "db.local");
        assert_eq!(config.source.database, "meteo");
        assert_eq!(config.source.user, "felix");
        assert_eq!(config.target.path, PathBuf::from("out.db"));
    }

    #[test]
    fn test_three_positionals_leave_destination() {
        let mut config = Config::default();
        let args: Vec<String> = ["h", "d", "u"].iter().map(|s| s.to_string()).collect();
        apply_positionals(&mut config, &args).unwrap();
        assert_eq!(config.source.user, "u");
        assert!(config.target.path.as_os_str().is_empty());
    }

    #[test]
    fn test_two_positionals_are_malformed() {
        let mut config = Config::default();
        let args = vec!["a".to_string(), "b".to_string()];
        let err = apply_positionals(&mut config, &args).unwrap_err();
        assert!(matches!(err, MigrateError::MalformedInput(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "-y",
            "--port",
            "3307",
            "--batch-size",
            "250",
            "--merge",
            "--keep-going",
            "--verify-values",
            "--reject-dangling-tokens",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        assert!(config.migration.assume_yes);
        assert_eq!(config.source.port, 3307);
        assert_eq!(config.migration.batch_size, 250);
        assert_eq!(config.migration.entity_mode, EntityMode::Merge);
        assert_eq!(config.migration.on_mismatch, MismatchPolicy::Continue);
        assert_eq!(config.migration.verify, VerifyMode::Values);
        assert_eq!(
            config.migration.dangling_tokens,
            DanglingTokenPolicy::Reject
        );
    }

    fn check(expected: i64, actual: i64) -> CountCheck {
        CountCheck {
            station: 1,
            name: "Rooftop".to_string(),
            expected,
            actual,
        }
    }

    #[test]
    fn test_progress_lines_for_station() {
        let started = MigrationEvent::StationStarted {
            station: Station::new(1, "Rooftop", "Roof", ""),
            expected: 2500,
        };
        assert_eq!(
            progress_lines(&started, "meteo.db").partial.as_deref(),
            Some("\t\tRooftop - 2500 datapoints ... ")
        );

        let verified = progress_lines(&MigrationEvent::StationVerified(check(2500, 2500)), "meteo.db");
        assert_eq!(verified.stdout.as_deref(), Some("ok (2500 records counted)"));
        assert_eq!(verified.stderr, None);
    }

    #[test]
    fn test_progress_lines_for_mismatch() {
        let lines = progress_lines(&MigrationEvent::StationMismatch(check(2500, 2499)), "meteo.db");
        assert_eq!(lines.stdout.as_deref(), Some("FAILED"));
        assert_eq!(
            lines.stderr.as_deref(),
            Some("Rooftop: imported 2499 datapoints, but source holds 2500 datapoints")
        );

        let value = MigrationEvent::StationValueMismatch {
            station: 1,
            name: "Rooftop".to_string(),
            detail: "row 0 differs".to_string(),
        };
        let lines = progress_lines(&value, "meteo.db");
        assert_eq!(lines.stdout.as_deref(), Some("FAILED"));
        assert_eq!(lines.stderr.as_deref(), Some("Rooftop: row 0 differs"));
    }

    #[test]
    fn test_progress_lines_for_phases() {
        let confirmed = MigrationEvent::PhaseEntered {
            phase: Phase::Confirmed,
        };
        assert_eq!(
            progress_lines(&confirmed, "meteo.db").stdout.as_deref(),
            Some("Creating meteo.db ... ")
        );
        let done = MigrationEvent::PhaseEntered { phase: Phase::Done };
        assert_eq!(progress_lines(&done, "meteo.db"), ProgressLines::default());
    }

    #[test]
    fn test_dry_run_conflicts_with_verify_only() {
        let parsed = Cli::try_parse_from(["meteo-migrate", "--dry-run", "--verify-only"]);
        assert!(parsed.is_err());
    }
}
