//! tracksync CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tsync::cli::commands::{self, sync::RunFlags};
use tsync::cli::{Cli, Commands};
use tsync::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // JSON mode: --json or non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let home = cli.home.as_ref();
    let provider = cli.provider.as_deref();
    let flags = RunFlags {
        home,
        provider,
        dry_run: cli.dry_run,
        json,
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::Item { command } => {
            commands::item::execute(command, home, provider, cli.dry_run, json)
        }

        // Sync
        Commands::Push(args) => commands::sync::push(args, flags),
        Commands::Pull(args) => commands::sync::pull(args, flags),
        Commands::Sync(args) => commands::sync::sync(args, flags),
        Commands::Status { ids } => commands::status::execute(ids, home, provider, json),
        Commands::Comment { id, text } => {
            commands::comment::execute(id, text, home, provider, cli.dry_run, json)
        }
        Commands::Auth => commands::auth::execute(home, provider, json),

        Commands::Config { command } => {
            commands::config::execute(command, home, provider, cli.dry_run, json)
        }
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(home, provider, json),
    }
}
