use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;

use hierarchical_vector_db::{Cli, CliError, logging, run};

fn is_robot_mode_args() -> bool {
    std::env::args().any(|arg| arg == "--json" || arg == "--robot")
}

fn report(err: &CliError, robot: bool) {
    if robot {
        eprintln!("{}", err.to_json());
    } else {
        eprintln!("error: {err}");
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let informational = matches!(
                err.kind(),
                ClapErrorKind::DisplayHelp
                    | ClapErrorKind::DisplayVersion
                    | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            );
            if informational || !is_robot_mode_args() {
                err.exit();
            }
            let usage = CliError::usage(err.to_string().trim());
            report(&usage, true);
            std::process::exit(usage.code);
        }
    };

    let log_guard = logging::init(cli.verbose, cli.log_file.as_deref())?;

    if let Err(err) = run(&cli) {
        tracing::debug!(code = err.code, kind = err.kind, "command failed");
        report(&err, cli.json);
        drop(log_guard);
        std::process::exit(err.code);
    }
    Ok(())
}
