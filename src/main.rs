use clap::Parser;

use transition_chain::cli::{self, Args, Command, ConfigAction};
use transition_chain::config::Config;
use transition_chain::process::setup_ctrlc_handler;

/// Initialise logging. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    // A missing .env file is fine
    let _ = dotenv::dotenv();

    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = setup_ctrlc_handler() {
        eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
    }

    // --config must exist unless it is about to be created
    let loaded = match &args.command {
        Command::Config {
            action: ConfigAction::Init,
        } => Ok(Config::default()),
        _ => Config::load(args.config.as_deref()),
    };
    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Command::Pair(pair) => cli::run_pair(&config, pair),
        Command::Batch(batch) => cli::run_batch(&config, batch),
        Command::Probe { files } => cli::run_probe(&config, &files),
        Command::Config { action } => {
            cli::handle_config_action(action, &config, args.config.as_deref())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
