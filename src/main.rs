use std::{error::Error, process};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};

use streamtune::{config::Config, http::Client, resolver::Resolver};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Station URL
    ///
    /// Resolved to the stream URIs a player would try, in order. URLs that
    /// are not a recognized playlist resolve to themselves.
    #[arg(value_hint = ValueHint::Url)]
    url: String,

    /// Print the playlist as a JSON array
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive, so this is quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("streamtune", level);
    }

    logger.init();
}

/// Checks that `url` parses, returning it exactly as given. A station that
/// turns out not to be a playlist is played from this very string.
fn validate_url(url: &str) -> Result<&str, url::ParseError> {
    url::Url::parse(url).map(|_| url)
}

/// Resolves the station URL and prints its playlist.
///
/// # Errors
///
/// Returns an error when the URL is malformed, the HTTP client cannot be
/// built, or the user interrupts the fetch.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let url = validate_url(&args.url)?;

    let config = Config::new();
    let mut resolver = Resolver::new(Client::new(&config)?);

    let playlist = tokio::select! {
        // Prioritize shutdown signals.
        biased;

        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            resolver.cancel();
            return Err("interrupted".into());
        }

        playlist = resolver.resolve(url) => playlist,
    };

    if args.json {
        println!("{}", serde_json::to_string(&playlist)?);
    } else {
        for uri in playlist {
            println!("{uri}");
        }
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and resolves the station URL.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
