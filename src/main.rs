use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use fleetbeat::{ApiClient, Config, Error, Poller, Publisher, Session, TokenStore};

#[derive(Parser)]
#[command(
    name = "fleetbeat",
    version,
    about = "Poll connected-vehicle telemetry and republish it to a message bus"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive browser authorization flow
    Auth {
        /// Print the URL only; do not try to open a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Fetch telemetry for the fleet and publish it
    Poll {
        /// Comma-separated VINs (overrides FLEETBEAT_VINS)
        #[arg(long, value_delimiter = ',')]
        vins: Option<Vec<String>>,

        /// Keep running, one cycle per interval
        #[arg(long = "loop")]
        continuous: bool,

        /// Minutes between cycles in loop mode
        #[arg(long, default_value_t = 5, env = "FLEETBEAT_INTERVAL_MINS")]
        interval_mins: u64,

        /// Log the would-be messages instead of publishing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show authentication status
    Status,

    /// Clear in-memory and persisted tokens
    Logout,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FLEETBEAT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = Config::from_env()?;
    let session = Arc::new(Session::new(
        config.credentials(),
        TokenStore::new(&config.token_file),
    ));

    match cli.command {
        Commands::Auth { no_browser } => {
            fleetbeat::cli::auth_flow::run_auth(&session, !no_browser).await
        }

        Commands::Poll {
            vins,
            continuous,
            interval_mins,
            dry_run,
        } => {
            let vins = vins.unwrap_or_else(|| config.vins.clone());
            if vins.is_empty() {
                return Err(Error::Config(
                    "no VINs configured; set FLEETBEAT_VINS or pass --vins".into(),
                ));
            }
            if config.publish.is_none() && !dry_run {
                return Err(Error::Config(
                    "FLEETBEAT_PUBLISH_URL is not set; use --dry-run to poll without a bus".into(),
                ));
            }

            let api = ApiClient::new(
                session.clone(),
                config.api_key.clone(),
                config.api_base_url.clone(),
            );
            let publisher = Publisher::new(config.publish.clone(), dry_run);
            let poller = Poller::new(api, session, publisher, vins, config.home);

            if continuous {
                poller
                    .run_loop(Duration::from_secs(interval_mins * 60))
                    .await
            } else {
                let all_published = poller.run_once().await?;
                if !all_published {
                    std::process::exit(1);
                }
                Ok(())
            }
        }

        Commands::Status => {
            if session.is_authenticated().await {
                match session.token_expiry().await {
                    Some(expiry) => println!(
                        "{} Authenticated; token expires {}",
                        "OK".green().bold(),
                        expiry.to_rfc3339()
                    ),
                    None => println!(
                        "{} Authenticated (token has no recorded expiry)",
                        "OK".green().bold()
                    ),
                }
            } else {
                println!("Not authenticated. Run `fleetbeat auth` to sign in.");
            }
            println!("Token file: {}", session.store().path().display());
            Ok(())
        }

        Commands::Logout => {
            session.logout().await;
            println!("Logged out; persisted tokens removed.");
            Ok(())
        }
    }
}
