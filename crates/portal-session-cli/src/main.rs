//! portal-session — command-line entry point.

mod config;
mod output;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::json;

use portal_session::{
    ApplicationDirectory, DirectoryStore, HttpFetcher, PortalSession, RefreshOutcome,
    SessionCache, SessionOptions, DEFAULT_LANDING_PATH,
};

#[derive(Parser)]
#[command(
    name = "portal-session",
    about = "Log in to a web portal once, reuse the session, and list its applications",
    version,
    after_help = "The password is read from PORTAL_PASSWORD.\nRun 'portal-session <command> --help' for details on each command."
)]
struct Cli {
    /// Portal base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Path of the login landing page on the portal
    #[arg(long, global = true, default_value = DEFAULT_LANDING_PATH)]
    landing_path: String,

    /// Session cookie cache file
    #[arg(long, global = true)]
    session_file: Option<String>,

    /// Application directory cache file
    #[arg(long, global = true)]
    directory_file: Option<String>,

    /// Account name (also reads PORTAL_USERNAME)
    #[arg(long, short, global = true)]
    username: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true, default_value = "30000")]
    timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the cached session is still logged in
    Status,
    /// Log in and save the session cookies
    Login,
    /// Sign out and delete the cached session and directory
    Logout,
    /// Refresh and list the applications on the account
    Apps {
        /// Show the cached directory without contacting the portal
        #[arg(long)]
        offline: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    if let Err(e) = run(cli) {
        if json {
            output::print_json(&json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let directory_store = DirectoryStore::new(config::resolve_directory_path(
        cli.directory_file.as_deref(),
    ));

    let requires_login = match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "portal-session", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Apps { offline: true } => {
            let directory = ApplicationDirectory::open(directory_store);
            render_directory(&directory, cli.json);
            return Ok(());
        }
        Commands::Login | Commands::Apps { .. } => true,
        Commands::Status | Commands::Logout => false,
    };

    let base_url = config::resolve_base_url(cli.base_url.as_deref());
    let session_path = config::resolve_session_path(cli.session_file.as_deref());
    let credentials = config::resolve_credentials(cli.username.as_deref(), requires_login)?;
    tracing::debug!("Portal: {base_url}");
    tracing::debug!("Session cache: {}", session_path.display());
    tracing::debug!("Directory cache: {}", directory_store.path().display());

    let fetcher = HttpFetcher::new(&base_url, cli.timeout_ms)?;
    let options = SessionOptions::new(SessionCache::new(session_path), directory_store.clone())
        .with_landing_path(cli.landing_path);

    match cli.command {
        Commands::Status => {
            let session = PortalSession::open(fetcher, credentials, options)?;
            if cli.json {
                output::print_json(&output::state_json(session.state()));
            } else {
                output::print_state(session.state());
            }
        }
        Commands::Login => {
            let mut session = PortalSession::new(fetcher, credentials, options);
            session.login()?;
            if cli.json {
                output::print_json(&output::state_json(session.state()));
            } else {
                println!("  Logged in as {}", session.credentials().username());
            }
        }
        Commands::Logout => {
            let mut session = PortalSession::open(fetcher, credentials, options)?;
            let was_logged_in = session.is_authenticated();
            session.logout()?;
            if cli.json {
                output::print_json(&json!({ "logged_out": was_logged_in }));
            } else if was_logged_in {
                println!("  Signed out");
            } else {
                println!("  Not logged in");
            }
        }
        Commands::Apps { .. } => {
            let mut session = PortalSession::new(fetcher, credentials, options);
            session.login()?;
            let mut directory = ApplicationDirectory::open(directory_store);
            match directory.refresh(&mut session)? {
                RefreshOutcome::Replaced(count) => tracing::info!("Refreshed {count} applications"),
                RefreshOutcome::EmptyListing => {
                    tracing::warn!("Portal listed no applications; showing cached directory")
                }
            }
            render_directory(&directory, cli.json);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn render_directory(directory: &ApplicationDirectory, json: bool) {
    if json {
        output::print_json(&output::directory_json(directory));
    } else {
        output::print_directory(directory);
    }
}
