use clap::{ArgGroup, Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagewatch::config::{init_db, Config};
use pagewatch::modules::monitor::model::MonitorDefinition;
use pagewatch::modules::monitor::{MemoryMonitorStore, MonitorStore, MySqlMonitorStore};
use pagewatch::services::checker::{HttpFetcher, PageChecker};
use pagewatch::services::ledger::LogEntry;
use pagewatch::services::monitor::{foreground_definition, watch_foreground, MonitorEngine};
use pagewatch::services::notifier::SmtpNotifier;
use pagewatch::{create_app, AppSettings};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "pagewatch", version, about = "Watch web pages for a selector or text and email on match")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Watch one page from the terminal and email EMAIL_TO on a match
    #[command(group(ArgGroup::new("pattern").required(true).multiple(true).args(["selector", "text"])))]
    Check {
        url: String,
        /// CSS selector to search for (takes precedence)
        #[arg(long)]
        selector: Option<String>,
        /// Plain text to search for if no selector is given
        #[arg(long)]
        text: Option<String>,
        /// Hours between checks (1, 3, 6 or 12)
        #[arg(long, default_value_t = 3)]
        interval: u32,
        /// Run only one check and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagewatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Check {
            url,
            selector,
            text,
            interval,
            once,
        } => {
            let definition = foreground_definition(
                &url,
                selector.as_deref(),
                text.as_deref(),
                interval,
                config.email_to.clone(),
            )?;
            check(config, definition, once).await
        }
    }
}

async fn check(
    config: Config,
    definition: MonitorDefinition,
    once: bool,
) -> Result<(), BoxError> {
    // Without a recipient the transport is left unconfigured so matches are
    // logged as skipped instead of failing on an empty address.
    let smtp = match config.email_to {
        Some(_) => config.smtp,
        None => None,
    };
    if smtp.is_none() {
        tracing::warn!("SMTP_USER/SMTP_PASS/EMAIL_FROM/EMAIL_TO not all set, matches will not be emailed");
    }

    let checker = PageChecker::new(Arc::new(HttpFetcher::new(config.fetch_timeout)?));
    let engine = MonitorEngine::new(checker, Arc::new(SmtpNotifier::new(smtp)));

    watch_foreground(&engine, &definition, once, shutdown_signal(), print_entry).await;
    Ok(())
}

fn print_entry(entry: &LogEntry) {
    println!(
        "{} [{}] {}",
        entry.ts.format("%Y-%m-%d %H:%M:%S"),
        entry.level.as_str(),
        entry.message
    );
}

async fn serve(config: Config) -> Result<(), BoxError> {
    let store: Arc<dyn MonitorStore> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = init_db(database_url).await?;
            tracing::info!("Connected to MySQL");
            Arc::new(MySqlMonitorStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, monitors are kept in memory");
            Arc::new(MemoryMonitorStore::new())
        }
    };

    if config.smtp.is_none() {
        tracing::warn!("SMTP_USER/SMTP_PASS/EMAIL_FROM not set, notifications will be skipped");
    }

    let checker = PageChecker::new(Arc::new(HttpFetcher::new(config.fetch_timeout)?));
    let notifier = Arc::new(SmtpNotifier::new(config.smtp.clone()));
    let engine = Arc::new(MonitorEngine::new(checker, notifier));
    engine.start_heartbeat().await;

    let app = create_app(
        store,
        engine.clone(),
        AppSettings {
            access_password: config.access_password.clone(),
            public_base_url: config.public_base_url.clone(),
        },
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown(config.shutdown_grace).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
