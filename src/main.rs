use anyhow::Context;
use cevennes_connect::config::Config;
use cevennes_connect::logging;
use cevennes_connect::metrics;
use cevennes_connect::server::{self, AppState};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cevennes_connect")]
#[command(about = "Ingestion, review and publishing backend for the Cévennes community site")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on (defaults to server.port / $PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Scrape agenda pages and print what was found, flagged against published events
    Scrape {
        /// Page to scrape; repeat for several pages
        #[arg(long = "url", required = true)]
        urls: Vec<String>,
        /// Also fetch each event's detail page
        #[arg(long)]
        deep: bool,
    },
    /// Run one scraping config now
    RunConfig {
        #[arg(long)]
        id: i64,
    },
    /// Run every active scraping config that is due (for an external cron)
    RunDue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    info!(secrets = ?config.secrets, "configuration loaded");
    let state = AppState::from_config(&config).context("building application state")?;

    match cli.command {
        Commands::Serve { port } => {
            metrics::init_metrics();
            let port = port.unwrap_or(config.server.port);
            server::start_server(state, port)
                .await
                .map_err(|e| anyhow::anyhow!("server error: {e}"))?;
        }
        Commands::Scrape { urls, deep } => {
            println!("🔍 Scraping {} page(s)...", urls.len());
            let outcome = state.ingestor.scrape_and_flag(urls, deep).await?;
            for event in &outcome.events {
                let flag = if event.is_duplicate { " (doublon)" } else { "" };
                println!("   - {} | {} | {}{}", event.title, event.date, event.location, flag);
            }
            for failure in &outcome.failures {
                warn!("{} failed: {}", failure.url, failure.error);
                println!("⚠️  {}: {}", failure.url, failure.error);
            }
            println!("\n📊 {}", outcome.summary);
        }
        Commands::RunConfig { id } => {
            let report = state.schedules.run(id).await.map_err(|e| {
                error!("Run failed: {}", e);
                println!("❌ Run failed: {e}");
                anyhow::Error::new(e).context(format!("running scraping config {id}"))
            })?;
            println!("✅ {}", report.summary);
            println!(
                "   Inserted: {} | Duplicates: {} | Next run: {}",
                report.events_inserted, report.duplicates_found, report.next_run_at
            );
        }
        Commands::RunDue => {
            let runs = state.schedules.run_due(Utc::now()).await?;
            if runs.is_empty() {
                println!("Nothing due.");
            }
            for run in runs {
                match (run.report, run.error) {
                    (Some(report), _) => println!("✅ {} (#{}): {}", run.name, run.config_id, report.summary),
                    (None, Some(err)) => println!("❌ {} (#{}): {}", run.name, run.config_id, err),
                    (None, None) => {}
                }
            }
        }
    }
    Ok(())
}
