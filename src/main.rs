use anyhow::Context;
use cascade_scraper::{
    BrowserTrait, ChromeBrowser, Config, CsvSink, FormHost, RecordSink, ScriptedFormHost,
    SweepDriver,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cascade-scraper", version, about = "Sweeps a cascading search form and exports every result row")]
struct Cli {
    /// JSON configuration file; built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the form URL.
    #[arg(long)]
    url: Option<String>,

    /// Overrides the CSV output path.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum result pages read per combination.
    #[arg(long)]
    page_cap: Option<usize>,

    /// Shows the browser window.
    #[arg(long)]
    headed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(url) = cli.url {
        config.seed.url = url;
    }
    if let Some(output) = cli.output {
        config.output.csv_path = output;
    }
    if cli.page_cap.is_some() {
        config.seed.page_cap = cli.page_cap;
    }
    if cli.headed {
        config.browser.headless = false;
    }
    config.validate()?;

    info!(url = %config.seed.url, regions = config.seed.regions.len(), "starting sweep");

    let mut browser = ChromeBrowser::new();
    browser.launch(&config.browser).await?;
    let tab = browser.new_tab().await?;
    browser
        .navigate(&tab, &config.seed.url, config.browser.navigation_timeout_ms)
        .await?;
    let landed = browser.get_url(&tab).await?;
    info!(url = %landed, "form page loaded");

    let browser = Arc::new(browser);
    let host = ScriptedFormHost::new(browser.clone(), tab)
        .with_network_idle(config.timing.network_idle());
    if let Err(e) = host
        .wait_for_network_idle(config.timing.network_timeout())
        .await
    {
        warn!(error = %e, "form page did not settle, continuing");
    }

    let outcome = SweepDriver::new(&host, &config.seed, &config.timing)
        .run()
        .await;

    let written = CsvSink::new(&config.output.csv_path).write_records(&outcome.records)?;
    info!(
        session = %outcome.session_id,
        written,
        skipped = outcome.skips.len(),
        pages = outcome.pages_visited,
        elapsed_s = (outcome.finished_at - outcome.started_at).num_seconds(),
        path = %config.output.csv_path.display(),
        "export complete"
    );

    drop(host);
    if let Ok(mut browser) = Arc::try_unwrap(browser) {
        if let Err(e) = browser.close().await {
            warn!(error = %e, "browser did not close cleanly");
        }
    }

    match outcome.fatal {
        Some(fatal) => {
            error!(kind = fatal.kind(), "sweep ended early");
            Err(fatal.into())
        }
        None => Ok(()),
    }
}
