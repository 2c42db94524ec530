use std::env::current_dir;
use std::io::{IsTerminal, stdin, stdout};

use anyhow::Error;
use chrono::Local;
use console::{Term, style};
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use tracing::{info, trace, warn};

use crate::crawler::cli::Cli;
use crate::crawler::imbalance::{self, ImbalanceReport};
use crate::crawler::worker_pool;
use crate::crawler::{AppConfig, CrawlConfig, Orchestrator, RunSummary, WebDriverLauncher};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handles the flow of a crawl run from settings to the final imbalance check.
pub(crate) struct Program {
    app_config: AppConfig,
    cli: Cli,
}

impl Program {
    pub(crate) fn new(app_config: AppConfig, cli: Cli) -> Self {
        Self { app_config, cli }
    }

    /// Runs the crawler.
    pub(crate) async fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("autocrawler");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Working Directory: {}", current_dir()?.display());

        let config = CrawlConfig::resolve(&self.app_config, &self.cli)?;
        print_settings(&config);
        if config.engines.is_empty() {
            warn!("Both Google and Naver are disabled; nothing to crawl");
        }

        let launcher = WebDriverLauncher::new(config.browser.clone(), config.headless);
        let orchestrator = Orchestrator::new(config, launcher);
        let summary = orchestrator.run(worker_pool::ctrl_c()).await?;

        print_summary(&summary);
        if let Some(report) = &summary.imbalance {
            // skip the prompt after Ctrl-C, the counts are incomplete
            if !summary.interrupted {
                review_imbalance(report)?;
            }
        }

        info!("Program finished");
        Ok(())
    }
}

fn print_settings(config: &CrawlConfig) {
    let engines: Vec<&str> = config.engines.iter().map(|e| e.name()).collect();
    let flag = |on: bool| if on { style("yes").green() } else { style("no").dim() };

    println!("{}", style(format!("{} {}", NAME, VERSION)).bold().cyan());
    println!("  started        {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("  keywords       {}", config.keywords_file.display());
    println!("  download path  {}", config.download_path.display());
    println!("  engines        {}", style(engines.join(", ")).yellow());
    println!("  threads        {}", config.threads);
    println!("  skip existing  {}", flag(config.skip_existing));
    println!("  full size      {}", flag(config.full_resolution));
    println!("  face search    {}", flag(config.face));
    println!("  headless       {}", flag(config.headless));
    println!(
        "  limit          {}",
        if config.limit == 0 { "unlimited".to_string() } else { config.limit.to_string() }
    );
    println!("  proxies        {}", config.proxies.len());

    info!(
        threads = config.threads,
        engines = ?engines,
        full_resolution = config.full_resolution,
        face = config.face,
        headless = config.headless,
        limit = config.limit,
        proxies = config.proxies.len(),
        "Effective settings"
    );
}

fn print_summary(summary: &RunSummary) {
    let status = if summary.interrupted {
        style("interrupted").red().bold()
    } else {
        style("done").green().bold()
    };
    println!(
        "{} {} of {} tasks finished, {} links found, {} images saved, {} tasks failed",
        status, summary.completed, summary.tasks, summary.links, summary.images, summary.failed
    );
    info!(
        keywords = summary.keywords,
        completed_sites = summary.marked,
        "Run summary"
    );
}

/// Lists undersized keyword directories and offers to delete them so they
/// are crawled again on the next run.
fn review_imbalance(report: &ImbalanceReport) -> Result<(), Error> {
    for (dir, count) in &report.counts {
        trace!("Directory: {}, files: {}", dir.display(), count);
    }

    if report.is_balanced() {
        println!("{}", style("No data imbalance detected.").green());
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "Data imbalance detected: these keywords have less than 50% of the average ({:.1}) file count.",
            report.mean
        ))
        .yellow()
    );
    for (dir, count) in &report.undersized {
        println!("  {} ({} files)", dir.display(), count);
    }

    if !(stdin().is_terminal() && stdout().is_terminal()) {
        info!("Non-interactive session; leaving undersized directories in place");
        return Ok(());
    }

    let remove = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Delete these directories?")
        .default(false)
        .interact()?;

    if remove {
        let removed = imbalance::remove_directories(&report.undersized);
        println!(
            "Removed {} directories. Run again with skip enabled to download them again.",
            removed
        );
    }
    Ok(())
}
