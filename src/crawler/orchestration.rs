//! Crawl orchestration
//!
//! This module:
//! 1. Loads and normalizes the keyword file
//! 2. Plans one task per keyword and enabled engine, honouring skip mode
//! 3. Runs the tasks on the worker pool, each in its own traced span
//! 4. Checks the download tree for imbalance once the pool drains

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::crawler::browser::SessionLauncher;
use crate::crawler::config_loader::CrawlConfig;
use crate::crawler::downloader::{DownloadError, DownloadReport, Downloader};
use crate::crawler::imbalance::{self, ImbalanceReport};
use crate::crawler::keywords::{self, Keyword, KeywordError};
use crate::crawler::layout;
use crate::crawler::link_extractor::LinkExtractor;
use crate::crawler::site::{Engine, Site};
use crate::crawler::worker_pool::{Cancellation, WorkerPool};

const PROGRESS_TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}";

/// Error types for the orchestration layer
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Keyword error: {0}")]
    Keywords(#[from] KeywordError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

/// Result type for orchestration operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// One unit of work: a keyword crawled on one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub keyword: Keyword,
    pub site: Site,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: Task,
    pub links: usize,
    pub report: DownloadReport,
    pub marked: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub keywords: usize,
    pub tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub links: usize,
    pub images: usize,
    pub marked: usize,
    pub interrupted: bool,
    pub imbalance: Option<ImbalanceReport>,
}

pub struct Orchestrator<L: SessionLauncher> {
    config: Arc<CrawlConfig>,
    launcher: Arc<L>,
}

impl<L: SessionLauncher> Orchestrator<L> {
    pub fn new(config: CrawlConfig, launcher: L) -> Self {
        Self {
            config: Arc::new(config),
            launcher: Arc::new(launcher),
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// One task per keyword and enabled engine.
    ///
    /// In skip mode a keyword is left out only when every engine already has
    /// its completion marker; otherwise all of its engines are crawled again.
    pub fn plan_tasks(&self, keywords: &[Keyword]) -> Vec<Task> {
        let root = &self.config.download_path;
        let sites = self.config.sites();
        let mut tasks = Vec::with_capacity(keywords.len() * sites.len());

        for keyword in keywords {
            let done_everywhere = Engine::all()
                .iter()
                .all(|engine| layout::is_done(root, keyword, *engine));
            if self.config.skip_existing && done_everywhere {
                info!("Skipping done task {}", keyword);
                continue;
            }
            tasks.extend(sites.iter().map(|site| Task {
                keyword: keyword.clone(),
                site: *site,
            }));
        }
        tasks
    }

    /// Crawls every planned task, then runs the imbalance check. Returns
    /// without checking when no task was planned.
    ///
    /// `interrupt` resolving stops the pool; tasks already running return what
    /// they have collected.
    pub async fn run(&self, interrupt: impl Future<Output = ()>) -> OrchestratorResult<RunSummary> {
        let keywords = keywords::load_keywords(&self.config.keywords_file)?;
        tokio::fs::create_dir_all(&self.config.download_path).await?;

        let tasks = self.plan_tasks(&keywords);
        let mut summary = RunSummary {
            keywords: keywords.len(),
            tasks: tasks.len(),
            ..RunSummary::default()
        };
        info!("Planned {} tasks for {} keywords", tasks.len(), keywords.len());
        if tasks.is_empty() {
            info!("Nothing to crawl");
            return Ok(summary);
        }

        let progress = progress_bar(tasks.len() as u64);
        let pool = WorkerPool::new(self.config.threads, self.config.shutdown_grace);
        let config = self.config.clone();
        let launcher = self.launcher.clone();
        let bar = progress.clone();

        let report = pool
            .run(
                tasks,
                Cancellation::new(),
                move |task, cancel| {
                    let config = config.clone();
                    let launcher = launcher.clone();
                    let bar = bar.clone();
                    async move {
                        bar.set_message(format!("{} @ {}", task.keyword, task.site));
                        let outcome = run_task(&config, launcher.as_ref(), task, cancel).await;
                        bar.inc(1);
                        outcome
                    }
                },
                interrupt,
            )
            .await;
        progress.finish_and_clear();

        summary.interrupted = report.interrupted;
        summary.failed = report.failures + report.panics;
        summary.completed = report.outputs.len();
        for outcome in &report.outputs {
            debug!(
                "{} @ {}: {} links, {} saved, {} failed",
                outcome.task.keyword,
                outcome.task.site,
                outcome.links,
                outcome.report.files.len(),
                outcome.report.failed
            );
            summary.links += outcome.links;
            summary.images += outcome.report.succeeded;
            summary.marked += usize::from(outcome.marked);
        }

        let root = self.config.download_path.clone();
        summary.imbalance = tokio::task::spawn_blocking(move || imbalance::check(&root))
            .await
            .map_err(|e| OrchestratorError::TaskJoin(e.to_string()))??;

        info!(
            "Finished {}/{} tasks, {} images, {} failed{}",
            summary.completed,
            summary.tasks,
            summary.images,
            summary.failed,
            if summary.interrupted { " (interrupted)" } else { "" }
        );
        Ok(summary)
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");

    let bar = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr_with_hz(5));
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}

/// Launch, extract, download and mark one keyword on one site.
async fn run_task<L: SessionLauncher>(
    config: &CrawlConfig,
    launcher: &L,
    task: Task,
    cancel: Cancellation,
) -> OrchestratorResult<TaskOutcome> {
    let span = info_span!("task", id = %Uuid::new_v4(), keyword = %task.keyword, site = %task.site);

    async move {
        let browser = launcher.launch(config.random_proxy()).await;
        let extractor = LinkExtractor::new(config.pacing, cancel.clone());
        let links = extractor
            .extract(browser, &task.keyword, config.modifier(task.site), task.site, config.limit)
            .await;

        let downloader = Downloader::new(&config.download_path, config.download_timeout, &config.user_agent)?;
        let report = downloader
            .download(&task.keyword, &links, task.site.name(), config.limit, &cancel)
            .await?;

        let marked = if report.succeeded > 0 {
            let marker = layout::mark_done(&config.download_path, &task.keyword, task.site.engine())?;
            debug!("Wrote {}", marker.display());
            true
        } else {
            warn!("No images saved; leaving {} unmarked", task.site.engine());
            false
        };

        Ok(TaskOutcome {
            links: links.len(),
            report,
            marked,
            task,
        })
    }
    .instrument(span)
    .await
}
