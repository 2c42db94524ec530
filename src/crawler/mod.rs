//! Crawler module for autocrawler
//! Contains the link extraction, download and orchestration layers

pub mod browser;
pub mod cli;
pub mod config_loader;
pub mod downloader;
pub mod imbalance;
pub mod keywords;
pub mod layout;
pub mod link_extractor;
pub mod links;
pub mod logger;
pub mod orchestration;
pub mod selectors;
pub mod site;
pub mod worker_pool;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types for convenience
pub use config_loader::{AppConfig, CrawlConfig, load_app_config};
pub use browser::WebDriverLauncher;
pub use orchestration::{Orchestrator, RunSummary};
