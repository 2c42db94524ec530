//! Command-line interface. Every crawl flag is optional and overrides the
//! matching `[crawl]` entry in the config file when given.

use std::path::PathBuf;

use clap::Parser;
use clap::builder::BoolishValueParser;

use crate::crawler::config_loader::HeadlessMode;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "autocrawler", version, about = "Keyword-driven image crawler for Google and Naver image search")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "AUTOCRAWLER_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Keyword file, one search term per line
    #[arg(long)]
    pub keywords: Option<PathBuf>,

    /// Root directory for downloaded images
    #[arg(long)]
    pub download_path: Option<PathBuf>,

    /// Skip keywords that were already crawled on every engine
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub skip: Option<bool>,

    /// Number of concurrent crawl tasks
    #[arg(long)]
    pub threads: Option<usize>,

    /// Crawl Google image search
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub google: Option<bool>,

    /// Crawl Naver image search
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub naver: Option<bool>,

    /// Open each result and collect full-resolution images instead of thumbnails
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub full: Option<bool>,

    /// Restrict results to faces
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub face: Option<bool>,

    /// Run the browser headless (auto: headless only in full-resolution mode)
    #[arg(long = "no_gui", alias = "no-gui", value_enum)]
    pub no_gui: Option<HeadlessMode>,

    /// Maximum images per keyword and site (0 = unlimited)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Comma separated proxy list; each task picks one at random
    #[arg(long)]
    pub proxy_list: Option<String>,
}
