//! Configuration: YAML file + CLI flags, CLI overriding file.
//!
//! Grounded in `config_loader.py` (the YAML schema) and `crawler_cli.py`
//! (the flag set and the override-the-config-with-flags behavior).

use std::path::Path;

use clap::Parser;
use regex::Regex;
use serde::Deserialize;

use crate::error::CrawlerError;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(rename = "type", default = "default_storage_type")]
    pub kind: String,
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_type() -> String {
    "json".to_string()
}

fn default_storage_path() -> String {
    "results.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerSection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "default_respect_robots")]
    pub respect_robots: bool,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

fn default_max_concurrent() -> usize {
    5
}
fn default_max_depth() -> usize {
    2
}
fn default_rate_limit() -> f64 {
    1.0
}
fn default_respect_robots() -> bool {
    false
}

impl Default for CrawlerSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_depth: default_max_depth(),
            rate_limit: default_rate_limit(),
            respect_robots: default_respect_robots(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            allowed_domains: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub start_urls: Vec<String>,
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub crawler: CrawlerSection,
    #[serde(default)]
    pub storage: StorageConfig,
    pub log_file: Option<String>,
    pub log_level: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, CrawlerError> {
        let text = std::fs::read_to_string(path).map_err(|source| CrawlerError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| CrawlerError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// CLI flags. All optional so the config-file value (or
/// built-in default) survives when a flag isn't passed.
#[derive(Debug, Parser)]
#[command(name = "async_crawler", about = "A polite, concurrent async web crawler")]
pub struct CliArgs {
    #[arg(long = "urls", num_args = 1..)]
    pub urls: Vec<String>,

    #[arg(long = "max-pages")]
    pub max_pages: Option<usize>,

    #[arg(long = "max-depth")]
    pub max_depth: Option<usize>,

    #[arg(long = "max-concurrent")]
    pub max_concurrent: Option<usize>,

    #[arg(long = "rate-limit")]
    pub rate_limit: Option<f64>,

    #[arg(long = "respect-robots")]
    pub respect_robots: bool,

    #[arg(long = "config")]
    pub config: Option<String>,

    #[arg(long = "output")]
    pub output: Option<String>,

    #[arg(long = "log-file")]
    pub log_file: Option<String>,
}

/// The fully-resolved settings the orchestrator runs with.
#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    pub start_urls: Vec<String>,
    pub max_pages: usize,
    pub max_concurrent: usize,
    pub max_depth: usize,
    pub rate_limit: f64,
    pub respect_robots: bool,
    pub include_patterns: Vec<Regex>,
    pub exclude_patterns: Vec<Regex>,
    pub allowed_domains: Vec<String>,
    pub storage: StorageConfig,
    pub log_file: Option<String>,
    pub log_level: String,
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, CrawlerError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| CrawlerError::InvalidPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

impl CrawlerSettings {
    /// Merge a (possibly absent) config file with CLI flags, flags taking
    /// precedence field-by-field. Never panics; an invalid pattern or
    /// unreadable/unparsable config file is a `CrawlerError`.
    pub fn resolve(args: &CliArgs) -> Result<Self, CrawlerError> {
        let file = match &args.config {
            Some(path) => ConfigFile::load(Path::new(path))?,
            None => ConfigFile::default(),
        };

        let start_urls = if !args.urls.is_empty() {
            args.urls.clone()
        } else {
            file.start_urls.clone()
        };

        if start_urls.is_empty() {
            return Err(CrawlerError::NoSeeds);
        }

        let storage = if args.output.is_some() || args.config.is_none() {
            StorageConfig {
                kind: file.storage.kind.clone(),
                path: args
                    .output
                    .clone()
                    .unwrap_or_else(|| file.storage.path.clone()),
            }
        } else {
            file.storage.clone()
        };

        Ok(Self {
            start_urls,
            max_pages: args.max_pages.or(file.max_pages).unwrap_or(100),
            max_concurrent: args.max_concurrent.unwrap_or(file.crawler.max_concurrent),
            max_depth: args.max_depth.unwrap_or(file.crawler.max_depth),
            rate_limit: args.rate_limit.unwrap_or(file.crawler.rate_limit),
            respect_robots: args.respect_robots || file.crawler.respect_robots,
            include_patterns: compile_patterns(&file.crawler.include_patterns)?,
            exclude_patterns: compile_patterns(&file.crawler.exclude_patterns)?,
            allowed_domains: file.crawler.allowed_domains.clone(),
            storage,
            log_file: args.log_file.clone().or(file.log_file),
            log_level: file.log_level.unwrap_or_else(|| "INFO".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CliArgs {
        CliArgs {
            urls: vec![],
            max_pages: None,
            max_depth: None,
            max_concurrent: None,
            rate_limit: None,
            respect_robots: false,
            config: None,
            output: None,
            log_file: None,
        }
    }

    #[test]
    fn no_seeds_anywhere_is_an_error() {
        let err = CrawlerSettings::resolve(&args()).unwrap_err();
        assert!(matches!(err, CrawlerError::NoSeeds));
    }

    #[test]
    fn cli_urls_satisfy_no_seeds_check() {
        let mut a = args();
        a.urls = vec!["https://example.com".into()];
        let settings = CrawlerSettings::resolve(&a).unwrap();
        assert_eq!(settings.start_urls, vec!["https://example.com".to_string()]);
        assert_eq!(settings.max_pages, 100);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let mut a = args();
        a.urls = vec!["https://example.com".into()];
        a.max_depth = Some(7);
        let settings = CrawlerSettings::resolve(&a).unwrap();
        assert_eq!(settings.max_depth, 7);
    }
}
