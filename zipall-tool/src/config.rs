use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::{env, fs};

use anyhow::{Context, Result, bail};
use glob::Pattern;
use tracing::warn;
use zipall_lib::Config;

use crate::Cli;
use crate::fs_utils::compile_patterns;

pub const DEFAULT_JOBS: i64 = -1;
pub const DEFAULT_DEPTH: usize = 0;
pub const DEFAULT_LEVEL: i32 = 1;
pub const MAX_LEVEL: i32 = 9;

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub depth: usize,
    /// Raw `--jobs` value; see `process::resolve_concurrency`.
    pub jobs: i64,
    pub level: i32,
    pub delete: bool,
    pub include_files: bool,
    pub skip: Vec<Pattern>,
    pub dry_run: bool,
    pub progress: bool,
}

/// Merges environment, config file and command line, then fills in defaults.
pub fn merged_config(cli: &Cli) -> Result<Config> {
    let vars: HashMap<String, String> = env::vars().collect();
    let env_config = read_env(&vars);

    let mut file_config = Config::default();
    if let Some(path) = cli.config.clone().or(env_config.config.clone()) {
        file_config = read_config_file(&path)?;
    }

    let mut merged = Config::merge(env_config, file_config, cli_to_config(cli));
    merged.jobs = merged.jobs.or(Some(DEFAULT_JOBS));
    merged.depth = merged.depth.or(Some(DEFAULT_DEPTH));
    merged.cl = merged.cl.or(Some(DEFAULT_LEVEL));
    merged.delete = merged.delete.or(Some(false));
    merged.zipfiles = merged.zipfiles.or(Some(false));
    merged.dry_run = merged.dry_run.or(Some(false));
    merged.progress = merged.progress.or(Some(true));
    Ok(merged)
}

impl Settings {
    pub fn resolve(cli: &Cli, merged: &Config) -> Result<Settings> {
        let level = merged.cl.unwrap_or(DEFAULT_LEVEL);
        if !(0..=MAX_LEVEL).contains(&level) {
            bail!("compression level must be between 0 and {MAX_LEVEL}, got {level}");
        }
        let skip = compile_patterns(merged.skip.as_deref().unwrap_or_default())?;
        let input = cli.input.clone().context("missing <input> directory")?;

        Ok(Settings {
            output: cli.output.clone().unwrap_or_else(|| input.clone()),
            input,
            depth: merged.depth.unwrap_or(DEFAULT_DEPTH),
            jobs: merged.jobs.unwrap_or(DEFAULT_JOBS),
            level,
            delete: merged.delete.unwrap_or(false),
            include_files: merged.zipfiles.unwrap_or(false),
            skip,
            dry_run: merged.dry_run.unwrap_or(false),
            progress: merged.progress.unwrap_or(true),
        })
    }
}

/// Reads variables prefixed with ZIPALL_
fn read_env(vars: &HashMap<String, String>) -> Config {
    macro_rules! get_env {
        ($key:expr) => {
            vars.get(&format!("ZIPALL_{}", $key)).cloned()
        };
    }
    fn flag(v: String) -> bool {
        v == "true" || v == "1" || v.eq_ignore_ascii_case("yes")
    }

    Config {
        config: get_env!("CONFIG"),
        jobs: get_env!("JOBS").and_then(|v| parse_number("ZIPALL_JOBS", &v)),
        depth: get_env!("DEPTH").and_then(|v| parse_number("ZIPALL_DEPTH", &v)),
        cl: get_env!("CL").and_then(|v| parse_number("ZIPALL_CL", &v)),
        delete: get_env!("DELETE").map(flag),
        zipfiles: get_env!("ZIPFILES").map(flag),
        skip: get_env!("SKIP").map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }),
        dry_run: get_env!("DRY_RUN").map(flag),
        progress: get_env!("PROGRESS").map(flag),
    }
}

/// Unparsable values are ignored with a warning so the next layer or the default applies.
fn parse_number<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Ignoring {key}={value:?}: not a valid number");
            None
        }
    }
}

/// Reads YAML or JSON config from file
fn read_config_file(path: &str) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    let cfg = if path.to_lowercase().ends_with(".json") {
        serde_json::from_str(&content).with_context(|| format!("parsing JSON config {path}"))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("parsing YAML config {path}"))?
    };
    Ok(cfg)
}

/// Converts CLI flags into a config layer. Unset switches stay `None` so that
/// lower layers can still turn them on.
fn cli_to_config(cli: &Cli) -> Config {
    Config {
        config: cli.config.clone(),
        jobs: cli.jobs,
        depth: cli.depth,
        cl: cli.cl,
        delete: cli.delete.then_some(true),
        zipfiles: cli.zipfiles.then_some(true),
        skip: if cli.skip.is_empty() {
            None
        } else {
            Some(cli.skip.clone())
        },
        dry_run: cli.dry_run.then_some(true),
        progress: cli.no_progress.then_some(false),
    }
}
