use serde::{Deserialize, Serialize};

/// One layer of zipall settings. Every field is optional so that environment,
/// config file and command line can each provide a partial view.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub config: Option<String>,
    pub jobs: Option<i64>,
    pub depth: Option<usize>,
    pub cl: Option<i32>,
    pub delete: Option<bool>,
    pub zipfiles: Option<bool>,
    pub skip: Option<Vec<String>>,
    pub dry_run: Option<bool>,
    pub progress: Option<bool>,
}

impl Config {
    /// Merge layers by priority: env < file < cli.
    pub fn merge(env: Config, file: Config, cli: Config) -> Config {
        fn pick<T>(env: Option<T>, file: Option<T>, cli: Option<T>) -> Option<T> {
            cli.or(file).or(env)
        }

        Config {
            config: pick(env.config, file.config, cli.config),
            jobs: pick(env.jobs, file.jobs, cli.jobs),
            depth: pick(env.depth, file.depth, cli.depth),
            cl: pick(env.cl, file.cl, cli.cl),
            delete: pick(env.delete, file.delete, cli.delete),
            zipfiles: pick(env.zipfiles, file.zipfiles, cli.zipfiles),
            skip: pick(env.skip, file.skip, cli.skip),
            dry_run: pick(env.dry_run, file.dry_run, cli.dry_run),
            progress: pick(env.progress, file.progress, cli.progress),
        }
    }
}
