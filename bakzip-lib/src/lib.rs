use serde::{Deserialize, Serialize};

/// Interval between spinner frames when nothing else is configured.
pub const DEFAULT_INTERVAL_MS: u64 = 40;

/// Archive name template used when no `name` is configured.
pub const DEFAULT_NAME_TEMPLATE: &str = "%src%.zip";

/// Backup settings, merged from the environment, a config file and the command line.
///
/// Every field is optional so that partial sources can be layered; see
/// [`Config::merge`] for the priority rules. The source and destination
/// folders are positional arguments only and never live here.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub config: Option<String>,
    pub name: Option<String>,
    pub dry: Option<bool>,
    pub skip: Option<Vec<String>>,
    pub spinner: Option<bool>,
    pub interval_ms: Option<u64>,
}

impl Config {
    /// Merge configs by priority: env < file < cli
    pub fn merge(env: Config, file: Config, cli: Config) -> Config {
        fn pick<T>(env: Option<T>, file: Option<T>, cli: Option<T>) -> Option<T> {
            cli.or(file).or(env)
        }

        Config {
            config: pick(env.config, file.config, cli.config),
            name: pick(env.name, file.name, cli.name),
            dry: pick(env.dry, file.dry, cli.dry),
            skip: pick(env.skip, file.skip, cli.skip),
            spinner: pick(env.spinner, file.spinner, cli.spinner),
            interval_ms: pick(env.interval_ms, file.interval_ms, cli.interval_ms),
        }
    }

    /// Fills in the defaults for optional parameters that no source defined.
    pub fn with_defaults(mut self) -> Config {
        if self.name.is_none() {
            self.name = Some(DEFAULT_NAME_TEMPLATE.to_string());
        }
        if self.dry.is_none() {
            self.dry = Some(false);
        }
        if self.spinner.is_none() {
            self.spinner = Some(true);
        }
        if self.interval_ms.is_none() {
            self.interval_ms = Some(DEFAULT_INTERVAL_MS);
        }
        self
    }
}
