use std::{env, path::PathBuf};

use anyhow::{Result, anyhow};

use crate::config::{Config, DEFAULT_CONFIG_PATH};

const USAGE: &str = "usage: kuma-probe [--config <path>] [--url <base-url>] [--username <name>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub config_path: PathBuf,
    /// True when `--config` was given; a missing file is then an error.
    pub config_explicit: bool,
    pub base_url: Option<String>,
    pub username: Option<String>,
}

impl CliOptions {
    /// Command-line values win over both the config file and the environment.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.server.base_url = base_url.clone();
        }
        if let Some(username) = &self.username {
            config.credentials.username = username.clone();
        }
    }
}

pub fn cli_options_from_args() -> Result<CliOptions> {
    parse_cli_options(env::args().skip(1))
}

pub fn parse_cli_options<I>(mut args: I) -> Result<CliOptions>
where
    I: Iterator<Item = String>,
{
    let mut config_path = None;
    let mut base_url = None;
    let mut username = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --config. {USAGE}"))?;
                config_path = Some(PathBuf::from(value));
            }
            "--url" => {
                base_url = Some(
                    args.next()
                        .ok_or_else(|| anyhow!("missing value for --url. {USAGE}"))?,
                );
            }
            "--username" => {
                username = Some(
                    args.next()
                        .ok_or_else(|| anyhow!("missing value for --username. {USAGE}"))?,
                );
            }
            other => return Err(anyhow!("unknown argument: {other}. {USAGE}")),
        }
    }

    if username.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(anyhow!("username cannot be empty"));
    }

    Ok(CliOptions {
        config_explicit: config_path.is_some(),
        config_path: config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        base_url,
        username,
    })
}
