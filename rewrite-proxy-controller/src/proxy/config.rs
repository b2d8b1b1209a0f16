use std::convert::TryFrom;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Error};
use rewrite_proxy_engine::proxy::http::config::Config as HttpConfig;

use crate::raw_config::RawConfig;

pub const DEFAULT_LISTEN_PORT: u16 = 8678;
pub const DEFAULT_RULES_FILE: &str = "config.txt";
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    pub rules_file: PathBuf,
    pub watch_interval: Duration,
    pub proxy_config: HttpConfig,
}

impl TryFrom<RawConfig> for Config {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let watch_interval = raw.watch_interval.unwrap_or(DEFAULT_WATCH_INTERVAL);
        if watch_interval.is_zero() {
            return Err(anyhow!("watch_interval must be greater than zero"));
        }
        Ok(Config {
            rules_file: raw
                .rules_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_FILE)),
            watch_interval,
            proxy_config: HttpConfig {
                proxy_port: raw.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
                document_root: raw.document_root,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::*;

    #[test]
    fn test_try_into() {
        let config: Config = RawConfig::default().try_into().unwrap();
        assert_eq!(
            config,
            Config {
                rules_file: PathBuf::from("config.txt"),
                watch_interval: Duration::from_secs(1),
                proxy_config: HttpConfig {
                    proxy_port: 8678,
                    document_root: None,
                },
            }
        );

        let config: Config = RawConfig {
            listen_port: Some(3128),
            rules_file: Some(PathBuf::from("rules.txt")),
            document_root: Some("/srv".to_string()),
            watch_interval: Some(Duration::from_millis(200)),
        }
        .try_into()
        .unwrap();
        assert_eq!(config.proxy_config.proxy_port, 3128);
        assert_eq!(config.proxy_config.document_root.as_deref(), Some("/srv"));
        assert_eq!(config.watch_interval, Duration::from_millis(200));

        let zero: Result<Config, _> = RawConfig {
            watch_interval: Some(Duration::from_secs(0)),
            ..Default::default()
        }
        .try_into();
        assert!(zero.is_err());
    }
}
