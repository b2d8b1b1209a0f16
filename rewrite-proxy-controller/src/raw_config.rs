use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// RawConfig is the settings file, in yaml or json.
#[derive(Debug, Eq, PartialEq, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)] // To prevent typos.
pub struct RawConfig {
    pub listen_port: Option<u16>,
    pub rules_file: Option<PathBuf>,
    pub document_root: Option<String>,
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub watch_interval: Option<Duration>,
}
