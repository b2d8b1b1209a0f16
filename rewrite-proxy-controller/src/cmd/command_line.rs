use std::convert::TryInto;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use structopt::StructOpt;
use tokio::fs::read_to_string;
use tracing_subscriber::filter::LevelFilter;

use crate::proxy::config::Config;
use crate::raw_config::RawConfig;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "rewrite-proxy",
    about = "A proxy rewriting, redirecting, fabricating or aborting requests by the rules of a text file."
)]
pub struct Opt {
    /// path of the rules file, `config.txt` unless the settings file names one
    #[structopt(name = "FILE", parse(from_os_str))]
    pub input: Option<PathBuf>,

    /// settings file, yaml or json
    #[structopt(short, long, parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// Port the proxy listens on. Default is 8678.
    #[structopt(short, long)]
    pub port: Option<u16>,

    /// initial value substituted for `~` in rule templates
    #[structopt(long)]
    pub document_root: Option<String>,

    // The number of occurrences of the `v/verbose` flag
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: u8,
}

impl Opt {
    pub fn get_level_filter(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::ERROR,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    pub fn from_args_checked() -> Result<Self> {
        Self::from_args_safe()?.checked()
    }

    fn checked(self) -> Result<Self> {
        if let Some(path) = &self.config {
            settings_format(path)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum SettingsFormat {
    Json,
    Yaml,
}

fn settings_format(path: &Path) -> Result<SettingsFormat> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(SettingsFormat::Json),
        Some("yaml") | Some("yml") => Ok(SettingsFormat::Yaml),
        _ => Err(anyhow!("invalid file extension of {:?}", path)),
    }
}

/// get_config_from_opt reads the settings file, if any, and lets the command line override it.
pub async fn get_config_from_opt(opt: &Opt) -> Result<Config> {
    let mut raw: RawConfig = match opt.config {
        None => RawConfig::default(),
        Some(ref path_buf) => {
            let buffer = read_to_string(path_buf).await?;
            match settings_format(path_buf)? {
                SettingsFormat::Json => serde_json::from_str(&buffer)?,
                SettingsFormat::Yaml => serde_yaml::from_str(&buffer)?,
            }
        }
    };
    if opt.input.is_some() {
        raw.rules_file = opt.input.clone();
    }
    if opt.port.is_some() {
        raw.listen_port = opt.port;
    }
    if opt.document_root.is_some() {
        raw.document_root = opt.document_root.clone();
    }
    raw.try_into()
}
