use std::process::exit;
use std::sync::Arc;

use rewrite_proxy_engine::engine::RuleEngine;
use rewrite_proxy_engine::handler::http::rule::Ruleset;
use tokio::signal::unix::SignalKind;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cmd::command_line::{get_config_from_opt, Opt};
use crate::proxy::exec::Proxy;
use crate::signal::Signals;

pub mod cmd;
pub mod proxy;
pub mod raw_config;
pub mod signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = match Opt::from_args_checked() {
        Err(e) => {
            println!("{}", e);
            exit(1)
        }
        Ok(o) => o,
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(opt.get_level_filter().into()))
        .init();

    let config = get_config_from_opt(&opt).await?;
    let mut signals = Signals::from_kinds(&[
        SignalKind::hangup(),
        SignalKind::interrupt(),
        SignalKind::terminate(),
    ])?;

    let mut proxy = Proxy::new(Arc::new(RuleEngine::new(Ruleset::default())));
    proxy.start(config).await?;

    while signals.wait().await == SignalKind::hangup() {
        info!("SIGHUP received, reloading rules");
        proxy.reload().await;
    }
    proxy.stop().await?;
    Ok(())
}
