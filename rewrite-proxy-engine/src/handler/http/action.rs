use std::path::PathBuf;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::handler::http::exec::Executor;
use crate::handler::http::pattern::{normalize_scheme, Pattern};
use crate::handler::http::state::RequestState;
use crate::handler::http::template::{document_root, expand, Captures};

static DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(?:([a-zA-Z/-]+);)?(base64,)?(.*)").expect("data url expression is valid")
});

static PROXY_TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([^:]*):([^@]*)@)?([^:]*):([0-9]*)$").expect("proxy expression is valid")
});

const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Action is the right hand side of a rule: what happens to a request once its pattern matched.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Action {
    /// `$`
    Default,
    /// empty text
    Abort,
    /// `data:[mime;][base64,]payload`
    Data {
        template: String,
        content_type: String,
        base64: bool,
    },
    /// `file://path`
    File { template: String },
    /// `proxy:[user:pass@]host:port`; `None` when the target could not be parsed.
    ForwardVia { upstream: Option<Upstream> },
    /// `bin:command`
    RunExternal { command: String },
    /// `eval:command`
    EvalDirective { command: String },
    /// anything else, a URL template.
    Rewrite { url: String },
}

/// Upstream is a proxy the request is forwarded through.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Disposition tells the transport how to finish a request once the engine is done with it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Disposition {
    /// Dispatch the (possibly modified) request to its destination.
    Forward,
    /// Answer with this body without contacting the origin.
    Send(Vec<u8>),
    /// Answer with the contents of a local file.
    SendFile(PathBuf),
    /// Drop the request without any response.
    Abort,
}

/// compile_action selects the [Action] for the right operand of a rule line.
pub fn compile_action(pattern: &Pattern, text: &str) -> Action {
    if text == "$" {
        return Action::Default;
    }
    if text.is_empty() {
        return Action::Abort;
    }
    if let Some(caps) = DATA_URL.captures(text) {
        return Action::Data {
            template: caps.get(3).map_or("", |m| m.as_str()).to_string(),
            content_type: caps
                .get(1)
                .map_or(DEFAULT_CONTENT_TYPE, |m| m.as_str())
                .to_string(),
            base64: caps.get(2).is_some(),
        };
    }
    if let Some(path) = text.strip_prefix("file://") {
        return Action::File {
            template: path.to_string(),
        };
    }
    if let Some(target) = text.strip_prefix("proxy:") {
        let upstream = parse_upstream(target.trim());
        if upstream.is_none() {
            warn!("proxy target `{}` is malformed, requests will not be forwarded through it", target);
        }
        return Action::ForwardVia { upstream };
    }
    if let Some(command) = text.strip_prefix("bin:") {
        return Action::RunExternal {
            command: command.trim().to_string(),
        };
    }
    if let Some(command) = text.strip_prefix("eval:") {
        return Action::EvalDirective {
            command: command.trim().to_string(),
        };
    }
    Action::Rewrite {
        url: if pattern.is_literal() {
            normalize_scheme(text).into_owned()
        } else {
            text.to_string()
        },
    }
}

fn parse_upstream(target: &str) -> Option<Upstream> {
    let caps = PROXY_TARGET.captures(target)?;
    let port = caps.get(4)?.as_str().parse().ok()?;
    let credentials = match (caps.get(1), caps.get(2)) {
        (Some(user), Some(password)) => Some(Credentials {
            user: user.as_str().to_string(),
            password: password.as_str().to_string(),
        }),
        _ => None,
    };
    Some(Upstream {
        host: caps.get(3)?.as_str().to_string(),
        port,
        credentials,
    })
}

/// decode_base64 decodes a data URL payload leniently: url-safe letters are accepted, bytes
/// outside the alphabet are skipped, decoding stops at the first `=` and a dangling last
/// character is ignored.
fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let mut cleaned: String = payload
        .chars()
        .take_while(|c| *c != '=')
        .filter_map(|c| match c {
            '-' => Some('+'),
            '_' => Some('/'),
            c if c.is_ascii_alphanumeric() || c == '+' || c == '/' => Some(c),
            _ => None,
        })
        .collect();
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    base64::decode_config(&cleaned, base64::STANDARD_NO_PAD.decode_allow_trailing_bits(true))
        .map_err(|e| anyhow!("invalid base64 payload: {}", e))
}

/// join_path appends the unmatched suffix of a request to a file path template.
fn join_path(base: &str, suffix: &str) -> String {
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), suffix)
}

impl Action {
    /// execute performs the action on the request state. `captures` belong to the match of
    /// `pattern` against the request URL.
    pub async fn execute<S>(
        &self,
        pattern: &Pattern,
        captures: &Captures,
        state: &mut S,
        executor: &dyn Executor,
    ) -> Result<Disposition>
    where
        S: RequestState + Send + ?Sized,
    {
        match self {
            Action::Default => Ok(Disposition::Forward),
            Action::Abort => Ok(Disposition::Abort),
            Action::Data {
                template,
                content_type,
                base64,
            } => {
                let body = if *base64 {
                    decode_base64(template)?
                } else {
                    expand(template, &*state, captures).into_bytes()
                };
                state.set_response_type(content_type);
                Ok(Disposition::Send(body))
            }
            Action::File { template } => {
                let template = match pattern.unmatched_suffix(state.url()) {
                    Some(suffix) => join_path(template, &suffix),
                    None => template.clone(),
                };
                let expanded = expand(&template, &*state, captures);
                let path = expanded.split('?').next().unwrap_or_default();
                let path = path.replace('~', document_root(&*state));
                debug!("serving file {}", path);
                Ok(Disposition::SendFile(PathBuf::from(path)))
            }
            Action::ForwardVia { upstream } => {
                state.set_upstream(upstream.clone());
                Ok(Disposition::Forward)
            }
            Action::RunExternal { command } => {
                let command = expand(command, &*state, captures);
                let output = executor.exec(&command).await?;
                Ok(Disposition::Send(output.body()))
            }
            Action::EvalDirective { command } => {
                state.set_eval_directive(expand(command, &*state, captures));
                Ok(Disposition::Forward)
            }
            Action::Rewrite { url } => {
                let template = match pattern.unmatched_suffix(state.url()) {
                    Some(suffix) => format!("{}{}", url, suffix),
                    None => url.clone(),
                };
                let url = expand(&template, &*state, captures);
                debug!("rewriting {} to {}", state.url(), url);
                state.set_url(url);
                Ok(Disposition::Forward)
            }
        }
    }
}
