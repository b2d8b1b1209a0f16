use anyhow::{anyhow, Result};

use crate::handler::http::state::{HeaderScope, RequestState, DELAY, DOCUMENT_ROOT};
use crate::handler::http::template::{expand, Captures};

/// Modifier adjusts the request or the future response before the rule's action runs.
/// Value templates are expanded when the modifier is applied, not when it is compiled.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Modifier {
    SetHeader {
        scope: HeaderScope,
        name: String,
        value: String,
    },
    RemoveHeader {
        scope: HeaderScope,
        name: String,
    },
    SetQueryParam {
        name: String,
        value: String,
    },
    RemoveQueryParam {
        name: String,
    },
    SetCookie {
        name: String,
        value: String,
    },
    RemoveCookie {
        name: String,
    },
    SetStatus(u16),
    /// Milliseconds.
    SetDelay(u64),
    SetDocumentRoot(String),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Command {
    SetRequestHeader,
    SetResponseHeader,
    SetQueryParam,
    SetCookie,
    RemoveRequestHeader,
    RemoveResponseHeader,
    RemoveQueryParam,
    RemoveCookie,
    StatusCode,
    Delay,
    SetDocumentRoot,
}

const COMMANDS: &[(&str, Command)] = &[
    ("SetRequestHeader", Command::SetRequestHeader),
    ("SetResponseHeader", Command::SetResponseHeader),
    ("SetQueryParam", Command::SetQueryParam),
    ("SetCookie", Command::SetCookie),
    ("RemoveRequestHeader", Command::RemoveRequestHeader),
    ("RemoveResponseHeader", Command::RemoveResponseHeader),
    ("RemoveQueryParam", Command::RemoveQueryParam),
    ("RemoveCookie", Command::RemoveCookie),
    ("StatusCode", Command::StatusCode),
    ("Delay", Command::Delay),
    ("SetDocumentRoot", Command::SetDocumentRoot),
];

impl Command {
    fn lookup(word: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(word))
            .map(|(_, command)| *command)
    }
}

/// compile_modifier compiles a modifier line without its leading `$`.
///
/// Returns `Ok(None)` for a known command whose argument makes it a no-op (a zero or non-numeric
/// status code or delay), and an error for an unknown command word.
pub fn compile_modifier(line: &str) -> Result<Option<Modifier>> {
    let mut words = line.split_whitespace();
    let word = words.next().unwrap_or_default();
    let arg = words.collect::<Vec<_>>().join(" ");
    let command = Command::lookup(word).ok_or_else(|| anyhow!("unknown modifier {}", word))?;

    Ok(match command {
        Command::SetRequestHeader | Command::SetResponseHeader => {
            let (name, value) = split_assignment(&arg, ':');
            Some(Modifier::SetHeader {
                scope: if command == Command::SetRequestHeader {
                    HeaderScope::Request
                } else {
                    HeaderScope::Response
                },
                name,
                value,
            })
        }
        Command::SetQueryParam => {
            let (name, value) = split_assignment(&arg, '=');
            Some(Modifier::SetQueryParam { name, value })
        }
        Command::SetCookie => {
            let (name, value) = split_assignment(&arg, '=');
            Some(Modifier::SetCookie { name, value })
        }
        Command::RemoveRequestHeader => Some(Modifier::RemoveHeader {
            scope: HeaderScope::Request,
            name: arg,
        }),
        Command::RemoveResponseHeader => Some(Modifier::RemoveHeader {
            scope: HeaderScope::Response,
            name: arg,
        }),
        Command::RemoveQueryParam => Some(Modifier::RemoveQueryParam { name: arg }),
        Command::RemoveCookie => Some(Modifier::RemoveCookie { name: arg }),
        Command::StatusCode => arg
            .parse::<u16>()
            .ok()
            .filter(|code| *code != 0)
            .map(Modifier::SetStatus),
        Command::Delay => arg
            .parse::<u64>()
            .ok()
            .filter(|millis| *millis != 0)
            .map(Modifier::SetDelay),
        Command::SetDocumentRoot => Some(Modifier::SetDocumentRoot(arg)),
    })
}

/// split_assignment splits `name<sep>value` on the first separator. Without a separator the whole
/// argument is the name and the value is empty.
fn split_assignment(arg: &str, separator: char) -> (String, String) {
    match arg.split_once(separator) {
        Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
        None => (arg.trim().to_string(), String::new()),
    }
}

impl Modifier {
    pub fn apply<S: RequestState + ?Sized>(&self, state: &mut S) {
        // modifiers never see the captures of the matched pattern
        let none = Captures::default();
        match self {
            Modifier::SetHeader { scope, name, value } => {
                let value = expand(value, &*state, &none);
                state.set_header(*scope, name, &value);
            }
            Modifier::RemoveHeader { scope, name } => state.remove_header(*scope, name),
            Modifier::SetQueryParam { name, value } => {
                let value = expand(value, &*state, &none);
                state.set_query_param(name, &value);
            }
            Modifier::RemoveQueryParam { name } => state.remove_query_param(name),
            Modifier::SetCookie { name, value } => {
                let value = expand(value, &*state, &none);
                state.set_cookie(name, &value);
            }
            Modifier::RemoveCookie { name } => state.remove_cookie(name),
            Modifier::SetStatus(code) => state.override_status(*code),
            Modifier::SetDelay(millis) => state.set(DELAY, millis.to_string()),
            Modifier::SetDocumentRoot(template) => {
                let root = expand(template, &*state, &none);
                state.set(DOCUMENT_ROOT, root);
            }
        }
    }
}
