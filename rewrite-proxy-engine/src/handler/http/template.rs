use std::iter::FromIterator;

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

use crate::handler::http::state::{RequestState, DOCUMENT_ROOT};

/// `~`, `$N`, `${name}` and `${&name}`.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(~)|\$(?:(\d+)|\{(&)?([^}]+)\})").expect("placeholder expression is valid")
});

/// Captures holds the groups of a regular expression pattern matched against the request URL.
/// Group 0 is the whole match; groups that did not participate are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(Vec<Option<String>>);

impl Captures {
    /// group returns the text of group `index`, or an empty string when there is no such group.
    pub fn group(&self, index: usize) -> &str {
        self.0
            .get(index)
            .and_then(Option::as_deref)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Option<String>> for Captures {
    fn from_iter<I: IntoIterator<Item = Option<String>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// expand resolves every placeholder of `template` against the request state and the captures of
/// the matched pattern. Text outside placeholders is copied unchanged.
pub fn expand<S>(template: &str, state: &S, captures: &Captures) -> String
where
    S: RequestState + ?Sized,
{
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            if caps.get(1).is_some() {
                return document_root(state).to_string();
            }
            if let Some(index) = caps.get(2) {
                return index
                    .as_str()
                    .parse()
                    .map(|index| captures.group(index).to_string())
                    .unwrap_or_default();
            }
            let value = resolve(&caps[4], state);
            if caps.get(3).is_some() {
                encode_uri_component(&value)
            } else {
                value
            }
        })
        .into_owned()
}

/// document_root returns the current `documentRoot` value, empty when unset.
pub fn document_root<S: RequestState + ?Sized>(state: &S) -> &str {
    state.get(DOCUMENT_ROOT).unwrap_or_default()
}

fn resolve<S: RequestState + ?Sized>(name: &str, state: &S) -> String {
    match name {
        "url" => state.url().to_string(),
        "host" => state.host(),
        "port" => state.port(),
        "path" => state.path(),
        "query" => state.query(),
        _ => {
            let value = if let Some(header) = name.strip_prefix("header:") {
                state.request_header(header)
            } else if let Some(param) = name.strip_prefix("param:") {
                state.query_param(param)
            } else if let Some(cookie) = name.strip_prefix("cookie:") {
                state.cookie(cookie)
            } else {
                None
            };
            value.unwrap_or_default()
        }
    }
}

/// Bytes left alone by `encode_uri_component`: ASCII alphanumerics and `-_.!~*'()`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// encode_uri_component percent-encodes the UTF-8 bytes of `value` outside [URI_COMPONENT].
pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}
