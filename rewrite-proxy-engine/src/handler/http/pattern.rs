use std::borrow::Cow;

use anyhow::Result;
use regex::{Regex, RegexBuilder};

use crate::handler::http::template::Captures;

/// Pattern is the left hand side of a rule, deciding which request URLs the rule applies to.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// `/expr/`, matched case-insensitively against the whole URL.
    Regex(Regex),
    /// `!url`, the request URL must be equal to it.
    Exact(String),
    /// `url`, the request URL must start with it.
    Prefix(String),
}

/// compile_pattern turns the left operand of a rule line into a [Pattern].
///
/// Literal URLs without an `http://` or `https://` scheme get `http://` prepended. A lone `/`
/// opens and closes an empty expression, which matches every URL.
pub fn compile_pattern(source: &str) -> Result<Pattern> {
    if source.starts_with('/') && source.ends_with('/') {
        let expr = source.get(1..source.len() - 1).unwrap_or_default();
        return Ok(Pattern::Regex(
            RegexBuilder::new(expr).case_insensitive(true).build()?,
        ));
    }
    Ok(match source.strip_prefix('!') {
        Some(url) => Pattern::Exact(normalize_scheme(url).into_owned()),
        None => Pattern::Prefix(normalize_scheme(source).into_owned()),
    })
}

/// normalize_scheme prepends `http://` to a URL that carries neither `http://` nor `https://`.
pub fn normalize_scheme(url: &str) -> Cow<'_, str> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Cow::Borrowed(url)
    } else {
        Cow::Owned(format!("http://{}", url))
    }
}

impl Pattern {
    /// matches checks the given URL against the pattern. On success it returns the capture groups,
    /// which are only populated for [Pattern::Regex].
    pub fn matches(&self, url: &str) -> Option<Captures> {
        match self {
            Pattern::Regex(regex) => regex.captures(url).map(|caps| {
                caps.iter()
                    .map(|group| group.map(|m| m.as_str().to_string()))
                    .collect()
            }),
            Pattern::Exact(expected) => {
                (normalize_scheme(url) == expected.as_str()).then(Captures::default)
            }
            Pattern::Prefix(start) => normalize_scheme(url)
                .starts_with(start.as_str())
                .then(Captures::default),
        }
    }

    /// unmatched_suffix returns the part of the URL following the literal pattern text.
    /// It is `None` for regular expressions, which have no notion of a suffix.
    pub fn unmatched_suffix(&self, url: &str) -> Option<String> {
        let literal = match self {
            Pattern::Regex(_) => return None,
            Pattern::Exact(s) | Pattern::Prefix(s) => s,
        };
        let url = normalize_scheme(url);
        Some(url.get(literal.len()..).unwrap_or_default().to_string())
    }

    pub fn is_literal(&self) -> bool {
        !matches!(self, Pattern::Regex(_))
    }
}
