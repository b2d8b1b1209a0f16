//! Parser of the line oriented rules file.
//!
//! ```text
//! # comment
//! $SetRequestHeader X-Proxy: rewrite      global modifier
//! example.com/old => example.com/new      root rule
//! [media]                                 section
//! $Delay 200                              section modifier
//! /\.png$/ => data:image/png;base64,...   rule
//! $SetResponseHeader Cache-Control: none  rule modifier
//! [#disabled]                             section whose body is skipped
//! ```
//!
//! Malformed lines never abort a load, they are dropped one by one.

use std::path::Path;

use anyhow::Result;
use tokio::fs::read_to_string;
use tracing::{debug, trace, warn};

use crate::handler::http::action::compile_action;
use crate::handler::http::modifier::{compile_modifier, Modifier};
use crate::handler::http::pattern::compile_pattern;
use crate::handler::http::rule::{Rule, Ruleset, Section};

/// Scope is where the next modifier line attaches.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Scope {
    /// Nothing opened yet, modifiers are global.
    Global,
    /// The last section, no rule in it yet.
    Section,
    /// The last rule of the current container.
    Rule,
    /// The last rule line was rejected; its modifiers go with it.
    Dropped,
    /// Inside a disabled section.
    Disabled,
}

/// load_config reads and parses a rules file. A read failure is returned to the caller, which
/// keeps whatever ruleset it had.
pub async fn load_config(path: impl AsRef<Path>) -> Result<Ruleset> {
    let text = read_to_string(path).await?;
    Ok(parse_config(&text))
}

pub fn parse_config(text: &str) -> Ruleset {
    let mut ruleset = Ruleset::default();
    let mut scope = Scope::Global;
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        scope = parse_line(&mut ruleset, scope, line);
    }
    ruleset
}

fn parse_line(ruleset: &mut Ruleset, scope: Scope, line: &str) -> Scope {
    if let Some(name) = section_name(line) {
        let active = !name.starts_with('#');
        ruleset.sections.push(Section::new(name, active));
        return if active { Scope::Section } else { Scope::Disabled };
    }
    if scope == Scope::Disabled {
        return scope;
    }

    if let Some(command) = line.strip_prefix('$') {
        match compile_modifier(command) {
            Ok(Some(modifier)) => attach(ruleset, scope, modifier),
            Ok(None) => debug!("modifier `{}` has no effect", line),
            Err(e) => warn!("{}", e),
        }
        return scope;
    }

    if let Some((lhs, rhs)) = line.split_once("=>") {
        return match compile_pattern(lhs.trim()) {
            Ok(pattern) => {
                let action = compile_action(&pattern, rhs.trim());
                current_rules(ruleset).push(Rule::new(pattern, action));
                Scope::Rule
            }
            Err(e) => {
                warn!("skipping rule `{}`: {}", line, e);
                Scope::Dropped
            }
        };
    }

    trace!("ignoring line `{}`", line);
    scope
}

/// section_name recognizes `[name]`, returning the trimmed name.
fn section_name(line: &str) -> Option<&str> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    if inner.contains(']') {
        return None;
    }
    Some(inner.trim())
}

fn current_rules(ruleset: &mut Ruleset) -> &mut Vec<Rule> {
    match ruleset.sections.last_mut() {
        Some(section) => &mut section.rules,
        None => &mut ruleset.rules,
    }
}

fn attach(ruleset: &mut Ruleset, scope: Scope, modifier: Modifier) {
    let target = match scope {
        Scope::Global => Some(&mut ruleset.modifiers),
        Scope::Section => ruleset
            .sections
            .last_mut()
            .map(|section| &mut section.modifiers),
        Scope::Rule => current_rules(ruleset)
            .last_mut()
            .map(|rule| &mut rule.modifiers),
        Scope::Dropped | Scope::Disabled => None,
    };
    match target {
        Some(modifiers) => modifiers.push(modifier),
        None => debug!("dropping modifier {:?}", modifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::http::action::Action;
    use crate::handler::http::pattern::Pattern;
    use crate::handler::http::state::HeaderScope;

    const CONFIG: &str = r#"
# global
$SetRequestHeader X-Proxy: rewrite-proxy

a.test/old => a.test/new
$StatusCode 301
    $Delay 20

[ media ]
$SetResponseHeader Cache-Control: no-cache
/\.png$/ => data:image/png;base64,AAAA
!a.test/exact =>
this line is ignored

[#disabled]
a.test => $
$Delay 1000

[tools]
a.test/run => bin:echo ${path}
$SetCookie seen=1
"#;

    #[test]
    fn test_parse_structure() {
        let ruleset = parse_config(CONFIG);

        assert_eq!(
            ruleset.modifiers,
            vec![Modifier::SetHeader {
                scope: HeaderScope::Request,
                name: "X-Proxy".to_string(),
                value: "rewrite-proxy".to_string(),
            }]
        );
        assert_eq!(ruleset.rules.len(), 1);
        assert_eq!(
            ruleset.rules[0].modifiers,
            vec![Modifier::SetStatus(301), Modifier::SetDelay(20)]
        );

        let names: Vec<_> = ruleset.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["media", "#disabled", "tools"]);

        let media = &ruleset.sections[0];
        assert!(media.active);
        assert_eq!(media.modifiers.len(), 1);
        assert_eq!(media.rules.len(), 2);
        assert!(matches!(media.rules[0].pattern, Pattern::Regex(_)));
        assert!(media.rules[0].modifiers.is_empty());
        assert!(matches!(&media.rules[1].pattern, Pattern::Exact(u) if u == "http://a.test/exact"));
        assert_eq!(media.rules[1].action, Action::Abort);

        let disabled = &ruleset.sections[1];
        assert!(!disabled.active);
        assert!(disabled.rules.is_empty());
        assert!(disabled.modifiers.is_empty());

        let tools = &ruleset.sections[2];
        assert_eq!(tools.rules.len(), 1);
        assert_eq!(tools.rules[0].modifiers.len(), 1);
        assert_eq!(ruleset.rule_count(), 4);
    }

    #[test]
    fn test_split_on_first_arrow() {
        let ruleset = parse_config("a.test => data:a => b");
        assert_eq!(
            ruleset.rules[0].action,
            Action::Data {
                template: "a => b".to_string(),
                content_type: "text/plain".to_string(),
                base64: false,
            }
        );
    }

    #[test]
    fn test_bad_regex_drops_rule_and_its_modifiers() {
        let ruleset = parse_config("[s]\n$Delay 5\n/(oops/ => $\n$StatusCode 500\nb.test => $\n$StatusCode 404\n");
        let section = &ruleset.sections[0];
        assert_eq!(section.modifiers, vec![Modifier::SetDelay(5)]);
        assert_eq!(section.rules.len(), 1);
        assert_eq!(section.rules[0].modifiers, vec![Modifier::SetStatus(404)]);
    }

    #[test]
    fn test_unknown_modifier_and_noise() {
        let ruleset = parse_config("$Frobnicate x\n$StatusCode 0\n[broken\njust text\n\n  # note\n");
        assert!(ruleset.modifiers.is_empty());
        assert!(ruleset.rules.is_empty());
        assert!(ruleset.sections.is_empty());
    }

    #[test]
    fn test_section_resets_rule_scope() {
        let ruleset = parse_config("a.test => $\n[next]\n$Delay 10\n");
        assert!(ruleset.rules[0].modifiers.is_empty());
        assert_eq!(ruleset.sections[0].modifiers, vec![Modifier::SetDelay(10)]);
    }

    #[tokio::test]
    async fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        tokio::fs::write(&path, "a.test => b.test\n").await.unwrap();
        assert_eq!(load_config(&path).await.unwrap().rules.len(), 1);
        assert!(load_config(dir.path().join("missing.txt")).await.is_err());
    }
}
