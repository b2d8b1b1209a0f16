use crate::handler::http::action::Action;
use crate::handler::http::modifier::Modifier;
use crate::handler::http::pattern::Pattern;
use crate::handler::http::template::Captures;

/// Ruleset is the compiled form of one rules file. It is read-only once built; a reload builds a
/// new one and replaces it wholesale.
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    /// modifiers applied to every matched request.
    pub modifiers: Vec<Modifier>,
    /// rules declared before the first section.
    pub rules: Vec<Rule>,
    pub sections: Vec<Section>,
}

/// Section is a named group of rules. A disabled section (`[#name]`) keeps its place but its body
/// is never parsed.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub active: bool,
    pub modifiers: Vec<Modifier>,
    pub rules: Vec<Rule>,
}

/// Rule introduces a pattern, the action executed when it matches, and the modifiers applied
/// before that.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub action: Action,
    pub modifiers: Vec<Modifier>,
}

/// Matched is the rule selected for a request.
#[derive(Debug)]
pub struct Matched<'a> {
    pub rule: &'a Rule,
    /// The section owning the rule, `None` for root rules.
    pub section: Option<&'a Section>,
    pub captures: Captures,
}

impl Section {
    pub fn new(name: impl Into<String>, active: bool) -> Self {
        Self {
            name: name.into(),
            active,
            modifiers: vec![],
            rules: vec![],
        }
    }
}

impl Rule {
    pub fn new(pattern: Pattern, action: Action) -> Self {
        Self {
            pattern,
            action,
            modifiers: vec![],
        }
    }
}

impl Ruleset {
    /// select returns the first rule matching the URL, scanning root rules and then the rules of
    /// every active section, in file order.
    pub fn select(&self, url: &str) -> Option<Matched<'_>> {
        let root = self.rules.iter().map(|rule| (rule, None));
        let sections = self
            .sections
            .iter()
            .filter(|section| section.active)
            .flat_map(|section| section.rules.iter().map(move |rule| (rule, Some(section))));

        root.chain(sections).find_map(|(rule, section)| {
            rule.pattern.matches(url).map(|captures| Matched {
                rule,
                section,
                captures,
            })
        })
    }

    /// rule_count counts root rules and the rules of active sections.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
            + self
                .sections
                .iter()
                .filter(|section| section.active)
                .map(|section| section.rules.len())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::http::pattern::compile_pattern;

    fn rule(pattern: &str) -> Rule {
        Rule::new(compile_pattern(pattern).unwrap(), Action::Default)
    }

    #[test]
    fn test_select_first_match() {
        let mut disabled = Section::new("#off", false);
        disabled.rules.push(rule("a.test"));
        let mut media = Section::new("media", true);
        media.rules.push(rule("a.test/img"));
        media.rules.push(rule("/\\.png$/"));

        let ruleset = Ruleset {
            modifiers: vec![],
            rules: vec![rule("root.test")],
            sections: vec![disabled, media],
        };
        assert_eq!(ruleset.rule_count(), 3);

        let matched = ruleset.select("http://root.test/x").unwrap();
        assert!(matched.section.is_none());

        let matched = ruleset.select("http://a.test/img/logo.png").unwrap();
        assert_eq!(matched.section.map(|s| s.name.as_str()), Some("media"));
        assert!(matches!(&matched.rule.pattern, Pattern::Prefix(p) if p == "http://a.test/img"));

        let matched = ruleset.select("http://b.test/logo.png").unwrap();
        assert_eq!(matched.captures.group(0), ".png");

        assert!(ruleset.select("http://a.test/other").is_none());
    }
}
