use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tracing::{debug, info, trace};

use crate::handler::http::action::Disposition;
use crate::handler::http::exec::{Executor, ShellExecutor};
use crate::handler::http::rule::Ruleset;
use crate::handler::http::state::RequestState;
use crate::raw_config::load_config;

/// RuleEngine owns the published [Ruleset] and evaluates requests against it.
///
/// Every evaluation works on a snapshot taken when it starts, so a concurrent reload is observed
/// either entirely or not at all. The lock only guards the pointer, never the ruleset contents.
#[derive(Debug)]
pub struct RuleEngine {
    ruleset: RwLock<Arc<Ruleset>>,
    executor: Arc<dyn Executor>,
}

impl RuleEngine {
    pub fn new(ruleset: Ruleset) -> Self {
        Self::with_executor(ruleset, Arc::new(ShellExecutor))
    }

    pub fn with_executor(ruleset: Ruleset, executor: Arc<dyn Executor>) -> Self {
        Self {
            ruleset: RwLock::new(Arc::new(ruleset)),
            executor,
        }
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        self.executor.clone()
    }

    /// snapshot returns the ruleset currently published.
    pub fn snapshot(&self) -> Arc<Ruleset> {
        match self.ruleset.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// publish replaces the ruleset; evaluations already running keep their snapshot.
    pub fn publish(&self, ruleset: Ruleset) -> Arc<Ruleset> {
        let ruleset = Arc::new(ruleset);
        match self.ruleset.write() {
            Ok(mut guard) => *guard = ruleset.clone(),
            Err(poisoned) => *poisoned.into_inner() = ruleset.clone(),
        }
        ruleset
    }

    /// reload parses the rules file and publishes the result. When the file cannot be read the
    /// error is returned and the current ruleset stays in place.
    pub async fn reload(&self, path: impl AsRef<Path>) -> Result<Arc<Ruleset>> {
        let path = path.as_ref();
        let ruleset = load_config(path).await?;
        info!(
            "loaded {:?}: {} rules, {} sections",
            path,
            ruleset.rule_count(),
            ruleset.sections.len()
        );
        Ok(self.publish(ruleset))
    }

    pub async fn evaluate<S>(&self, state: &mut S) -> Result<Disposition>
    where
        S: RequestState + Send + ?Sized,
    {
        let ruleset = self.snapshot();
        evaluate(&ruleset, state, self.executor.as_ref()).await
    }
}

/// evaluate runs the first rule matching the request: global, section and rule modifiers in that
/// order, then the rule's action. A request no rule matches is forwarded untouched.
pub async fn evaluate<S>(
    ruleset: &Ruleset,
    state: &mut S,
    executor: &dyn Executor,
) -> Result<Disposition>
where
    S: RequestState + Send + ?Sized,
{
    let matched = match ruleset.select(state.url()) {
        Some(matched) => matched,
        None => {
            trace!("no rule matched {}", state.url());
            return Ok(Disposition::Forward);
        }
    };
    debug!("{} matched {:?}", state.url(), matched.rule.pattern);

    let section_modifiers = matched
        .section
        .map(|section| section.modifiers.as_slice())
        .unwrap_or_default();
    for modifier in ruleset
        .modifiers
        .iter()
        .chain(section_modifiers)
        .chain(&matched.rule.modifiers)
    {
        modifier.apply(state);
    }

    matched
        .rule
        .action
        .execute(&matched.rule.pattern, &matched.captures, state, executor)
        .await
}
