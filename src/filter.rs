//! Before-action filter chain.
//!
//! Hooks run in declaration order after authentication and before dispatch.
//! Each hook is scoped to a set of actions; the first hook that aborts ends
//! the chain and the request.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::FilterAbort;
use crate::request::RequestContext;

/// Which actions a hook applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActionScope {
    /// Every action.
    #[default]
    All,
    /// Only the listed actions.
    Only(BTreeSet<String>),
    /// Every action except the listed ones.
    Except(BTreeSet<String>),
}

impl ActionScope {
    /// Scope limited to the given actions.
    pub fn only<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ActionScope::Only(normalize(actions))
    }

    /// Scope covering everything but the given actions.
    pub fn except<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ActionScope::Except(normalize(actions))
    }

    /// Comma-delimited form of [`ActionScope::only`].
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_pipeline::filter::ActionScope;
    ///
    /// assert_eq!(ActionScope::only_str("read, list"), ActionScope::only(["read", "list"]));
    /// ```
    pub fn only_str(actions: &str) -> Self {
        Self::only(actions.split(','))
    }

    /// Comma-delimited form of [`ActionScope::except`].
    pub fn except_str(actions: &str) -> Self {
        Self::except(actions.split(','))
    }

    /// Returns true if a hook with this scope runs for `action`.
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_pipeline::filter::ActionScope;
    ///
    /// let scope = ActionScope::except(["login"]);
    /// assert!(scope.applies_to("profile"));
    /// assert!(!scope.applies_to("login"));
    /// ```
    pub fn applies_to(&self, action: &str) -> bool {
        match self {
            ActionScope::All => true,
            ActionScope::Only(actions) => actions.contains(action),
            ActionScope::Except(actions) => !actions.contains(action),
        }
    }
}

fn normalize<I, S>(actions: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    actions
        .into_iter()
        .map(|a| a.as_ref().trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Signature of a before-action hook.
pub type HookFn = dyn Fn(&RequestContext) -> Result<(), FilterAbort> + Send + Sync;

/// A named, scoped hook.
#[derive(Clone)]
pub struct BeforeAction {
    name: String,
    scope: ActionScope,
    hook: Arc<HookFn>,
}

impl BeforeAction {
    /// Creates a hook.
    pub fn new<F>(name: impl Into<String>, scope: ActionScope, hook: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<(), FilterAbort> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope,
            hook: Arc::new(hook),
        }
    }

    /// Hook name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hook scope.
    pub fn scope(&self) -> &ActionScope {
        &self.scope
    }
}

impl fmt::Debug for BeforeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeforeAction")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Ordered list of before-action hooks.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    hooks: Vec<BeforeAction>,
}

impl FilterChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook, ignoring a second registration under the same name.
    pub fn register(&mut self, hook: BeforeAction) -> &mut Self {
        if !self.hooks.iter().any(|h| h.name == hook.name) {
            self.hooks.push(hook);
        }
        self
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook whose scope covers the context's action, in order.
    pub fn run(&self, ctx: &RequestContext) -> Result<(), FilterAbort> {
        for hook in &self.hooks {
            if !hook.scope.applies_to(ctx.action()) {
                ctx.log()
                    .debug(format_args!("before-action '{}' skipped", hook.name));
                continue;
            }

            if let Err(abort) = (hook.hook)(ctx) {
                ctx.log().info(format_args!(
                    "before-action '{}' aborted with code {}",
                    hook.name, abort.code
                ));
                return Err(abort);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::RawRequest;
    use parking_lot::Mutex;

    fn ctx(action: &str) -> RequestContext {
        RequestContext::new(RawRequest::new("user", action), serde_json::Map::new())
    }

    fn recording(
        name: &'static str,
        scope: ActionScope,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> BeforeAction {
        let log = Arc::clone(log);
        BeforeAction::new(name, scope, move |_| {
            log.lock().push(name);
            Ok(())
        })
    }

    #[test]
    fn only_and_except_select_actions() {
        let only = ActionScope::only(["a"]);
        assert!(only.applies_to("a"));
        assert!(!only.applies_to("b"));

        let except = ActionScope::except(["a"]);
        assert!(!except.applies_to("a"));
        assert!(except.applies_to("b"));

        assert!(ActionScope::All.applies_to("anything"));
    }

    #[test]
    fn string_form_ignores_blanks() {
        assert_eq!(ActionScope::except_str(" a ,, b,"), ActionScope::except(["a", "b"]));
    }

    #[test]
    fn hooks_run_in_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain
            .register(recording("first", ActionScope::All, &log))
            .register(recording("skipped", ActionScope::only(["other"]), &log))
            .register(recording("second", ActionScope::except(["other"]), &log));

        chain.run(&ctx("profile")).unwrap();
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn chain_halts_at_first_abort() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain
            .register(BeforeAction::new("deny", ActionScope::All, |_| {
                Err(FilterAbort::new(1001, "denied"))
            }))
            .register(recording("after", ActionScope::All, &log));

        let abort = chain.run(&ctx("profile")).unwrap_err();
        assert_eq!(abort.code, 1001);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn duplicate_names_register_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        chain
            .register(recording("once", ActionScope::All, &log))
            .register(recording("once", ActionScope::All, &log));
        assert_eq!(chain.len(), 1);
    }
}
