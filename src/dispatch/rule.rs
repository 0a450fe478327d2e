use std::sync::Arc;

/// A named predicate deciding whether a dispatcher handles a message.
///
/// Rules are evaluated before invocation. A message that does not match is
/// skipped without error.
pub trait DispatchRule<M>: Send + Sync {
    fn name(&self) -> &str;
    fn is_match(&self, message: &M) -> bool;
}

/// How several rules on one route combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleApplied {
    /// Every rule must match.
    #[default]
    All,
    /// At least one rule must match.
    Any,
}

/// A rule built from a closure.
pub struct FnRule<M> {
    name: String,
    predicate: Arc<dyn Fn(&M) -> bool + Send + Sync>,
}

impl<M> FnRule<M> {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl<M: Send + Sync> DispatchRule<M> for FnRule<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_match(&self, message: &M) -> bool {
        (self.predicate)(message)
    }
}

pub(crate) fn rules_match<M>(rules: &[Arc<dyn DispatchRule<M>>], applied: RuleApplied, message: &M) -> bool {
    if rules.is_empty() {
        return true;
    }
    match applied {
        RuleApplied::All => rules.iter().all(|r| r.is_match(message)),
        RuleApplied::Any => rules.iter().any(|r| r.is_match(message)),
    }
}
