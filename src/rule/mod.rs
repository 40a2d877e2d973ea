// src/rule/mod.rs

//! Rule matching contract.
//!
//! A [`Rule`] looks at a target and either declines or returns an
//! [`Invocation`]: the concrete build action for that target, bound to its
//! resolved prerequisites. The build engine only sees these traits; how
//! rules are authored lives in the front end.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::exec::Executor;
use crate::target::TargetRef;

/// Boxed, sendable future used at the dynamic-dispatch seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How well a rule matches a target.
///
/// Variants keep their historical declaration order; use
/// [`MatchQuality::rank`] to compare priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchQuality {
    NoMatch,
    /// The rule names the target directly.
    MatchExplicit,
    /// The target was matched through a pattern.
    MatchImplicit,
}

impl MatchQuality {
    /// Resolution priority: explicit associations outrank pattern ones.
    pub fn rank(self) -> u8 {
        match self {
            MatchQuality::NoMatch => 0,
            MatchQuality::MatchImplicit => 1,
            MatchQuality::MatchExplicit => 2,
        }
    }

    pub fn is_match(self) -> bool {
        self != MatchQuality::NoMatch
    }
}

/// Outcome of [`Rule::match_target`]. `invocation` is `None` exactly when
/// `quality` is [`MatchQuality::NoMatch`].
#[derive(Clone)]
pub struct Match {
    pub quality: MatchQuality,
    pub invocation: Option<Arc<dyn Invocation>>,
}

impl Match {
    pub fn none() -> Self {
        Self {
            quality: MatchQuality::NoMatch,
            invocation: None,
        }
    }

    pub fn explicit(invocation: Arc<dyn Invocation>) -> Self {
        Self {
            quality: MatchQuality::MatchExplicit,
            invocation: Some(invocation),
        }
    }

    pub fn implicit(invocation: Arc<dyn Invocation>) -> Self {
        Self {
            quality: MatchQuality::MatchImplicit,
            invocation: Some(invocation),
        }
    }
}

impl fmt::Debug for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("quality", &self.quality)
            .field("invocation", &self.invocation.as_ref().map(|i| i.target().name().to_string()))
            .finish()
    }
}

/// A policy deciding whether, and how, a target can be produced.
///
/// Rules are configured once per build and must not keep per-match state.
pub trait Rule: Send + Sync + fmt::Debug {
    /// Decide whether this rule can build `target`.
    ///
    /// Errors (e.g. a prerequisite template that cannot be expanded) abort
    /// resolution.
    fn match_target(&self, target: &TargetRef) -> anyhow::Result<Match>;
}

/// A rule's ready-to-run binding for one target.
pub trait Invocation: Send + Sync {
    fn target(&self) -> &TargetRef;

    /// Resolved prerequisites, in the order the rule declared them.
    fn prerequisites(&self) -> &[TargetRef];

    /// Run the build action through `executor`.
    ///
    /// Multi-step actions must check `cancel` before each step and stop
    /// starting new steps once it fires.
    fn execute<'a>(
        &'a self,
        executor: &'a dyn Executor,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}
