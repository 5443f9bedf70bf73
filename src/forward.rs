//! Forwarding: how a parent's output becomes one of its child's bound
//! arguments.
//!
//! Three modes, chosen per edge at `connect()` time:
//!
//! - [`ForwardAs::None`] — nothing is forwarded across this edge.
//! - [`ForwardAs::Named`] — the parent's output is bound under a specific
//!   parameter name on the child.
//! - [`AUTO`] — the target name is inferred: the child must have exactly one
//!   declared parameter that is neither already bound nor already claimed by
//!   another parent's forwarding rule.
//!
//! Validation happens once, at connect time; a resolved rule is then fixed
//! for the lifetime of the edge.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::binding::{resolve_bindings, Bindings};
use crate::error::{BoxError, GraphError, Result};

/// How a parent's output is bound into its child's arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardAs {
    /// Forward nothing across this edge.
    None,
    /// Bind the parent's output under this parameter name.
    Named(String),
    /// Infer the target name; the child must have exactly one eligible
    /// parameter.
    Auto,
}

/// Sentinel for automatic forwarding, distinct from any named target.
pub const AUTO: ForwardAs = ForwardAs::Auto;

/// A function transforming a forwarded value before it is bound, given the
/// transform's own fixed bindings (thunks resolved fresh on every call).
pub type TransformFn<E> =
    Arc<dyn Fn(E, HashMap<String, E>) -> BoxFuture<'static, std::result::Result<E, BoxError>> + Send + Sync>;

/// An `on_before_forward` hook: a transform plus the fixed bindings passed to
/// it alongside the forwarded value.
#[derive(Clone)]
pub struct ForwardTransform<E> {
    func: TransformFn<E>,
    fixed: Bindings<E>,
}

impl<E: Clone + Send + Sync + 'static> ForwardTransform<E> {
    pub fn new(
        func: impl Fn(E, HashMap<String, E>) -> BoxFuture<'static, std::result::Result<E, BoxError>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            func: Arc::new(func),
            fixed: HashMap::new(),
        }
    }

    /// Attach a fixed binding visible to the transform as its second argument.
    pub fn with_fixed(mut self, name: impl Into<String>, value: E) -> Self {
        self.fixed.insert(name.into(), crate::binding::Binding::Value(value));
        self
    }

    pub(crate) async fn apply(&self, value: E) -> std::result::Result<E, BoxError> {
        let args = resolve_bindings(&self.fixed);
        (self.func)(value, args).await
    }
}

/// The resolved, connect-time-validated forwarding rule for one edge.
#[derive(Clone)]
pub(crate) struct ForwardRule<E> {
    /// `None` if `ForwardAs::None`; otherwise the resolved parameter name
    /// (identical to the `Named` target, or the inferred `Auto` target).
    pub target: Option<String>,
    pub transform: Option<ForwardTransform<E>>,
}

/// Validate and resolve a forwarding request at connect time.
///
/// `bound_keys` are the child's existing literal bindings; `existing_targets`
/// are the resolved targets of forwarding rules already registered on the
/// child by other parents.
pub(crate) fn resolve_forward<E>(
    child_id: &str,
    parent_id: &str,
    forward_as: ForwardAs,
    child_params: &[String],
    child_variadic: bool,
    bound_keys: &HashSet<String>,
    existing_targets: &HashSet<String>,
    transform: Option<ForwardTransform<E>>,
) -> Result<ForwardRule<E>> {
    let target = match forward_as {
        ForwardAs::None => None,
        ForwardAs::Named(name) => {
            if !child_variadic && !child_params.iter().any(|p| p == &name) {
                return Err(GraphError::ForwardingParameterError {
                    parent: parent_id.to_string(),
                    child: child_id.to_string(),
                    target: name,
                });
            }
            if bound_keys.contains(&name) || existing_targets.contains(&name) {
                return Err(GraphError::ForwardingOverrideError {
                    parent: parent_id.to_string(),
                    child: child_id.to_string(),
                    target: name,
                });
            }
            Some(name)
        }
        ForwardAs::Auto => {
            let eligible: Vec<&String> = child_params
                .iter()
                .filter(|p| !bound_keys.contains(*p) && !existing_targets.contains(*p))
                .collect();
            if eligible.len() != 1 {
                return Err(GraphError::AutoForwardError {
                    child: child_id.to_string(),
                    eligible: eligible.len(),
                });
            }
            Some(eligible[0].clone())
        }
    };
    Ok(ForwardRule { target, transform })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(
        forward_as: ForwardAs,
        params: &[&str],
        variadic: bool,
        bound: &[&str],
        existing: &[&str],
    ) -> Result<Option<String>> {
        let params: Vec<String> = params.iter().map(|s| s.to_string()).collect();
        let bound: HashSet<String> = bound.iter().map(|s| s.to_string()).collect();
        let existing: HashSet<String> = existing.iter().map(|s| s.to_string()).collect();
        resolve_forward::<i64>("child", "parent", forward_as, &params, variadic, &bound, &existing, None)
            .map(|r| r.target)
    }

    #[test]
    fn none_forwards_nothing() {
        assert_eq!(resolve(ForwardAs::None, &["x"], false, &[], &[]).unwrap(), None);
    }

    #[test]
    fn named_requires_declared_parameter() {
        let err = resolve(ForwardAs::Named("missing".to_string()), &["x"], false, &[], &[]).unwrap_err();
        assert!(matches!(err, GraphError::ForwardingParameterError { .. }));
    }

    #[test]
    fn named_allowed_through_variadic_sink() {
        assert_eq!(
            resolve(ForwardAs::Named("anything".to_string()), &[], true, &[], &[]).unwrap(),
            Some("anything".to_string())
        );
    }

    #[test]
    fn named_rejects_already_bound_target() {
        let err = resolve(ForwardAs::Named("x".to_string()), &["x"], false, &["x"], &[]).unwrap_err();
        assert!(matches!(err, GraphError::ForwardingOverrideError { .. }));
    }

    #[test]
    fn named_rejects_target_already_claimed_by_another_parent() {
        let err = resolve(ForwardAs::Named("x".to_string()), &["x"], false, &[], &["x"]).unwrap_err();
        assert!(matches!(err, GraphError::ForwardingOverrideError { .. }));
    }

    #[test]
    fn auto_resolves_unique_eligible_parameter() {
        assert_eq!(
            resolve(ForwardAs::Auto, &["x"], false, &[], &[]).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn auto_rejects_zero_eligible_parameters() {
        let err = resolve(ForwardAs::Auto, &["x"], false, &["x"], &[]).unwrap_err();
        assert!(matches!(err, GraphError::AutoForwardError { eligible: 0, .. }));
    }

    #[test]
    fn auto_rejects_multiple_eligible_parameters() {
        let err = resolve(ForwardAs::Auto, &["x", "y"], false, &[], &[]).unwrap_err();
        assert!(matches!(err, GraphError::AutoForwardError { eligible: 2, .. }));
    }
}
