//! Runtime type validation for node outputs and streamed chunks.
//!
//! Rust's static typing already rules out most of what a dynamic type
//! validator would catch, but the element type `E` a graph is built over is
//! often itself a loosely-typed envelope (an enum of variant payloads, a JSON
//! value, ...). `ElementType` lets a node declare a narrower runtime
//! predicate than `E` alone expresses, checked against every produced value.

use std::sync::Arc;

/// A validator closure: `Ok(())` if `value` satisfies the declared type,
/// `Err(reason)` otherwise.
pub type Validator<E> = Arc<dyn Fn(&E) -> std::result::Result<(), String> + Send + Sync>;

/// A node's declared output/chunk type, checked on every value it produces.
#[derive(Clone)]
pub struct ElementType<E> {
    validator: Option<Validator<E>>,
    name: &'static str,
}

impl<E> ElementType<E> {
    /// No runtime check — any value of `E` is accepted.
    pub fn any() -> Self {
        Self {
            validator: None,
            name: "any",
        }
    }

    /// A named type with a runtime predicate.
    pub fn new(
        name: &'static str,
        validator: impl Fn(&E) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            validator: Some(Arc::new(validator)),
            name,
        }
    }

    /// Check `value` against this element type.
    pub fn check(&self, value: &E) -> std::result::Result<(), String> {
        match &self.validator {
            Some(v) => v(value),
            None => Ok(()),
        }
    }

    /// The declared type's name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<E> Default for ElementType<E> {
    fn default() -> Self {
        Self::any()
    }
}

impl<E> std::fmt::Debug for ElementType<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementType").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_accepts_everything() {
        let t: ElementType<i64> = ElementType::any();
        assert!(t.check(&-5).is_ok());
        assert!(t.check(&0).is_ok());
    }

    #[test]
    fn named_validator_rejects_on_predicate_failure() {
        let t = ElementType::new("non_negative", |v: &i64| if *v >= 0 { Ok(()) } else { Err("negative".to_string()) });
        assert!(t.check(&1).is_ok());
        assert_eq!(t.check(&-1).unwrap_err(), "negative");
        assert_eq!(t.name(), "non_negative");
    }
}
