//! Per-call state: [`EvaluatorContext`] (name → value, visible to
//! expressions) and [`ParserContext`] (the mutable decode/encode cursor
//! state) (§3).

use std::collections::HashMap;

use crate::value::Value;

/// Reserved context entry name for the object currently being
/// decoded/encoded.
pub const SELF: &str = "self";
/// Reserved context entry name for the outermost object of the current
/// call (the same object as `self` unless we are inside a nested OBJECT
/// codec).
pub const ROOT: &str = "root";
/// Reserved context entry name for the most recently read variant prefix.
pub const PREFIX: &str = "prefix";

/// A process- or call-scoped mapping from name to value (§3).
///
/// The crate follows the source's own recommendation and prefers per-call
/// contexts: one `EvaluatorContext` is created per top-level
/// `decode`/`encode` invocation and threaded through the whole field loop,
/// rather than living on a shared engine instance.
#[derive(Debug, Clone, Default)]
pub struct EvaluatorContext {
    entries: HashMap<String, Value>,
}

impl EvaluatorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn set_self(&mut self, value: Value) {
        self.put(SELF, value);
    }

    pub fn self_value(&self) -> Value {
        self.get(SELF).cloned().unwrap_or(Value::Null)
    }

    pub fn set_root(&mut self, value: Value) {
        self.put(ROOT, value);
    }

    pub fn root_value(&self) -> Value {
        self.get(ROOT).cloned().unwrap_or(Value::Null)
    }

    pub fn set_prefix(&mut self, value: u64) {
        self.put(PREFIX, Value::from(value));
    }

    pub fn clear_prefix(&mut self) {
        self.remove(PREFIX);
    }
}

/// A guard restoring previously-shadowed context-parameter entries on drop
/// (§3 "ContextParameters push/pop on field entry/exit").
pub struct ContextParamsGuard {
    previous: Vec<(String, Option<Value>)>,
}

impl ContextParamsGuard {
    pub fn push(
        ctx: &mut EvaluatorContext,
        params: &[(String, Value)],
    ) -> Self {
        let mut previous = Vec::with_capacity(params.len());
        for (name, value) in params {
            previous.push((name.clone(), ctx.get(name).cloned()));
            ctx.put(name.clone(), value.clone());
        }
        ContextParamsGuard { previous }
    }

    pub fn restore(self, ctx: &mut EvaluatorContext) {
        for (name, value) in self.previous {
            match value {
                Some(v) => ctx.put(name, v),
                None => {
                    ctx.remove(&name);
                }
            }
        }
    }
}

/// Per-call mutable state driving the field loop (§3 Lifecycles).
///
/// `current` is replaced wholesale on every field assignment: this is the
/// Rust realization of "if the object type is immutable, the assignment
/// produces a new object and replaces `current`" (§4.3 step 4e) — in this
/// crate *every* target type is treated this way, since Rust struct values
/// have no reflective in-place field mutation without a user-supplied
/// setter closure, and the builder-supplied setter already returns the
/// mutated value by taking `&mut T`.
pub struct ParserContext<T> {
    pub current: T,
    pub start_position_bits: u64,
}

impl<T> ParserContext<T> {
    pub fn new(current: T, start_position_bits: u64) -> Self {
        ParserContext {
            current,
            start_position_bits,
        }
    }
}
