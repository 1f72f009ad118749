//! The dynamic evaluation context: the context item with its 1-based
//! position and size, plus the variable binding table with guard-style
//! save/restore.

use ahash::AHashMap;

use crate::value::XPathVal;
use crate::xml::NodeEntry;

#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub item: Option<NodeEntry>,
    /// Atomic context item, set when filtering non-node sequences.
    pub value: Option<XPathVal>,
    pub position: usize,
    pub size: usize,
}

impl EvalContext {
    pub fn with_item(item: NodeEntry) -> Self {
        EvalContext {
            item: Some(item),
            value: None,
            position: 1,
            size: 1,
        }
    }

    pub fn with_value(value: XPathVal, position: usize, size: usize) -> Self {
        EvalContext {
            item: None,
            value: Some(value),
            position,
            size,
        }
    }
}

/// Stack of context frames, pushed around step and predicate evaluation.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<EvalContext>,
}

impl ContextStack {
    pub fn push(&mut self, frame: EvalContext) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn current(&self) -> Option<&EvalContext> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Restores the previous binding when handed back to
/// [`VariableBindings::restore`]. Pop must mirror push exactly; the
/// scope-hygiene property test checks this.
#[derive(Debug)]
#[must_use = "restore the binding with VariableBindings::restore"]
pub struct BindingGuard {
    name: String,
    previous: Option<XPathVal>,
}

#[derive(Debug, Default)]
pub struct VariableBindings {
    map: AHashMap<String, XPathVal>,
}

impl VariableBindings {
    pub fn bind(&mut self, name: &str, value: XPathVal) -> BindingGuard {
        let previous = self.map.insert(name.to_string(), value);
        BindingGuard {
            name: name.to_string(),
            previous,
        }
    }

    pub fn restore(&mut self, guard: BindingGuard) {
        match guard.previous {
            Some(previous) => {
                self.map.insert(guard.name, previous);
            }
            None => {
                self.map.remove(&guard.name);
            }
        }
    }

    /// Unconditional set, used for host-provided keys before evaluation.
    pub fn set(&mut self, name: &str, value: XPathVal) {
        self.map.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&XPathVal> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sorted snapshot for scope-hygiene assertions.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .map
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string_value()))
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_restore_round_trip() {
        let mut bindings = VariableBindings::default();
        bindings.set("x", XPathVal::Number(1.0));
        let before = bindings.snapshot();

        let guard = bindings.bind("x", XPathVal::Number(2.0));
        assert_eq!(bindings.get("x").unwrap().to_number(), 2.0);
        let inner = bindings.bind("y", XPathVal::String("inner".into()));
        bindings.restore(inner);
        bindings.restore(guard);

        assert_eq!(bindings.snapshot(), before);
    }

    #[test]
    fn restore_removes_fresh_binding() {
        let mut bindings = VariableBindings::default();
        let guard = bindings.bind("fresh", XPathVal::Boolean(true));
        assert!(bindings.contains("fresh"));
        bindings.restore(guard);
        assert!(!bindings.contains("fresh"));
    }
}
