// ABOUTME: Lexical scope chain linking local bindings to the sandbox table

use crate::value::{Table, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One link in the lexical scope chain.
///
/// Lookup walks own slots, then the parent chain, then the sandbox table at
/// the root. The root scope has no slots of its own: its bindings ARE the
/// sandbox table, so program-level writes are observable in the sandbox
/// after execution.
#[derive(Debug)]
pub struct Scope {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
    sandbox: Option<Rc<RefCell<Table>>>,
}

impl Scope {
    /// Creates the root scope backed by a sandbox table.
    pub fn root(sandbox: Rc<RefCell<Table>>) -> Rc<Self> {
        Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
            sandbox: Some(sandbox),
        })
    }

    /// Creates a child scope nested in `parent`.
    pub fn child(parent: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
            sandbox: None,
        })
    }

    /// Looks up a name in this scope, its ancestors, then the sandbox.
    /// Unbound names read as nil.
    pub fn get(&self, name: &str) -> Value {
        if let Some(sandbox) = &self.sandbox {
            return sandbox.borrow().get_str(name);
        }
        if let Some(value) = self.bindings.borrow().get(name) {
            return value.clone();
        }
        match &self.parent {
            Some(parent) => parent.get(name),
            None => Value::Nil,
        }
    }

    /// Creates a binding in THIS scope, shadowing any ancestor binding.
    /// This is what `local` does.
    pub fn declare(&self, name: &str, value: Value) {
        if let Some(sandbox) = &self.sandbox {
            sandbox.borrow_mut().set_str(name, value);
            return;
        }
        self.bindings.borrow_mut().insert(name.to_string(), value);
    }

    /// Assigns to a name following the dynamic assignment rules: overwrite
    /// the nearest scope that owns the name, else create an own slot here.
    pub fn assign(&self, name: &str, value: Value) {
        if !self.try_update(name, &value) {
            self.declare(name, value);
        }
    }

    fn try_update(&self, name: &str, value: &Value) -> bool {
        if let Some(sandbox) = &self.sandbox {
            let owns = sandbox.borrow().contains_str(name);
            if owns {
                sandbox.borrow_mut().set_str(name, value.clone());
            }
            return owns;
        }
        if self.bindings.borrow().contains_key(name) {
            self.bindings
                .borrow_mut()
                .insert(name.to_string(), value.clone());
            return true;
        }
        match &self.parent {
            Some(parent) => parent.try_update(name, value),
            None => false,
        }
    }

    /// The sandbox table at the root of this chain, if any. Detached scopes
    /// built for tests may not have one.
    #[allow(dead_code)]
    pub fn sandbox(&self) -> Option<Rc<RefCell<Table>>> {
        if let Some(sandbox) = &self.sandbox {
            return Some(Rc::clone(sandbox));
        }
        self.parent.as_ref().and_then(|p| p.sandbox())
    }
}
