//! Scope chain for MyLang
//!
//! Frames are shared (`Rc<RefCell<_>>`) because closures keep their defining
//! frame alive after the block that created it has finished. Parent links
//! only point outward, so there are no reference cycles between frames.

use crate::ast::VarOptions;
use crate::error::RuntimeError;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Shared handle to a frame
pub type Scope = Rc<RefCell<Environment>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("{0} has been initialized")]
    AlreadyInitialized(String),

    #[error("{0} is not defined")]
    NotDefined(String),
}

impl From<EnvironmentError> for RuntimeError {
    fn from(err: EnvironmentError) -> Self {
        match err {
            EnvironmentError::AlreadyInitialized(_) => RuntimeError::base(err.to_string()),
            EnvironmentError::NotDefined(_) => RuntimeError::reference(err.to_string()),
        }
    }
}

/// One frame of name bindings plus their mutability tags
#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    options_var: HashMap<String, VarOptions>,
    parent: Option<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn with_parent(parent: Scope) -> Self {
        Environment {
            values: HashMap::new(),
            options_var: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Fresh root frame
    pub fn new_scope() -> Scope {
        Rc::new(RefCell::new(Environment::new()))
    }

    /// Fresh frame whose parent is `parent`
    pub fn child(parent: &Scope) -> Scope {
        Rc::new(RefCell::new(Environment::with_parent(Rc::clone(parent))))
    }

    pub fn parent(&self) -> Option<Scope> {
        self.parent.clone()
    }

    /// Bind `key` in this frame, replacing any existing binding
    pub fn define(&mut self, key: &str, value: Value, options: Option<VarOptions>) {
        self.values.insert(key.to_string(), value);
        match options {
            Some(options) => {
                self.options_var.insert(key.to_string(), options);
            }
            None => {
                self.options_var.remove(key);
            }
        }
    }

    /// Bind `key` in this frame; never looks at parents
    pub fn create(
        &mut self,
        key: &str,
        value: Value,
        options: Option<VarOptions>,
    ) -> Result<(), EnvironmentError> {
        if self.values.contains_key(key) {
            return Err(EnvironmentError::AlreadyInitialized(key.to_string()));
        }
        self.values.insert(key.to_string(), value);
        if let Some(options) = options {
            self.options_var.insert(key.to_string(), options);
        }
        Ok(())
    }

    /// Replace the value in the frame that defines `key`
    pub fn update(
        &mut self,
        key: &str,
        value: Value,
        options: Option<VarOptions>,
    ) -> Result<(), EnvironmentError> {
        if self.values.contains_key(key) {
            self.values.insert(key.to_string(), value);
            if let Some(options) = options {
                self.options_var.insert(key.to_string(), options);
            }
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().update(key, value, options),
            None => Err(EnvironmentError::NotDefined(key.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Result<Value, EnvironmentError> {
        if let Some(value) = self.values.get(key) {
            return Ok(value.clone());
        }
        match &self.parent {
            Some(parent) => parent.borrow().get(key),
            None => Err(EnvironmentError::NotDefined(key.to_string())),
        }
    }

    /// `update` if `key` is defined anywhere in the chain, else bind it here
    pub fn ensure(&mut self, key: &str, value: Value) {
        if self.is_defined(key) {
            // is_defined guarantees a defining frame exists
            let _ = self.update(key, value, None);
        } else {
            self.values.insert(key.to_string(), value);
        }
    }

    /// Local-frame membership only
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Membership anywhere in the chain
    pub fn is_defined(&self, key: &str) -> bool {
        self.values.contains_key(key)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.borrow().is_defined(key))
    }

    /// Mutability tag from the frame that defines `key`
    pub fn options(&self, key: &str) -> Option<VarOptions> {
        if self.values.contains_key(key) {
            return self.options_var.get(key).copied();
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.borrow().options(key))
    }

    /// Replace (or clear, with `None`) the tag in the defining frame
    pub fn set_options(
        &mut self,
        key: &str,
        options: Option<VarOptions>,
    ) -> Result<(), EnvironmentError> {
        if self.values.contains_key(key) {
            match options {
                Some(options) => {
                    self.options_var.insert(key.to_string(), options);
                }
                None => {
                    self.options_var.remove(key);
                }
            }
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().set_options(key, options),
            None => Err(EnvironmentError::NotDefined(key.to_string())),
        }
    }

    pub fn is_readonly(&self, key: &str) -> bool {
        self.options(key).is_some_and(|o| o.readonly)
    }

    /// Names bound in this frame, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Merge two frames (right wins) and, recursively, their parent chains
    pub fn combine(left: &Scope, right: &Scope) -> Scope {
        let (l, r) = (left.borrow(), right.borrow());

        let mut values = l.values.clone();
        values.extend(r.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut options_var = l.options_var.clone();
        options_var.extend(r.options_var.iter().map(|(k, v)| (k.clone(), *v)));

        let parent = match (&l.parent, &r.parent) {
            (Some(lp), Some(rp)) if Rc::ptr_eq(lp, rp) => Some(Rc::clone(lp)),
            (Some(lp), Some(rp)) => Some(Environment::combine(lp, rp)),
            (Some(p), None) | (None, Some(p)) => Some(Rc::clone(p)),
            (None, None) => None,
        };

        Rc::new(RefCell::new(Environment {
            values,
            options_var,
            parent,
        }))
    }

    /// Copy every frame of the chain; values are copied shallowly
    pub fn deep_clone(scope: &Scope) -> Scope {
        let env = scope.borrow();
        Rc::new(RefCell::new(Environment {
            values: env.values.clone(),
            options_var: env.options_var.clone(),
            parent: env.parent.as_ref().map(Environment::deep_clone),
        }))
    }

    /// Outermost frame of the chain
    pub fn root(scope: &Scope) -> Scope {
        let mut current = Rc::clone(scope);
        loop {
            let parent = current.borrow().parent.clone();
            match parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn test_create_rejects_redeclaration_in_same_frame() {
        let scope = Environment::new_scope();
        scope.borrow_mut().create("x", int(1), None).unwrap();
        assert_eq!(
            scope.borrow_mut().create("x", int(2), None),
            Err(EnvironmentError::AlreadyInitialized("x".to_string()))
        );

        // shadowing in a child frame is fine
        let child = Environment::child(&scope);
        assert!(child.borrow_mut().create("x", int(3), None).is_ok());
        assert!(matches!(child.borrow().get("x"), Ok(Value::Int(3))));
        assert!(matches!(scope.borrow().get("x"), Ok(Value::Int(1))));
    }

    #[test]
    fn test_update_writes_to_defining_frame() {
        let scope = Environment::new_scope();
        scope.borrow_mut().create("x", Value::Nil, None).unwrap();
        let inner = Environment::child(&Environment::child(&scope));

        inner.borrow_mut().update("x", int(5), None).unwrap();
        assert!(!inner.borrow().has("x"));
        assert!(matches!(scope.borrow().get("x"), Ok(Value::Int(5))));

        assert_eq!(
            inner.borrow_mut().update("y", int(1), None),
            Err(EnvironmentError::NotDefined("y".to_string()))
        );
        assert_eq!(
            inner.borrow().get("y").unwrap_err().to_string(),
            "y is not defined"
        );
    }

    #[test]
    fn test_ensure_falls_back_to_local_creation() {
        let scope = Environment::new_scope();
        scope.borrow_mut().create("outer", int(0), None).unwrap();
        let bridge = Environment::child(&scope);

        bridge.borrow_mut().ensure("outer", int(1));
        bridge.borrow_mut().ensure("fresh", int(2));

        assert!(matches!(scope.borrow().get("outer"), Ok(Value::Int(1))));
        assert!(bridge.borrow().has("fresh"));
        assert!(!scope.borrow().is_defined("fresh"));
    }

    #[test]
    fn test_options_read_from_defining_frame() {
        let scope = Environment::new_scope();
        scope
            .borrow_mut()
            .create("a", Value::Nil, Some(VarOptions::readonly()))
            .unwrap();
        let child = Environment::child(&scope);

        assert!(child.borrow().is_readonly("a"));
        child.borrow_mut().set_options("a", None).unwrap();
        assert!(!scope.borrow().is_readonly("a"));
        assert_eq!(scope.borrow().options("a"), None);
    }

    #[test]
    fn test_combine_merges_frames_and_shares_common_parent() {
        let root = Environment::new_scope();
        root.borrow_mut().create("shared", int(0), None).unwrap();

        let left = Environment::child(&root);
        left.borrow_mut().create("a", int(1), None).unwrap();
        left.borrow_mut().create("x", int(1), None).unwrap();
        let right = Environment::child(&root);
        right.borrow_mut().create("b", int(2), None).unwrap();
        right.borrow_mut().create("x", int(2), None).unwrap();

        let combined = Environment::combine(&left, &right);
        let env = combined.borrow();
        assert!(matches!(env.get("a"), Ok(Value::Int(1))));
        assert!(matches!(env.get("b"), Ok(Value::Int(2))));
        assert!(matches!(env.get("x"), Ok(Value::Int(2))));

        let parent = env.parent().unwrap();
        assert!(Rc::ptr_eq(&parent, &root));
    }

    #[test]
    fn test_deep_clone_does_not_alias_frames() {
        let root = Environment::new_scope();
        root.borrow_mut().create("x", int(1), None).unwrap();
        let child = Environment::child(&root);

        let copy = Environment::deep_clone(&child);
        copy.borrow_mut().update("x", int(99), None).unwrap();

        assert!(matches!(root.borrow().get("x"), Ok(Value::Int(1))));
        assert!(matches!(copy.borrow().get("x"), Ok(Value::Int(99))));
    }

    #[test]
    fn test_root_walks_to_top() {
        let root = Environment::new_scope();
        let leaf = Environment::child(&Environment::child(&root));
        assert!(Rc::ptr_eq(&Environment::root(&leaf), &root));
        assert!(Rc::ptr_eq(&Environment::root(&root), &root));
    }
}
