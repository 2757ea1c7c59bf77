//! Stack of lexical frames used by renaming and by the lexical DDG.

use std::collections::HashMap;

/// Frames map a logical name to the most recent value bound in that frame.
#[derive(Debug, Clone)]
pub struct ScopeStack<T> {
    frames: Vec<HashMap<String, T>>,
}

impl<T> Default for ScopeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ScopeStack<T> {
    /// A stack holding one (outermost) frame.
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pop the innermost frame. The outermost frame is never removed.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Bind `name` in the innermost frame, shadowing outer bindings.
    pub fn bind(&mut self, name: impl Into<String>, value: T) {
        if let Some(top) = self.frames.last_mut() {
            top.insert(name.into(), value);
        }
    }

    /// Rebind `name` in the innermost frame that already holds it. Returns
    /// `false` and binds nothing when no frame does.
    pub fn assign(&mut self, name: &str, value: T) -> bool {
        match self.frames.iter_mut().rev().find(|f| f.contains_key(name)) {
            Some(frame) => {
                frame.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_frame_shadows_outer() {
        let mut scope = ScopeStack::new();
        scope.bind("x", 1);
        scope.push();
        scope.bind("x", 2);
        assert_eq!(scope.lookup("x"), Some(&2));
        scope.pop();
        assert_eq!(scope.lookup("x"), Some(&1));
    }

    #[test]
    fn test_assign_updates_declaring_frame() {
        let mut scope = ScopeStack::new();
        scope.bind("x", 1);
        scope.push();
        assert!(scope.assign("x", 5));
        scope.pop();
        assert_eq!(scope.lookup("x"), Some(&5));
    }

    #[test]
    fn test_assign_without_binding_is_rejected() {
        let mut scope = ScopeStack::new();
        assert!(!scope.assign("g", 1));
        assert_eq!(scope.lookup("g"), None);
    }

    #[test]
    fn test_outermost_frame_survives_pop() {
        let mut scope: ScopeStack<u8> = ScopeStack::new();
        scope.bind("x", 1);
        scope.pop();
        assert_eq!(scope.lookup("x"), Some(&1));
    }
}
