//! Shared context threaded through one dispatch.
//!
//! Value parsers that carry an [`EnvKey`] publish what they parse here, so
//! completers of later slots can look at earlier values (e.g. complete
//! branch names of the repository given by an earlier flag).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

/// Typed key into an [`Env`].
pub struct EnvKey<T> {
    id: u64,
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T: 'static> EnvKey<T> {
    /// Every call creates a distinct key, even for equal names.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
            name,
            _value: PhantomData,
        }
    }
}

impl<T> Clone for EnvKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EnvKey<T> {}

impl<T> fmt::Debug for EnvKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Default)]
pub struct Env {
    values: HashMap<u64, Box<dyn Any>>,
    completing: bool,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn completing() -> Self {
        Self {
            completing: true,
            ..Self::default()
        }
    }

    /// Whether this dispatch only computes shell completions.
    pub fn is_completing(&self) -> bool {
        self.completing
    }

    /// Store a value, replacing any earlier one under the same key.
    pub fn set<T: 'static>(&mut self, key: &EnvKey<T>, value: T) {
        self.values.insert(key.id, Box::new(value));
    }

    pub fn get<T: 'static>(&self, key: &EnvKey<T>) -> Option<&T> {
        self.values.get(&key.id).and_then(|v| v.downcast_ref())
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("entries", &self.values.len())
            .field("completing", &self.completing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_with_equal_names_do_not_collide() {
        let a: EnvKey<String> = EnvKey::new("repo");
        let b: EnvKey<String> = EnvKey::new("repo");
        let mut env = Env::new();
        env.set(&a, "first".to_string());
        assert_eq!(env.get(&a).map(String::as_str), Some("first"));
        assert!(env.get(&b).is_none());
    }

    #[test]
    fn set_overwrites_earlier_values() {
        let key: EnvKey<i64> = EnvKey::new("count");
        let mut env = Env::new();
        env.set(&key, 1);
        env.set(&key, 2);
        assert_eq!(env.get(&key), Some(&2));
    }
}
