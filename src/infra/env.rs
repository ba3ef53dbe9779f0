//! Scoped process environment overrides
//!
//! Package managers read credentials from the environment. [`EnvGuard`]
//! sets variables for the lifetime of a command and puts the previous
//! values back when dropped, on success, error and unwind alike.

use std::env;

/// Restores overridden environment variables on drop
#[derive(Debug, Default)]
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, remembering the previous value once
    pub fn set(&mut self, key: &str, value: &str) {
        if !self.saved.iter().any(|(k, _)| k == key) {
            self.saved.push((key.to_string(), env::var(key).ok()));
        }
        env::set_var(key, value);
    }

    /// Names of the variables this guard controls
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.saved.iter().map(|(k, _)| k.as_str())
    }

    /// Restore every variable now; calling it again is a no-op
    pub fn restore(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => env::set_var(&key, value),
                None => env::remove_var(&key),
            }
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        self.restore();
    }
}
