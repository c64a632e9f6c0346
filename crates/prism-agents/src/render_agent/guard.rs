// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use prism_core::renderer::RenderError;
use std::cell::Cell;

/// Detects nested pipeline invocations on one agent.
///
/// A scene callback that calls back into the agent while a paint, pick or
/// capture is running is rejected with [`RenderError::Reentrant`].
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    active: Cell<bool>,
}

impl ReentrancyGuard {
    /// Creates an inactive guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the guard active until the returned scope is dropped.
    pub fn enter(&self) -> Result<ReentrancyScope<'_>, RenderError> {
        if self.active.replace(true) {
            log::warn!("Nested pipeline invocation rejected");
            return Err(RenderError::Reentrant);
        }
        Ok(ReentrancyScope { guard: self })
    }

    /// Returns `true` while a scope is alive.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Releases its [`ReentrancyGuard`] when dropped, panics included.
#[derive(Debug)]
pub struct ReentrancyScope<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for ReentrancyScope<'_> {
    fn drop(&mut self) {
        self.guard.active.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_enter_is_rejected() {
        let guard = ReentrancyGuard::new();
        let scope = guard.enter().unwrap();
        assert!(guard.is_active());
        assert_eq!(guard.enter().unwrap_err(), RenderError::Reentrant);
        drop(scope);
        assert!(!guard.is_active());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn test_scope_is_released_on_unwind() {
        let guard = ReentrancyGuard::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = guard.enter().unwrap();
            panic!("scene exploded");
        }));
        assert!(result.is_err());
        assert!(!guard.is_active());
    }
}
