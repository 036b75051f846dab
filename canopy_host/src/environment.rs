// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred, tracked environment reads.

use core::marker::PhantomData;

use canopy_environment::{EnvironmentKey, EnvironmentValues, PropertyKey};

/// A deferred read of one environment key.
///
/// Readers are constructed detached and pointed at a tree's environment
/// with [`install`](Self::install) when the subtree is set up. Reading a
/// reader that was never installed is a misuse: it returns the key's
/// default and logs, it never crashes.
pub struct EnvironmentReader<K: EnvironmentKey> {
    environment: Option<EnvironmentValues>,
    _key: PhantomData<fn() -> K>,
}

impl<K: EnvironmentKey> EnvironmentReader<K> {
    /// Creates a detached reader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            environment: None,
            _key: PhantomData,
        }
    }

    /// Points the reader at `environment`.
    ///
    /// Installing again replaces the previous environment.
    pub fn install(&mut self, environment: EnvironmentValues) {
        self.environment = Some(environment);
    }

    /// Returns `true` once an environment has been installed.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.environment.is_some()
    }

    /// Reads the key from the installed environment.
    ///
    /// An uninstalled reader reports the key's default value and logs.
    #[must_use]
    pub fn get(&self) -> K::Value {
        match &self.environment {
            Some(environment) => environment.get::<K>(),
            None => {
                tracing::error!(
                    key = core::any::type_name::<K>(),
                    "environment read before any environment was installed"
                );
                K::default_value()
            }
        }
    }
}

impl<K: EnvironmentKey> Default for EnvironmentReader<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EnvironmentKey> core::fmt::Debug for EnvironmentReader<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EnvironmentReader")
            .field("key", &core::any::type_name::<K>())
            .field("installed", &self.environment.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Emphasis;
    impl PropertyKey for Emphasis {
        type Value = bool;
        fn default_value() -> bool {
            false
        }
        fn values_equal(a: &bool, b: &bool) -> bool {
            a == b
        }
    }
    impl EnvironmentKey for Emphasis {}

    #[test]
    fn uninstalled_read_falls_back_to_the_default() {
        let reader = EnvironmentReader::<Emphasis>::new();
        assert!(!reader.is_installed());
        assert!(!reader.get());
    }

    #[test]
    fn installed_read_sees_the_environment() {
        let mut environment = EnvironmentValues::new();
        environment.set::<Emphasis>(true);

        let mut reader = EnvironmentReader::<Emphasis>::new();
        reader.install(environment);
        assert!(reader.is_installed());
        assert!(reader.get());
    }
}
