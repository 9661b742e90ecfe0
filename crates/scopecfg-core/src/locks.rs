//! Per-scope save serialization.

use parking_lot::Mutex;
use scopecfg_protocol::Scope;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutex: saves to the same exact scope run one at a time,
/// saves to different scopes never wait on each other.
#[derive(Debug, Clone, Default)]
pub struct ScopeLocks {
    entries: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held while a scope is being saved.
pub type ScopeGuard = OwnedMutexGuard<()>;

impl ScopeLocks {
    /// Create an empty lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `scope`.
    pub async fn lock(&self, scope: &Scope) -> ScopeGuard {
        let mutex = {
            let mut entries = self.entries.lock();
            // Entries referenced only by the registry are idle.
            entries.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            entries
                .entry(scope.canonical_key())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    /// Number of scopes currently tracked.
    pub fn tracked(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::ScopeLocks;
    use scopecfg_protocol::Scope;
    use std::time::Duration;

    #[tokio::test]
    async fn same_scope_waits_for_the_holder() {
        let locks = ScopeLocks::new();
        let scope = Scope::single_tag([1], Some(2));
        let guard = locks.lock(&scope).await;

        let contender = locks.clone();
        let waiting = {
            let scope = scope.clone();
            tokio::spawn(async move {
                let _guard = contender.lock(&scope).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("released")
            .expect("join");
    }

    #[tokio::test]
    async fn different_scopes_do_not_block() {
        let locks = ScopeLocks::new();
        let _first = locks.lock(&Scope::single_tag([1], None)).await;
        tokio::time::timeout(
            Duration::from_secs(1),
            locks.lock(&Scope::single_tag([2], None)),
        )
        .await
        .expect("independent scope");
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = ScopeLocks::new();
        drop(locks.lock(&Scope::single_tag([1], None)).await);
        drop(locks.lock(&Scope::single_tag([2], None)).await);
        let _held = locks.lock(&Scope::single_tag([3], None)).await;
        assert_eq!(locks.tracked(), 1);
    }
}
