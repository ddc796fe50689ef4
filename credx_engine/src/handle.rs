use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::trace;

use crate::error::{EngineError, EngineResult};

/// Process-wide handle counter shared by every registry, so a handle is
/// unique for the lifetime of the process regardless of object type.
static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);

/// Arena-style table mapping opaque integer handles to protocol objects.
///
/// Lookups fail closed: a missing or released handle is always an
/// `InvalidHandle` error. Each entry sits behind its own async mutex, which
/// serializes state-mutating operations per handle while operations on
/// different handles proceed in parallel; snapshot reads clone under the same
/// lock and therefore never observe a partially-mutated object.
pub struct HandleRegistry<T> {
    name: &'static str,
    store: RwLock<HashMap<u32, Arc<Mutex<T>>>>,
}

impl<T> HandleRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        HandleRegistry {
            name,
            store: RwLock::new(HashMap::new()),
        }
    }

    fn read_store(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, HashMap<u32, Arc<Mutex<T>>>>> {
        self.store
            .read()
            .map_err(|_| EngineError::Internal(format!("{} handle table poisoned", self.name)))
    }

    fn write_store(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, HashMap<u32, Arc<Mutex<T>>>>> {
        self.store
            .write()
            .map_err(|_| EngineError::Internal(format!("{} handle table poisoned", self.name)))
    }

    pub fn add(&self, obj: T) -> EngineResult<u32> {
        let handle = NEXT_HANDLE.fetch_add(1, Ordering::SeqCst);
        let mut store = self.write_store()?;
        store.insert(handle, Arc::new(Mutex::new(obj)));
        trace!(registry = self.name, handle, "object added");
        Ok(handle)
    }

    /// Fetch the entry for `handle`. Callers lock the returned mutex for the
    /// duration of their read or mutation.
    pub fn entry(&self, handle: u32) -> EngineResult<Arc<Mutex<T>>> {
        let store = self.read_store()?;
        store.get(&handle).cloned().ok_or_else(|| {
            EngineError::InvalidHandle(format!(
                "no {} object for handle {handle}",
                self.name
            ))
        })
    }

    pub fn has_handle(&self, handle: u32) -> bool {
        self.read_store()
            .map(|store| store.contains_key(&handle))
            .unwrap_or(false)
    }

    pub async fn get_cloned(&self, handle: u32) -> EngineResult<T>
    where
        T: Clone,
    {
        let entry = self.entry(handle)?;
        let guard = entry.lock().await;
        Ok(guard.clone())
    }

    pub fn release(&self, handle: u32) -> EngineResult<()> {
        let mut store = self.write_store()?;
        match store.remove(&handle) {
            Some(_) => {
                trace!(registry = self.name, handle, "object released");
                Ok(())
            }
            None => Err(EngineError::InvalidHandle(format!(
                "no {} object for handle {handle}, perhaps already released",
                self.name
            ))),
        }
    }

    pub fn drain(&self) -> EngineResult<()> {
        let mut store = self.write_store()?;
        store.clear();
        Ok(())
    }

    pub fn len(&self) -> EngineResult<usize> {
        Ok(self.read_store()?.len())
    }

    pub fn is_empty(&self) -> EngineResult<bool> {
        Ok(self.read_store()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handles_are_unique_across_registries() {
        let strings: HandleRegistry<String> = HandleRegistry::new("strings");
        let numbers: HandleRegistry<u64> = HandleRegistry::new("numbers");

        let a = strings.add("one".to_string()).unwrap();
        let b = numbers.add(2).unwrap();
        let c = strings.add("three".to_string()).unwrap();
        assert!(a != b && b != c && a != c);
    }

    #[tokio::test]
    async fn released_handle_fails_closed() {
        let registry: HandleRegistry<String> = HandleRegistry::new("strings");
        let handle = registry.add("obj".to_string()).unwrap();
        assert!(registry.has_handle(handle));

        registry.release(handle).unwrap();
        assert!(!registry.has_handle(handle));
        assert!(matches!(
            registry.entry(handle),
            Err(EngineError::InvalidHandle(_))
        ));
        assert!(matches!(
            registry.get_cloned(handle).await,
            Err(EngineError::InvalidHandle(_))
        ));
        // double release reports, it does not silently succeed
        assert!(matches!(
            registry.release(handle),
            Err(EngineError::InvalidHandle(_))
        ));
    }

    #[tokio::test]
    async fn entry_serializes_mutations() {
        let registry: HandleRegistry<Vec<u32>> = HandleRegistry::new("vecs");
        let handle = registry.add(Vec::new()).unwrap();

        let mut tasks = Vec::new();
        for i in 0..8u32 {
            let entry = registry.entry(handle).unwrap();
            tasks.push(tokio::spawn(async move {
                let mut guard = entry.lock().await;
                guard.push(i);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let entry = registry.entry(handle).unwrap();
        let guard = entry.lock().await;
        assert_eq!(guard.len(), 8);
    }
}
