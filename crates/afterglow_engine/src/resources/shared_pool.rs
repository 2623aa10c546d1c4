//! Content-addressed, reference-counted GPU resource cache
//!
//! Resources are keyed by the asset descriptor they were built from. Every
//! [`ResourceReference`] bumps a per-entry count; when the last one is dropped
//! the entry is queued for removal but stays alive until [`SharedResourcePool::update`]
//! has waited for every frame in flight. A reference acquired again between
//! the drop and the update keeps the entry (a "reference swap").
//!
//! Entries live behind `Rc`, so a reference stays valid no matter how the
//! pool's maps grow or shrink while it is held.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use log::{debug, info};

use crate::error::EngineResult;
use crate::foundation::collections::{Handle, HandleMap, IdGenerator};
use crate::render::vulkan::sync::{FenceFlag, FenceWaiter};

struct PoolEntry<K, R> {
    key: K,
    id: u64,
    resource: R,
    count: Cell<usize>,
}

type RemovalQueue = Rc<RefCell<Vec<Handle>>>;

/// Counted handle to a pooled resource
pub struct ResourceReference<K, R> {
    entry: Rc<PoolEntry<K, R>>,
    handle: Handle,
    removals: RemovalQueue,
}

impl<K, R> ResourceReference<K, R> {
    fn new(entry: Rc<PoolEntry<K, R>>, handle: Handle, removals: RemovalQueue) -> Self {
        entry.count.set(entry.count.get() + 1);
        Self { entry, handle, removals }
    }

    /// Asset descriptor the resource was built from
    pub fn key(&self) -> &K {
        &self.entry.key
    }

    /// Pool-unique id, stable for the lifetime of the entry
    pub fn id(&self) -> u64 {
        self.entry.id
    }

    /// The pooled resource
    pub fn resource(&self) -> &R {
        &self.entry.resource
    }

    /// Number of live references to this entry, including this one
    pub fn reference_count(&self) -> usize {
        self.entry.count.get()
    }
}

impl<K, R> Clone for ResourceReference<K, R> {
    fn clone(&self) -> Self {
        Self::new(Rc::clone(&self.entry), self.handle, Rc::clone(&self.removals))
    }
}

impl<K, R> Drop for ResourceReference<K, R> {
    fn drop(&mut self) {
        let count = self.entry.count.get().saturating_sub(1);
        self.entry.count.set(count);
        if count == 0 {
            self.removals.borrow_mut().push(self.handle);
        }
    }
}

impl<K: Debug, R> Debug for ResourceReference<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceReference")
            .field("key", &self.entry.key)
            .field("id", &self.entry.id)
            .field("count", &self.entry.count.get())
            .finish()
    }
}

/// Shared cache of resources of type `R` keyed by `K`
pub struct SharedResourcePool<K, R> {
    slots: HandleMap<Rc<PoolEntry<K, R>>>,
    keys: HashMap<K, Handle>,
    removals: RemovalQueue,
    ids: IdGenerator,
}

impl<K, R> SharedResourcePool<K, R>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            slots: HandleMap::new(),
            keys: HashMap::new(),
            removals: Rc::new(RefCell::new(Vec::new())),
            ids: IdGenerator::new(),
        }
    }

    /// Get a reference to the resource for `key`, building it with `create` on a miss
    ///
    /// `create` receives the key and usually loads and uploads synchronously.
    /// A failed build leaves the pool untouched.
    pub fn acquire(
        &mut self,
        key: K,
        create: impl FnOnce(&K) -> EngineResult<R>,
    ) -> EngineResult<ResourceReference<K, R>> {
        if let Some(&handle) = self.keys.get(&key) {
            if let Some(entry) = self.slots.get(handle) {
                return Ok(ResourceReference::new(Rc::clone(entry), handle, Rc::clone(&self.removals)));
            }
        }

        let resource = create(&key)?;
        let entry = Rc::new(PoolEntry {
            key: key.clone(),
            id: self.ids.allocate(),
            resource,
            count: Cell::new(0),
        });
        let handle = self.slots.insert(Rc::clone(&entry));
        self.keys.insert(key, handle);
        debug!("Resource was created: {:?} (id {})", entry.key, entry.id);
        Ok(ResourceReference::new(entry, handle, Rc::clone(&self.removals)))
    }

    /// Evict entries whose last reference was dropped, returning how many were evicted
    ///
    /// Does nothing when no reference reached zero since the last call. Otherwise
    /// waits for the compute and render fences of every frame in flight first.
    pub fn update(&mut self, fences: &dyn FenceWaiter) -> EngineResult<usize> {
        if self.removals.borrow().is_empty() {
            return Ok(0);
        }
        fences.wait_fence(FenceFlag::ComputeInFlight)?;
        fences.wait_fence(FenceFlag::RenderInFlight)?;

        let pending: Vec<Handle> = self.removals.borrow_mut().drain(..).collect();
        let mut evicted = 0;
        for handle in pending {
            let Some(entry) = self.slots.get(handle) else {
                continue;
            };
            if entry.count.get() > 0 {
                info!("Reference swap on {:?}, resource kept", entry.key);
                continue;
            }
            if let Some(entry) = self.slots.remove(handle) {
                self.keys.remove(&entry.key);
                debug!("Resource was destroyed: {:?} (id {})", entry.key, entry.id);
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Number of live entries, including ones queued for removal
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool holds no entries
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether an entry for `key` is present
    pub fn contains(&self, key: &K) -> bool {
        self.keys.contains_key(key)
    }

    /// Number of entries waiting for the next [`update`](Self::update)
    pub fn pending_removals(&self) -> usize {
        self.removals.borrow().len()
    }
}

impl<K, R> Default for SharedResourcePool<K, R>
where
    K: Hash + Eq + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;

    use crate::error::EngineResult;
    use crate::render::vulkan::sync::{FenceFlag, FenceWaiter};

    /// Fence waiter that never blocks and records what it was asked to wait on
    #[derive(Default)]
    pub struct RecordingWaiter {
        pub waits: RefCell<Vec<FenceFlag>>,
    }

    impl FenceWaiter for RecordingWaiter {
        fn wait_fence(&self, flag: FenceFlag) -> EngineResult<()> {
            self.waits.borrow_mut().push(flag);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingWaiter;
    use super::*;
    use crate::error::EngineError;

    /// Resource that counts its own drops
    struct Tracked(Rc<Cell<usize>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn tracked_pool() -> (SharedResourcePool<String, Tracked>, Rc<Cell<usize>>) {
        (SharedResourcePool::new(), Rc::new(Cell::new(0)))
    }

    #[test]
    fn test_hit_reuses_entry() {
        let (mut pool, drops) = tracked_pool();
        let mut builds = 0;
        let a = pool
            .acquire("cube".into(), |_| {
                builds += 1;
                Ok(Tracked(Rc::clone(&drops)))
            })
            .unwrap();
        let b = pool.acquire("cube".into(), |_| unreachable!()).unwrap();

        assert_eq!(builds, 1);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.reference_count(), 2);
        assert!(std::ptr::eq(a.resource(), b.resource()));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_releasing_all_references_evicts_once() {
        let (mut pool, drops) = tracked_pool();
        let waiter = RecordingWaiter::default();
        let mut references = Vec::new();
        for _ in 0..5 {
            references.push(
                pool.acquire("sphere".into(), |_| Ok(Tracked(Rc::clone(&drops)))).unwrap(),
            );
        }
        references.push(references[0].clone());
        drop(references);

        assert_eq!(drops.get(), 0);
        assert_eq!(pool.update(&waiter).unwrap(), 1);
        assert_eq!(drops.get(), 1);
        assert!(pool.is_empty());
        assert!(!pool.contains(&"sphere".to_string()));
        assert_eq!(
            *waiter.waits.borrow(),
            vec![FenceFlag::ComputeInFlight, FenceFlag::RenderInFlight]
        );
    }

    #[test]
    fn test_reacquire_before_update_is_a_reference_swap() {
        crate::foundation::logging::init_for_tests();
        let (mut pool, drops) = tracked_pool();
        let waiter = RecordingWaiter::default();
        let first = pool.acquire("plane".into(), |_| Ok(Tracked(Rc::clone(&drops)))).unwrap();
        let id = first.id();
        drop(first);
        let second = pool.acquire("plane".into(), |_| unreachable!()).unwrap();

        assert_eq!(pool.update(&waiter).unwrap(), 0);
        assert_eq!(drops.get(), 0);
        assert_eq!(second.id(), id);

        drop(second);
        assert_eq!(pool.update(&waiter).unwrap(), 1);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_update_without_removals_skips_fences() {
        let (mut pool, drops) = tracked_pool();
        let waiter = RecordingWaiter::default();
        let _held = pool.acquire("held".into(), |_| Ok(Tracked(Rc::clone(&drops)))).unwrap();

        assert_eq!(pool.update(&waiter).unwrap(), 0);
        assert!(waiter.waits.borrow().is_empty());
    }

    #[test]
    fn test_failed_build_leaves_pool_empty() {
        let mut pool: SharedResourcePool<String, Tracked> = SharedResourcePool::new();
        let result = pool.acquire("missing".into(), |key| Err(EngineError::Asset(format!("no {key}"))));

        assert!(result.is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_reloaded_entry_gets_new_id() {
        let (mut pool, drops) = tracked_pool();
        let waiter = RecordingWaiter::default();
        let first = pool.acquire("a".into(), |_| Ok(Tracked(Rc::clone(&drops)))).unwrap().id();
        pool.update(&waiter).unwrap();
        let second = pool.acquire("a".into(), |_| Ok(Tracked(Rc::clone(&drops)))).unwrap().id();

        assert_ne!(first, second);
    }
}
