//! A shared-ownership, fail-soft map from `u32` identifiers to `u32` values.
//!
//! `IdMap` is a handle: `Clone` aliases the same storage, and the storage is
//! freed when the last handle is dropped. Mutation goes through interior
//! mutability, so an aliased map can be updated through any of its handles.
//! The map is deliberately non-atomic; sharing across threads requires
//! external serialization.
//!
//! Operations never panic on bad input. Inserting into a map whose
//! allocation failed, or through the inert handle, is a silent no-op, so
//! call sites can chain operations without checking each one.

use log::warn;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// The sentinel value meaning "no entry".
///
/// Storing it removes the key; it is also rejected as a key. Callers must
/// not rely on storing the sentinel itself.
pub const RESERVED: u32 = 0xffff_ffff;

/// A key identifying one user-data attachment on a map.
///
/// Identity is the key's allocation: clones of a key address the same
/// attachment, keys created separately never collide.
#[derive(Clone)]
pub struct UserDataKey(Rc<()>);

impl UserDataKey {
    pub fn new() -> UserDataKey {
        UserDataKey(Rc::new(()))
    }
}

impl Default for UserDataKey {
    fn default() -> UserDataKey {
        UserDataKey::new()
    }
}

#[derive(Clone)]
pub struct IdMap {
    // `None` is the inert handle
    inner: Option<Rc<RefCell<MapData>>>,
}

struct MapData {
    entries: FxHashMap<u32, u32>,
    allocation_failed: bool,
    user_data: Vec<(UserDataKey, Rc<dyn Any>)>,
}

impl MapData {
    fn new() -> MapData {
        MapData {
            entries: FxHashMap::default(),
            allocation_failed: false,
            user_data: Vec::new(),
        }
    }
}

impl IdMap {
    /// A fresh, empty map.
    pub fn new() -> IdMap {
        IdMap {
            inner: Some(Rc::new(RefCell::new(MapData::new()))),
        }
    }

    /// The inert handle: never allocated, never freed, and immune to mutation.
    ///
    /// All queries on it answer as an empty map with `allocation_ok() == false`.
    pub const fn inert() -> IdMap {
        IdMap { inner: None }
    }

    /// A map with room for `capacity` entries.
    ///
    /// Returns the inert handle when the reservation fails.
    pub fn with_capacity(capacity: usize) -> IdMap {
        let mut data = MapData::new();
        if data.entries.try_reserve(capacity).is_err() {
            warn!("failed to reserve map capacity for {} entries", capacity);
            return IdMap::inert();
        }
        IdMap {
            inner: Some(Rc::new(RefCell::new(data))),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.inner.is_none()
    }

    /// `false` on the inert handle or after a failed insertion.
    ///
    /// A failed insertion does not poison the map: the entries present
    /// before the failure are preserved and later insertions are still
    /// attempted.
    pub fn allocation_ok(&self) -> bool {
        match &self.inner {
            Some(inner) => !inner.borrow().allocation_failed,
            None => false,
        }
    }

    /// Insert or overwrite an entry.
    ///
    /// A `key` of `RESERVED` is rejected. A `value` of `RESERVED` removes the
    /// key. No-op on the inert handle and when growing the table fails.
    pub fn set(&self, key: u32, value: u32) {
        let Some(inner) = &self.inner else { return };
        if key == RESERVED {
            return;
        }
        let mut data = inner.borrow_mut();
        if value == RESERVED {
            data.entries.remove(&key);
            return;
        }
        if data.entries.try_reserve(1).is_err() {
            warn!("map insertion failed for key {}", key);
            data.allocation_failed = true;
            return;
        }
        data.entries.insert(key, value);
    }

    pub fn get(&self, key: u32) -> Option<u32> {
        let inner = self.inner.as_ref()?;
        inner.borrow().entries.get(&key).copied()
    }

    pub fn contains(&self, key: u32) -> bool {
        self.get(key).is_some()
    }

    /// Remove an entry, returning its value if it was present.
    pub fn remove(&self, key: u32) -> Option<u32> {
        let inner = self.inner.as_ref()?;
        inner.borrow_mut().entries.remove(&key)
    }

    /// Remove all entries. Identity, shared ownership, and user data are retained.
    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.borrow_mut().entries.clear();
        }
    }

    /// The number of entries in the map.
    pub fn population(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.borrow().entries.len(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.population() == 0
    }

    /// Attach `data` to the map under `key`.
    ///
    /// At most one attachment exists per key. When the key is occupied and
    /// `replace` is `false`, or on the inert handle, the attachment is left
    /// alone and `data` is handed back unchanged in the `Err`. With
    /// `replace == true` the displaced value is dropped exactly once, after
    /// the internal borrow is released, so its drop impl may re-enter the
    /// map.
    pub fn set_user_data(
        &self,
        key: &UserDataKey,
        data: Rc<dyn Any>,
        replace: bool,
    ) -> Result<(), Rc<dyn Any>> {
        let Some(inner) = &self.inner else {
            return Err(data);
        };
        let displaced;
        {
            let mut map = inner.borrow_mut();
            match map
                .user_data
                .iter_mut()
                .find(|(slot_key, _)| Rc::ptr_eq(&slot_key.0, &key.0))
            {
                Some(slot) => {
                    if !replace {
                        return Err(data);
                    }
                    displaced = Some(std::mem::replace(&mut slot.1, data));
                }
                None => {
                    map.user_data.push((key.clone(), data));
                    displaced = None;
                }
            }
        }
        drop(displaced);
        Ok(())
    }

    /// The attachment under `key`, if any.
    pub fn user_data(&self, key: &UserDataKey) -> Option<Rc<dyn Any>> {
        let inner = self.inner.as_ref()?;
        let map = inner.borrow();
        map.user_data
            .iter()
            .find(|(slot_key, _)| Rc::ptr_eq(&slot_key.0, &key.0))
            .map(|(_, data)| Rc::clone(data))
    }
}

impl Default for IdMap {
    fn default() -> IdMap {
        IdMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct DropCounter {
        drops: Rc<Cell<u32>>,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn test_set_get() {
        let map = IdMap::new();
        assert!(map.is_empty());
        assert_eq!(map.get(1), None);

        map.set(1, 10);
        map.set(2, 20);
        assert_eq!(map.get(1), Some(10));
        assert_eq!(map.get(2), Some(20));
        assert_eq!(map.population(), 2);
        assert!(!map.is_empty());

        // overwrite
        map.set(1, 11);
        assert_eq!(map.get(1), Some(11));
        assert_eq!(map.population(), 2);

        assert!(map.contains(2));
        assert!(!map.contains(3));
        assert!(map.allocation_ok());
    }

    #[test]
    fn test_with_capacity() {
        let map = IdMap::with_capacity(64);
        assert!(!map.is_inert());
        assert!(map.allocation_ok());
        map.set(1, 1);
        assert_eq!(map.population(), 1);
    }

    #[test]
    fn test_reserved_key_rejected() {
        let map = IdMap::new();
        map.set(RESERVED, 1);
        assert_eq!(map.get(RESERVED), None);
        assert_eq!(map.population(), 0);
    }

    #[test]
    fn test_reserved_value_removes_key() {
        let map = IdMap::new();
        map.set(7, 70);
        assert_eq!(map.get(7), Some(70));

        map.set(7, RESERVED);
        assert_eq!(map.get(7), None);
        assert_eq!(map.population(), 0);

        // removing an absent key this way is a no-op
        map.set(8, RESERVED);
        assert_eq!(map.population(), 0);
    }

    #[test]
    fn test_remove() {
        let map = IdMap::new();
        map.set(1, 10);
        assert_eq!(map.remove(1), Some(10));
        assert_eq!(map.remove(1), None);
        assert_eq!(map.population(), 0);
    }

    #[test]
    fn test_clear_retains_user_data() {
        let map = IdMap::new();
        let key = UserDataKey::new();
        map.set(1, 10);
        map.set_user_data(&key, Rc::new(5u32), false).unwrap();

        map.clear();
        assert_eq!(map.population(), 0);
        assert!(map.user_data(&key).is_some());

        // the cleared map is still usable
        map.set(2, 20);
        assert_eq!(map.get(2), Some(20));
    }

    // Access after the last handle is dropped is not representable, so the
    // aliasing tests only exercise live handles.
    #[test]
    fn test_clone_is_aliasing() {
        let a = IdMap::new();
        let b = a.clone();

        a.set(1, 10);
        assert_eq!(b.get(1), Some(10));

        b.set(2, 20);
        assert_eq!(a.get(2), Some(20));

        // dropping one handle leaves the other fully functional
        drop(a);
        assert_eq!(b.population(), 2);
        b.set(3, 30);
        assert_eq!(b.get(3), Some(30));
    }

    #[test]
    fn test_inert_handle() {
        let map = IdMap::inert();
        assert!(map.is_inert());
        assert!(!map.allocation_ok());
        assert!(map.is_empty());
        assert_eq!(map.population(), 0);

        // every mutation is a no-op
        map.set(1, 10);
        assert_eq!(map.get(1), None);
        assert_eq!(map.remove(1), None);
        map.clear();
        assert_eq!(map.population(), 0);

        // clones of the inert handle are themselves inert
        let other = map.clone();
        assert!(other.is_inert());
    }

    #[test]
    fn test_inert_rejects_user_data() {
        let map = IdMap::inert();
        let key = UserDataKey::new();
        let data: Rc<dyn Any> = Rc::new(1u32);
        let rejected = map.set_user_data(&key, data, true).unwrap_err();
        assert_eq!(*rejected.downcast::<u32>().unwrap(), 1);
        assert!(map.user_data(&key).is_none());
    }

    #[test]
    fn test_user_data_key_identity() {
        let map = IdMap::new();
        let key_a = UserDataKey::new();
        let key_b = UserDataKey::new();

        map.set_user_data(&key_a, Rc::new(1u32), false).unwrap();
        map.set_user_data(&key_b, Rc::new(2u32), false).unwrap();

        let a = map.user_data(&key_a).unwrap();
        assert_eq!(*a.downcast::<u32>().unwrap(), 1);

        // a cloned key addresses the same attachment
        let b = map.user_data(&key_b.clone()).unwrap();
        assert_eq!(*b.downcast::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_user_data_no_replace_preserves_existing() {
        let drops = Rc::new(Cell::new(0));
        let map = IdMap::new();
        let key = UserDataKey::new();

        map.set_user_data(&key, Rc::new(1u32), false).unwrap();
        let rejected = map
            .set_user_data(
                &key,
                Rc::new(DropCounter {
                    drops: Rc::clone(&drops),
                }),
                false,
            )
            .unwrap_err();

        // the rejected value comes back untouched
        assert_eq!(drops.get(), 0);
        drop(rejected);
        assert_eq!(drops.get(), 1);

        let existing = map.user_data(&key).unwrap();
        assert_eq!(*existing.downcast::<u32>().unwrap(), 1);
    }

    #[test]
    fn test_user_data_replace_drops_displaced_once() {
        let drops = Rc::new(Cell::new(0));
        let map = IdMap::new();
        let key = UserDataKey::new();

        map.set_user_data(
            &key,
            Rc::new(DropCounter {
                drops: Rc::clone(&drops),
            }),
            false,
        )
        .unwrap();
        assert_eq!(drops.get(), 0);

        map.set_user_data(&key, Rc::new(2u32), true).unwrap();
        assert_eq!(drops.get(), 1);

        let current = map.user_data(&key).unwrap();
        assert_eq!(*current.downcast::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_user_data_drop_may_reenter_map() {
        struct Reentrant {
            map: IdMap,
        }

        impl Drop for Reentrant {
            fn drop(&mut self) {
                self.map.set(9, 90);
            }
        }

        let map = IdMap::new();
        let key = UserDataKey::new();
        map.set_user_data(&key, Rc::new(Reentrant { map: map.clone() }), false)
            .unwrap();

        // displacing the value runs its drop, which mutates the map
        map.set_user_data(&key, Rc::new(0u32), true).unwrap();
        assert_eq!(map.get(9), Some(90));
    }
}
