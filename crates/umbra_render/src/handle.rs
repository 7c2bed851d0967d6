//! Generational handles for device resources
//!
//! Every GPU object created through a [`RenderDevice`](crate::RenderDevice)
//! is referred to by a typed `Handle<T>`. A handle packs a 24-bit slot index
//! with an 8-bit generation, so a handle that outlives its resource is
//! detected as stale instead of aliasing whatever reuses the slot.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// A typed reference to a device resource
#[repr(transparent)]
pub struct Handle<T> {
    /// Lower 24 bits: index, upper 8 bits: generation
    bits: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Maximum slot index (24 bits)
    pub const MAX_INDEX: u32 = (1 << 24) - 1;

    #[inline]
    pub const fn new(index: u32, generation: u8) -> Self {
        debug_assert!(index <= Self::MAX_INDEX);
        Self {
            bits: (generation as u32) << 24 | index,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits & Self::MAX_INDEX
    }

    #[inline]
    pub const fn generation(&self) -> u8 {
        (self.bits >> 24) as u8
    }

    /// Raw bits, for backends that key native objects by integer
    #[inline]
    pub const fn to_bits(&self) -> u32 {
        self.bits
    }
}

impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = core::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{}({}v{})", short, self.index(), self.generation())
    }
}

struct Slot<V> {
    generation: u8,
    value: Option<V>,
}

/// Slot storage addressed by `Handle<M>`
///
/// `M` is the public marker type of the handle, `V` the record the owner
/// keeps per resource. Freed slots are recycled with a bumped generation.
pub struct ResourcePool<M, V> {
    slots: Vec<Slot<V>>,
    free: Vec<u32>,
    live: usize,
    _marker: PhantomData<fn() -> M>,
}

impl<M, V> ResourcePool<M, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _marker: PhantomData,
        }
    }

    /// Store a value and hand out a handle to it
    pub fn insert(&mut self, value: V) -> Handle<M> {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        assert!(index <= Handle::<M>::MAX_INDEX, "resource pool exhausted");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    /// Remove a value; returns `None` for stale or unknown handles
    pub fn remove(&mut self, handle: Handle<M>) -> Option<V> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.live -= 1;
        Some(value)
    }

    pub fn get(&self, handle: Handle<M>) -> Option<&V> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<M>) -> Option<&mut V> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: Handle<M>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl<M, V> Default for ResourcePool<M, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Marker {}

    #[test]
    fn test_insert_and_get() {
        let mut pool: ResourcePool<Marker, &str> = ResourcePool::new();
        let a = pool.insert("a");
        let b = pool.insert("b");

        assert_ne!(a, b);
        assert_eq!(pool.get(a), Some(&"a"));
        assert_eq!(pool.get(b), Some(&"b"));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut pool: ResourcePool<Marker, u32> = ResourcePool::new();
        let first = pool.insert(1);
        assert_eq!(pool.remove(first), Some(1));

        let second = pool.insert(2);
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);

        assert!(pool.get(first).is_none());
        assert!(pool.remove(first).is_none());
        assert_eq!(pool.get(second), Some(&2));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_handle_packing() {
        let handle: Handle<Marker> = Handle::new(42, 7);
        assert_eq!(handle.index(), 42);
        assert_eq!(handle.generation(), 7);
        assert!(format!("{:?}", handle).contains("42v7"));
    }
}
