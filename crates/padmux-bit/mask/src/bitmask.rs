use std::marker::PhantomData;

use crate::Bitable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bitmask<T: Bitable>(pub u64, PhantomData<T>);

impl<T: Bitable> Default for Bitmask<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Bitable> Bitmask<T> {
    /// Create a new bitmask from a slice of values.
    pub fn new(values: &[T]) -> Self {
        let bits = values.iter().fold(0, |acc, v| acc | v.bit());
        Self(bits, PhantomData)
    }

    /// Create an empty bitmask.
    pub const fn empty() -> Self {
        Self(0, PhantomData)
    }

    /// Create a new bitmask from a raw value.
    pub const fn from_value(value: u64) -> Self {
        Self(value, PhantomData)
    }

    /// Raw bits.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn contains(&self, bit: T) -> bool {
        (self.0 & bit.bit()) != 0
    }

    #[inline]
    pub fn insert(&mut self, bit: T) {
        self.0 |= bit.bit();
    }

    #[inline]
    pub fn remove(&mut self, bit: T) {
        self.0 &= !bit.bit();
    }

    /// Set or clear a value depending on `on`.
    #[inline]
    pub fn set(&mut self, bit: T, on: bool) {
        if on {
            self.insert(bit);
        } else {
            self.remove(bit);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check if the bitmask is subset of another bitmask.
    #[inline]
    pub fn is_subset(&self, other: &Bitmask<T>) -> bool {
        self.0 & other.0 == self.0
    }

    /// Check if the bitmask is superset of another bitmask.
    #[inline]
    pub fn is_superset(&self, other: &Bitmask<T>) -> bool {
        other.is_subset(self)
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    #[inline]
    #[must_use]
    pub const fn union(self, other: Bitmask<T>) -> Self {
        Self(self.0 | other.0, PhantomData)
    }

    #[inline]
    #[must_use]
    pub const fn intersection(self, other: Bitmask<T>) -> Self {
        Self(self.0 & other.0, PhantomData)
    }

    /// Bits of `self` that are not in `other`.
    #[inline]
    #[must_use]
    pub const fn without(self, other: Bitmask<T>) -> Self {
        Self(self.0 & !other.0, PhantomData)
    }

    /// Iterate over the set values in declaration order.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            mask: *self,
            pos: 0,
        }
    }
}

impl<T: Bitable> FromIterator<T> for Bitmask<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut mask = Self::empty();
        for v in iter {
            mask.insert(v);
        }
        mask
    }
}

pub struct Iter<T: Bitable> {
    mask: Bitmask<T>,
    pos: usize,
}

impl<T: Bitable> Iterator for Iter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while let Some(v) = T::ALL.get(self.pos) {
            self.pos += 1;
            if self.mask.contains(*v) {
                return Some(*v);
            }
        }
        None
    }
}
