/// A slot in the slab: either a live value or a link in the free list.
enum Entry<T> {
    Occupied(T),
    Vacant(Option<usize>),
}

/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous vector and
/// returns small indices that are reused after removal.
///
/// Vacant slots form an intrusive free list, so both insertion and
/// removal are `O(1)`. Indices are only meaningful until the value is
/// removed; a later insertion may hand the same index out again.
pub(crate) struct Slab<T> {
    /// Storage for items and free-list links.
    entries: Vec<Entry<T>>,
    /// Head of the free list.
    next_free: Option<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates an empty slab with room for `capacity` values before reallocating.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            next_free: None,
            len: 0,
        }
    }

    /// Inserts a value and returns its index.
    ///
    /// A vacant slot is reused when available; otherwise the slab grows.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        self.len += 1;

        match self.next_free {
            Some(index) => {
                let Entry::Vacant(next) = self.entries[index] else {
                    unreachable!("free list points at an occupied slot");
                };
                self.next_free = next;
                self.entries[index] = Entry::Occupied(item);
                index
            }
            None => {
                self.entries.push(Entry::Occupied(item));
                self.entries.len() - 1
            }
        }
    }

    /// Removes and returns the value stored at `index`, if any.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let slot = self.entries.get_mut(index)?;

        if matches!(slot, Entry::Vacant(_)) {
            return None;
        }

        let Entry::Occupied(item) = std::mem::replace(slot, Entry::Vacant(self.next_free)) else {
            unreachable!();
        };

        self.next_free = Some(index);
        self.len -= 1;

        Some(item)
    }

    /// Number of live values.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }
}
