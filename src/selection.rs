//! Order-preserving selection over a record collection.

/// An ordered subset of a list's records.
///
/// Relative order always matches the parent collection: selecting a record
/// inserts it at the position implied by where it sits among the records
/// that are already selected. Entries that point at since-evicted records
/// are deliberately not pruned here; callers reconcile after a list refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<T> {
    items: Vec<T>,
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Selection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone + PartialEq> Selection<T> {
    pub fn is_selected(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Add `item`, placed according to the parent record order. Selecting an
    /// already-selected item is a no-op.
    pub fn select(&mut self, parent: &[T], item: &T) {
        if self.is_selected(item) {
            return;
        }
        let mut position = 0;
        for record in parent {
            if record == item {
                break;
            }
            if self.items.contains(record) {
                position += 1;
            }
        }
        self.items.insert(position.min(self.items.len()), item.clone());
    }

    /// Remove `item` by equality; absent items are ignored.
    pub fn deselect(&mut self, item: &T) {
        if let Some(index) = self.items.iter().position(|i| i == item) {
            self.items.remove(index);
        }
    }

    pub fn toggle(&mut self, parent: &[T], item: &T) {
        if self.is_selected(item) {
            self.deselect(item);
        } else {
            self.select(parent, item);
        }
    }

    /// Mirror the parent collection wholesale.
    pub fn select_all(&mut self, parent: &[T]) {
        self.items = parent.to_vec();
    }
}
