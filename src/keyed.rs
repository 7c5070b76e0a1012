//! Ordered list with a case-insensitive name index.

use indexmap::IndexMap;

/// Items stored in a [`KeyedList`]
pub trait NamedItem {
    fn name(&self) -> &str;
}

/// Insertion-ordered list where adding an item whose name already exists
/// replaces the old item at its index
#[derive(Debug, Clone)]
pub struct KeyedList<T> {
    items: IndexMap<String, T>,
}

impl<T> Default for KeyedList<T> {
    fn default() -> Self {
        Self {
            items: IndexMap::new(),
        }
    }
}

impl<T: NamedItem> KeyedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace; returns the previous item with the same name.
    /// Items with an empty name are ignored.
    pub fn add(&mut self, item: T) -> Option<T> {
        let key = item.name().to_lowercase();
        if key.is_empty() {
            return None;
        }
        self.items.insert(key, item)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.get(&name.to_lowercase())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.items.get_mut(&name.to_lowercase())
    }

    pub fn get_index(&self, index: usize) -> Option<&T> {
        self.items.get_index(index).map(|(_, item)| item)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.get_index_of(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(&name.to_lowercase())
    }

    /// Remove by name, keeping the order of the remaining items
    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.items.shift_remove(&name.to_lowercase())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Item(&'static str, u32);

    impl NamedItem for Item {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_replace_in_place() {
        let mut list = KeyedList::new();
        list.add(Item("A", 1));
        list.add(Item("B", 2));
        list.add(Item("C", 3));

        let old = list.add(Item("b", 20));
        assert_eq!(old, Some(Item("B", 2)));
        assert_eq!(list.len(), 3);
        assert_eq!(list.index_of("B"), Some(1));
        assert_eq!(list.get_index(1), Some(&Item("b", 20)));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut list = KeyedList::new();
        list.add(Item("A", 1));
        list.add(Item("B", 2));
        list.add(Item("C", 3));
        list.add(Item("", 4));

        assert_eq!(list.len(), 3);
        assert!(list.remove("a").is_some());
        assert_eq!(list.index_of("C"), Some(1));
        assert!(!list.contains("A"));
    }
}
