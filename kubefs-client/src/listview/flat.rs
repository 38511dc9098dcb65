use std::collections::HashMap;

use super::{Identified, ListView};

/// Vector backed list, rebuilt wholesale on every populate.
#[derive(Debug, Clone)]
pub struct FlatList<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for FlatList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Identified> FlatList<T> {
    /// Later duplicates of an id are dropped so every id maps to one position.
    pub fn new(items: Vec<T>) -> Self {
        let mut index = HashMap::with_capacity(items.len());
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if index.contains_key(item.id()) {
                tracing::debug!(id = item.id(), "dropping duplicate row id");
                continue;
            }
            index.insert(item.id().to_string(), kept.len());
            kept.push(item);
        }
        Self { items: kept, index }
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Identified + Clone> ListView<T> for FlatList<T> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn lines(&self, offset: usize, count: usize) -> Vec<T> {
        self.items.iter().skip(offset).take(count).cloned().collect()
    }

    fn above(&self, id: &str, count: usize) -> Vec<T> {
        match self.position(id) {
            Some(idx) => self.items[idx.saturating_sub(count)..idx].to_vec(),
            None => Vec::new(),
        }
    }

    fn below(&self, id: &str, count: usize) -> Vec<T> {
        match self.position(id) {
            Some(idx) => {
                let end = (idx + 1).saturating_add(count).min(self.items.len());
                self.items[idx + 1..end].to_vec()
            }
            None => Vec::new(),
        }
    }

    fn find(&self, id: &str) -> Option<T> {
        self.position(id).map(|idx| self.items[idx].clone())
    }
}
