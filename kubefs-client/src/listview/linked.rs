use std::collections::HashMap;

use super::{Identified, ListView};

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: Option<String>,
    next: Option<String>,
}

/// Doubly-linked list keyed by id, for incremental updates that touch a few
/// rows without rebuilding the rest.
#[derive(Debug, Clone)]
pub struct LinkedList<T> {
    nodes: HashMap<String, Node<T>>,
    head: Option<String>,
    tail: Option<String>,
}

impl<T> Default for LinkedList<T> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            head: None,
            tail: None,
        }
    }
}

impl<T: Identified> LinkedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn push_back(&mut self, value: T) -> bool {
        match self.tail.clone() {
            Some(tail) => self.insert_after(&tail, value),
            None => self.insert_first(value),
        }
    }

    pub fn push_front(&mut self, value: T) -> bool {
        match self.head.clone() {
            Some(head) => self.insert_before(&head, value),
            None => self.insert_first(value),
        }
    }

    /// Appends in order; ids already present are skipped.
    pub fn append(&mut self, values: Vec<T>) {
        for value in values {
            self.push_back(value);
        }
    }

    /// Prepends keeping the given order, so `values[0]` becomes the new head.
    pub fn prepend(&mut self, values: Vec<T>) {
        for value in values.into_iter().rev() {
            self.push_front(value);
        }
    }

    /// Returns false when the anchor is missing or the id already exists.
    pub fn insert_before(&mut self, anchor: &str, value: T) -> bool {
        let id = value.id().to_string();
        if self.nodes.contains_key(&id) {
            return false;
        }
        let prev = match self.nodes.get(anchor) {
            Some(node) => node.prev.clone(),
            None => return false,
        };
        self.link(id, value, prev, Some(anchor.to_string()));
        true
    }

    /// Returns false when the anchor is missing or the id already exists.
    pub fn insert_after(&mut self, anchor: &str, value: T) -> bool {
        let id = value.id().to_string();
        if self.nodes.contains_key(&id) {
            return false;
        }
        let next = match self.nodes.get(anchor) {
            Some(node) => node.next.clone(),
            None => return false,
        };
        self.link(id, value, Some(anchor.to_string()), next);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let node = self.nodes.remove(id)?;
        match &node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes.get_mut(prev) {
                    p.next = node.next.clone();
                }
            }
            None => self.head = node.next.clone(),
        }
        match &node.next {
            Some(next) => {
                if let Some(n) = self.nodes.get_mut(next) {
                    n.prev = node.prev.clone();
                }
            }
            None => self.tail = node.prev.clone(),
        }
        Some(node.value)
    }

    /// Swaps the value stored under the same id, keeping its position.
    pub fn replace(&mut self, value: T) -> Option<T> {
        let node = self.nodes.get_mut(value.id())?;
        Some(std::mem::replace(&mut node.value, value))
    }

    fn insert_first(&mut self, value: T) -> bool {
        let id = value.id().to_string();
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.link(id, value, None, None);
        true
    }

    fn link(&mut self, id: String, value: T, prev: Option<String>, next: Option<String>) {
        match &prev {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(p) {
                    node.next = Some(id.clone());
                }
            }
            None => self.head = Some(id.clone()),
        }
        match &next {
            Some(n) => {
                if let Some(node) = self.nodes.get_mut(n) {
                    node.prev = Some(id.clone());
                }
            }
            None => self.tail = Some(id.clone()),
        }
        self.nodes.insert(id, Node { value, prev, next });
    }

    fn walk<'a>(
        &'a self,
        start: Option<&'a String>,
        forward: bool,
    ) -> impl Iterator<Item = &'a Node<T>> + 'a {
        let mut cursor = start.and_then(|id| self.nodes.get(id));
        std::iter::from_fn(move || {
            let node = cursor?;
            let step = if forward { &node.next } else { &node.prev };
            cursor = step.as_ref().and_then(|id| self.nodes.get(id));
            Some(node)
        })
    }
}

impl<T: Identified + Clone> ListView<T> for LinkedList<T> {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn lines(&self, offset: usize, count: usize) -> Vec<T> {
        self.walk(self.head.as_ref(), true)
            .skip(offset)
            .take(count)
            .map(|n| n.value.clone())
            .collect()
    }

    fn above(&self, id: &str, count: usize) -> Vec<T> {
        let Some(anchor) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut rows: Vec<T> = self
            .walk(anchor.prev.as_ref(), false)
            .take(count)
            .map(|n| n.value.clone())
            .collect();
        rows.reverse();
        rows
    }

    fn below(&self, id: &str, count: usize) -> Vec<T> {
        let Some(anchor) = self.nodes.get(id) else {
            return Vec::new();
        };
        self.walk(anchor.next.as_ref(), true)
            .take(count)
            .map(|n| n.value.clone())
            .collect()
    }

    fn find(&self, id: &str) -> Option<T> {
        self.nodes.get(id).map(|n| n.value.clone())
    }
}
