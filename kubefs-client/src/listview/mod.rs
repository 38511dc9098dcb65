//! Windowed access to ordered rows.
//!
//! A viewport never needs the whole list: it asks for a window starting at an
//! offset, or for the rows adjacent to the one it has selected. Both backings
//! keep an identity index so `find` and the anchor lookups are O(1).

mod flat;
mod linked;

pub use flat::FlatList;
pub use linked::LinkedList;

use std::sync::Arc;

/// Anything addressable by a stable id.
pub trait Identified {
    fn id(&self) -> &str;
}

impl<T: Identified + ?Sized> Identified for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }
}

pub trait ListView<T> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `count` rows starting at `offset`.
    fn lines(&self, offset: usize, count: usize) -> Vec<T>;

    /// Up to `count` rows directly before `id`, excluding it, in list order.
    fn above(&self, id: &str, count: usize) -> Vec<T>;

    /// Up to `count` rows directly after `id`, excluding it, in list order.
    fn below(&self, id: &str, count: usize) -> Vec<T>;

    fn find(&self, id: &str) -> Option<T>;
}
