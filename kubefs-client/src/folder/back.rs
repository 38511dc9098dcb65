use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{Coords, Folder, Item, Listing, Phase};

/// Prepends a `..` row to another folder's listing and forwards everything else.
pub struct WithBack {
    inner: Arc<dyn Folder>,
    back: Arc<Item>,
    /// Inner snapshot and the decorated one built from it.
    cache: Mutex<Option<(Arc<Listing>, Arc<Listing>)>>,
}

impl WithBack {
    pub fn new(inner: Arc<dyn Folder>, parent_path: impl Into<String>) -> Self {
        Self {
            inner,
            back: Arc::new(Item::back(parent_path)),
            cache: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &Arc<dyn Folder> {
        &self.inner
    }
}

#[async_trait]
impl Folder for WithBack {
    fn path(&self) -> &str {
        self.inner.path()
    }

    fn context(&self) -> &str {
        self.inner.context()
    }

    fn key(&self) -> String {
        self.inner.key()
    }

    fn coords(&self) -> Option<Coords> {
        self.inner.coords()
    }

    fn phase(&self) -> Phase {
        self.inner.phase()
    }

    fn mark_dirty(&self) {
        self.inner.mark_dirty();
    }

    async fn listing(&self) -> Arc<Listing> {
        let inner = self.inner.listing().await;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((seen, decorated)) = cache.as_ref() {
            if Arc::ptr_eq(seen, &inner) {
                return decorated.clone();
            }
        }

        let mut items = Vec::with_capacity(inner.items.as_slice().len() + 1);
        items.push(self.back.clone());
        items.extend(inner.items.iter().cloned());
        let decorated = Arc::new(Listing::new(inner.columns.clone(), items));
        *cache = Some((inner, decorated.clone()));
        decorated
    }
}
