//! An opened cluster: the navigator and the view options its folders read.

use std::sync::{Arc, PoisonError, RwLock};

use crate::navigator::Navigator;
use crate::structs::ViewOptions;

/// View options shared by every folder of a session. Folders read them on
/// each populate; writers go through [`Session::update_view`] so the stack
/// gets refreshed.
#[derive(Debug, Clone, Default)]
pub struct SharedView(Arc<RwLock<ViewOptions>>);

impl SharedView {
    pub fn new(view: ViewOptions) -> Self {
        Self(Arc::new(RwLock::new(view)))
    }

    pub fn get(&self) -> ViewOptions {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut ViewOptions)) {
        let mut view = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut view);
    }

    /// Reader for [`crate::Deps::with_view`].
    pub fn reader(&self) -> impl Fn() -> ViewOptions + Send + Sync + 'static {
        let view = self.clone();
        move || view.get()
    }
}

pub struct Session {
    navigator: Navigator,
    view: SharedView,
}

impl Session {
    /// `view` must be the one the navigator's folders read.
    pub fn new(navigator: Navigator, view: SharedView) -> Self {
        Self { navigator, view }
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator {
        &mut self.navigator
    }

    pub fn view(&self) -> ViewOptions {
        self.view.get()
    }

    /// Applies `f` to the view options and marks every open folder dirty, so
    /// the next read lists with the new options.
    #[tracing::instrument(skip_all)]
    pub fn update_view(&mut self, f: impl FnOnce(&mut ViewOptions)) {
        self.view.update(f);
        self.navigator.invalidate();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("navigator", &self.navigator)
            .field("view", &self.view.get())
            .finish()
    }
}
