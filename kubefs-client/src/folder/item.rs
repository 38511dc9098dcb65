use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::count::LazyCount;
use super::Folder;
use crate::error::Result;
use crate::listview::Identified;
use crate::utils::{age_cell, strip_glyph, Cell};

/// Opens the folder behind a row.
#[async_trait]
pub trait Enter: Send + Sync {
    async fn enter(&self) -> Option<Arc<dyn Folder>>;
}

/// Renders the content behind a row.
#[async_trait]
pub trait View: Send + Sync {
    async fn view(&self) -> Result<String>;
}

/// Cells appended at display time rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trailing {
    #[default]
    None,
    /// Age since `created`.
    Age,
    /// The lazy count, blank until known.
    Count,
}

/// The object a row stands for, for actions taken outside the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// One row of a folder listing. Capabilities are fixed when the row is built.
pub struct Item {
    pub id: String,
    pub name: String,
    pub cells: Vec<Cell>,
    pub created: Option<DateTime<Utc>>,
    pub trailing: Trailing,
    pub path: String,
    pub details: String,
    pub object: Option<ObjectRef>,
    pub is_back: bool,
    enter: Option<Arc<dyn Enter>>,
    view: Option<Arc<dyn View>>,
    count: Option<Arc<LazyCount>>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cells: Vec::new(),
            created: None,
            trailing: Trailing::None,
            path: path.into(),
            details: String::new(),
            object: None,
            is_back: false,
            enter: None,
            view: None,
            count: None,
        }
    }

    /// The `..` row leading to `parent_path`.
    pub fn back(parent_path: impl Into<String>) -> Self {
        let mut item = Self::new("..", "..", parent_path);
        item.cells = vec![Cell::new("..")];
        item.is_back = true;
        item
    }

    pub fn with_cells(mut self, cells: Vec<Cell>) -> Self {
        self.cells = cells;
        self
    }

    pub fn with_age(mut self, created: Option<DateTime<Utc>>) -> Self {
        self.created = created;
        self.trailing = Trailing::Age;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_object(mut self, object: ObjectRef) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_enter(mut self, enter: Arc<dyn Enter>) -> Self {
        self.enter = Some(enter);
        self
    }

    pub fn with_view(mut self, view: Arc<dyn View>) -> Self {
        self.view = Some(view);
        self
    }

    /// Reserves the trailing count cell; `count` fills it once known.
    pub fn with_count(mut self, count: Option<Arc<LazyCount>>) -> Self {
        self.count = count;
        self.trailing = Trailing::Count;
        self
    }

    pub fn display_name(&self) -> &str {
        strip_glyph(&self.name)
    }

    /// Stored cells plus the trailing computed one, if any.
    pub fn display_cells(&self, now: DateTime<Utc>) -> Vec<Cell> {
        let mut cells = self.cells.clone();
        match self.trailing {
            Trailing::None => {}
            Trailing::Age => cells.push(age_cell(self.created, now)),
            Trailing::Count => cells.push(Cell::new(
                self.count
                    .as_ref()
                    .and_then(|c| c.peek())
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
            )),
        }
        cells
    }

    pub fn is_enterable(&self) -> bool {
        self.enter.is_some()
    }

    pub fn is_viewable(&self) -> bool {
        self.view.is_some()
    }

    pub async fn enter(&self) -> Option<Arc<dyn Folder>> {
        match &self.enter {
            Some(enter) => enter.enter().await,
            None => None,
        }
    }

    /// `None` when the row has nothing to show.
    pub async fn view(&self) -> Option<Result<String>> {
        match &self.view {
            Some(view) => Some(view.view().await),
            None => None,
        }
    }

    pub fn count(&self) -> Option<&Arc<LazyCount>> {
        self.count.as_ref()
    }
}

impl Identified for Item {
    fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("cells", &self.cells)
            .field("enter", &self.enter.is_some())
            .field("view", &self.view.is_some())
            .field("count", &self.count.is_some())
            .finish()
    }
}
