//! Stack of entered folders plus the row selected in each.

use std::collections::HashMap;
use std::sync::Arc;

use crate::folder::Folder;

pub struct Frame {
    pub folder: Arc<dyn Folder>,
    pub selection: Option<String>,
}

/// The root frame is never popped.
pub struct Navigator {
    frames: Vec<Frame>,
    /// Last selection per [`Folder::key`], restored when a folder is entered again.
    remembered: HashMap<String, String>,
}

impl Navigator {
    pub fn new(root: Arc<dyn Folder>) -> Self {
        Self {
            frames: vec![Frame {
                folder: root,
                selection: None,
            }],
            remembered: HashMap::new(),
        }
    }

    #[tracing::instrument(skip_all, fields(path = %folder.path()))]
    pub fn push(&mut self, folder: Arc<dyn Folder>) {
        let selection = self.remembered.get(&folder.key()).cloned();
        self.frames.push(Frame { folder, selection });
    }

    /// Pops the top frame and returns the folder now on top. At the root
    /// nothing is popped.
    pub fn back(&mut self) -> Arc<dyn Folder> {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
        self.current()
    }

    pub fn set_selection_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        let key = self.top().folder.key();
        self.remembered.insert(key, id.clone());
        self.top_mut().selection = Some(id);
    }

    pub fn current_selection_id(&self) -> Option<&str> {
        self.top().selection.as_deref()
    }

    pub fn current(&self) -> Arc<dyn Folder> {
        self.top().folder.clone()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Marks every folder on the stack dirty.
    pub fn invalidate(&self) {
        for frame in &self.frames {
            frame.folder.mark_dirty();
        }
    }

    /// Display path built from the rows selected on the way down. Falls back
    /// to the top folder's own path when nothing was selected below it.
    pub async fn path(&self) -> String {
        let below = &self.frames[..self.frames.len() - 1];
        let mut segments = Vec::with_capacity(below.len());
        for frame in below {
            let Some(id) = frame.selection.as_deref() else {
                continue;
            };
            match frame.folder.item_by_id(id).await {
                Some(item) if !item.is_back => segments.push(item.display_name().to_string()),
                _ => {}
            }
        }
        if segments.is_empty() {
            return self.top().folder.path().to_string();
        }
        format!("/{}", segments.join("/"))
    }

    fn top(&self) -> &Frame {
        // never empty: the root frame stays
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<&str> = self.frames.iter().map(|fr| fr.folder.path()).collect();
        f.debug_struct("Navigator")
            .field("frames", &paths)
            .field("selection", &self.current_selection_id())
            .finish()
    }
}
