//! Multi-page projects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One page of a project. Only the active page's scene is live; the others
/// are kept as snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub width: f64,
    pub height: f64,
    /// Scene snapshot, empty for a page that was never edited.
    #[serde(default)]
    pub canvas_data: String,
}

impl Page {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            width,
            height,
            canvas_data: String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.canvas_data.is_empty()
    }
}

/// A named, persisted set of pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub pages: Vec<Page>,
    #[serde(default)]
    pub active_page: usize,
}

impl Default for Project {
    fn default() -> Self {
        Self::new("Untitled", 1080.0, 1080.0)
    }
}

impl Project {
    /// A project with a single blank page.
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            pages: vec![Page::new(width, height)],
            active_page: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    pub fn active(&self) -> Option<&Page> {
        self.pages.get(self.active_page)
    }

    pub fn active_mut(&mut self) -> Option<&mut Page> {
        self.pages.get_mut(self.active_page)
    }

    /// Append a blank page and return its index.
    pub fn add_page(&mut self, width: f64, height: f64) -> usize {
        self.pages.push(Page::new(width, height));
        self.pages.len() - 1
    }

    /// Remove a page. The last remaining page cannot be removed.
    pub fn remove_page(&mut self, index: usize) -> Option<Page> {
        if self.pages.len() <= 1 || index >= self.pages.len() {
            return None;
        }
        let page = self.pages.remove(index);
        if self.active_page > index || self.active_page >= self.pages.len() {
            self.active_page = self.active_page.saturating_sub(1);
        }
        Some(page)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a project, clamping a stale active page index.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut project: Self = serde_json::from_str(json)?;
        if project.active_page >= project.pages.len() {
            project.active_page = project.pages.len().saturating_sub(1);
        }
        Ok(project)
    }
}
