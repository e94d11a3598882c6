//! PosterForge Core Library
//!
//! Platform-agnostic editing-session engine for the PosterForge design editor:
//! the scene graph arena, undo/redo history, layer model, magnetic alignment
//! and the page/project model the export pipeline drives.

pub mod config;
pub mod editor;
pub mod events;
pub mod history;
pub mod layers;
pub mod pages;
pub mod scene;
pub mod scheduler;
pub mod snap;
pub mod storage;
pub mod store;
pub mod thumbnail;
pub mod viewport;

pub use config::{ConfigError, EditorConfig};
pub use editor::{EditorSession, EditorStatus, InsertRequest, TickReport};
pub use events::{EventBus, Mailbox, Subscription};
pub use history::History;
pub use layers::{Layer, LayerManager};
pub use pages::{Page, Project};
pub use scene::{
    ObjectData, ObjectId, ObjectKind, Rgba, Scene, SceneError, SceneEvent, SceneObject, Transform,
};
pub use snap::{DragState, GuideLines, SnapEngine, SnapResult};
pub use storage::{PersistRecord, PersistenceSink, RecordLog};
pub use store::Store;
pub use thumbnail::{Thumbnail, ThumbnailError, Thumbnailer};
pub use viewport::Viewport;
