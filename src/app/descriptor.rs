//! What the host tells the monitor about one application.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Receives the coalesced decision for one application.
pub trait UpdateHandler: Send + Sync {
    /// Called once per debounce window; `is_remove` is true when the
    /// application's content disappeared.
    fn handle_update(&self, is_remove: bool);
}

impl<F> UpdateHandler for F
where
    F: Fn(bool) + Send + Sync,
{
    fn handle_update(&self, is_remove: bool) {
        self(is_remove)
    }
}

/// Hot redefinition of changed classes.
pub trait Redefiner: Send + Sync {
    /// Try to redefine every modified path in place.
    ///
    /// Returns true only if all of them were redefined, in which case the
    /// application does not need a restart.
    fn redefine(&self, modified: &BTreeSet<PathBuf>) -> bool;
}

impl<F> Redefiner for F
where
    F: Fn(&BTreeSet<PathBuf>) -> bool + Send + Sync,
{
    fn redefine(&self, modified: &BTreeSet<PathBuf>) -> bool {
        self(modified)
    }
}

/// Describes an application to monitor.
///
/// # Examples
///
/// ```rust
/// use app_monitor::app::AppDescriptor;
///
/// let descriptor = AppDescriptor::new("shop", |is_remove: bool| {
///     println!("shop changed, removed = {is_remove}");
/// })
/// .with_content_root("/srv/apps/shop.war")
/// .with_target("WEB-INF/classes");
///
/// assert_eq!(descriptor.id(), "shop");
/// assert_eq!(descriptor.targets().len(), 1);
/// ```
#[derive(Clone)]
pub struct AppDescriptor {
    id: String,
    content_root: Option<PathBuf>,
    targets: Vec<PathBuf>,
    watch_root_structure: bool,
    handler: Arc<dyn UpdateHandler>,
    redefiner: Option<Arc<dyn Redefiner>>,
}

impl AppDescriptor {
    /// Describe application `id`, reporting decisions to `handler`.
    pub fn new(id: impl Into<String>, handler: impl UpdateHandler + 'static) -> Self {
        Self::with_handler(id, Arc::new(handler))
    }

    /// Like [`AppDescriptor::new`] with an already shared handler.
    pub fn with_handler(id: impl Into<String>, handler: Arc<dyn UpdateHandler>) -> Self {
        Self {
            id: id.into(),
            content_root: None,
            targets: Vec::new(),
            watch_root_structure: false,
            handler,
            redefiner: None,
        }
    }

    /// The file or directory holding the application's content.
    pub fn with_content_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.content_root = Some(root.into());
        self
    }

    /// Monitor a path relative to the content root for content changes.
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Report files added to or removed from the top of the content root.
    pub fn watch_root_structure(mut self, enabled: bool) -> Self {
        self.watch_root_structure = enabled;
        self
    }

    /// Let content listeners skip restarts for redefinable changes.
    pub fn with_redefiner(mut self, redefiner: impl Redefiner + 'static) -> Self {
        self.redefiner = Some(Arc::new(redefiner));
        self
    }

    /// The application id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The content root, if the application has one on disk.
    pub fn content_root(&self) -> Option<&Path> {
        self.content_root.as_deref()
    }

    /// Explicitly monitored paths, relative to the content root.
    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    /// Whether structural changes at the top of the root are reported.
    pub fn watches_root_structure(&self) -> bool {
        self.watch_root_structure
    }

    pub(crate) fn handler(&self) -> Arc<dyn UpdateHandler> {
        Arc::clone(&self.handler)
    }

    pub(crate) fn redefiner(&self) -> Option<Arc<dyn Redefiner>> {
        self.redefiner.clone()
    }
}

impl std::fmt::Debug for AppDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppDescriptor")
            .field("id", &self.id)
            .field("content_root", &self.content_root)
            .field("targets", &self.targets)
            .field("watch_root_structure", &self.watch_root_structure)
            .field("redefiner", &self.redefiner.is_some())
            .finish_non_exhaustive()
    }
}
