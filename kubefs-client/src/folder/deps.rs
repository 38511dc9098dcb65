use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cluster::{Cluster, ContextSource};
use crate::error::{Error, Result};
use crate::registry::ChildRegistry;
use crate::structs::ViewOptions;

pub type ViewFn = Arc<dyn Fn() -> ViewOptions + Send + Sync>;

/// Everything a folder needs from the outside, shared by every folder of one
/// context. Assembled once with the `with_*` builders, then frozen in an `Arc`.
#[derive(Clone)]
pub struct Deps {
    pub cluster: Arc<dyn Cluster>,
    pub cancel: CancellationToken,
    pub context: String,
    pub view: ViewFn,
    pub contexts: Option<Arc<dyn ContextSource>>,
    pub registry: Arc<ChildRegistry>,
}

impl Deps {
    pub fn new(cluster: Arc<dyn Cluster>, context: impl Into<String>) -> Self {
        Self {
            cluster,
            cancel: CancellationToken::new(),
            context: context.into(),
            view: Arc::new(ViewOptions::default),
            contexts: None,
            registry: Arc::new(ChildRegistry::with_defaults()),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_view<F>(mut self, view: F) -> Self
    where
        F: Fn() -> ViewOptions + Send + Sync + 'static,
    {
        self.view = Arc::new(view);
        self
    }

    pub fn with_contexts(mut self, contexts: Arc<dyn ContextSource>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ChildRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Same registry, view and cancellation over another cluster. Alternate
    /// contexts are only offered from the first root.
    pub fn for_cluster(&self, cluster: Arc<dyn Cluster>, context: impl Into<String>) -> Self {
        Self {
            cluster,
            cancel: self.cancel.child_token(),
            context: context.into(),
            view: self.view.clone(),
            contexts: None,
            registry: self.registry.clone(),
        }
    }

    pub fn view_options(&self) -> ViewOptions {
        (self.view)()
    }

    /// Runs `fut` unless the request scope is cancelled first.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            res = fut => res,
        }
    }
}

impl std::fmt::Debug for Deps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deps")
            .field("context", &self.context)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("contexts", &self.contexts.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}
