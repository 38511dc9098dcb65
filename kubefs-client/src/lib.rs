//! A Kubernetes cluster browsed as nested folders: contexts, kinds, objects
//! and the synthetic listings below them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub mod cluster;
pub mod error;
pub mod filter;
pub mod folder;
pub mod kind;
pub mod listview;
pub mod log;
pub mod navigator;
pub mod output;
pub mod registry;
pub mod row;
pub mod session;
pub mod sort;
pub mod structs;
pub mod table;
pub mod utils;

#[cfg(test)]
mod testing;

pub use cluster::{Change, Cluster, ContextSource, KubeCluster, KubeContexts};
pub use error::{Error, Result};
pub use folder::{Deps, Folder, Item, Phase};
pub use navigator::Navigator;
pub use registry::ChildRegistry;
pub use session::{Session, SharedView};
pub use structs::{Settings, ViewOptions};

/// Connects to the configured context and returns a session at its root.
/// Other kubeconfig contexts are offered as rows of that root. View options
/// start from `settings.view` and change through [`Session::update_view`].
#[tracing::instrument(skip_all, fields(context = ?settings.context))]
pub async fn open(settings: &Settings, cancel: CancellationToken) -> Result<Session> {
    if let Some(dir) = &settings.log_dir {
        log::setup_logger(dir)?;
    }

    let cluster = KubeCluster::connect(settings.context.as_deref(), cancel.child_token()).await?;
    let context = cluster.context().to_string();
    let view = SharedView::new(settings.view.clone());
    let base = Deps::new(Arc::new(cluster), context)
        .with_cancel(cancel)
        .with_view(view.reader());

    let deps = match KubeContexts::from_kubeconfig(Arc::new(base.clone())) {
        Ok(contexts) => base.with_contexts(Arc::new(contexts)),
        Err(e) => {
            tracing::warn!(error = %e, "kubeconfig contexts unavailable");
            base
        }
    };
    let navigator = Navigator::new(folder::root(Arc::new(deps)));
    Ok(Session::new(navigator, view))
}
