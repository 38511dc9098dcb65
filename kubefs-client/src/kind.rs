use kube::api::{ApiResource, GroupVersionKind};
use kube::discovery::{ApiCapabilities, Scope};

/// A resolved resource kind: where it lives in the API and whether it is namespaced.
#[derive(Debug, Clone)]
pub struct ResourceKind {
    pub ar: ApiResource,
    pub namespaced: bool,
}

impl ResourceKind {
    pub fn new(gvk: &GroupVersionKind, namespaced: bool) -> Self {
        Self {
            ar: ApiResource::from_gvk(gvk),
            namespaced,
        }
    }

    pub fn from_parts(group: &str, version: &str, kind: &str, namespaced: bool) -> Self {
        Self::new(&GroupVersionKind::gvk(group, version, kind), namespaced)
    }

    pub fn from_discovery(ar: ApiResource, caps: &ApiCapabilities) -> Self {
        Self {
            namespaced: caps.scope == Scope::Namespaced,
            ar,
        }
    }

    pub fn kind(&self) -> &str {
        &self.ar.kind
    }

    pub fn plural(&self) -> &str {
        &self.ar.plural
    }

    pub fn group(&self) -> &str {
        &self.ar.group
    }

    /// `plural` for the core group, `plural.group` otherwise. Unique per cluster.
    pub fn key(&self) -> String {
        if self.ar.group.is_empty() {
            self.ar.plural.clone()
        } else {
            format!("{}.{}", self.ar.plural, self.ar.group)
        }
    }

    /// Matches the kind name, the plural, or the fully qualified key, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.ar.kind)
            || name.eq_ignore_ascii_case(&self.ar.plural)
            || name.eq_ignore_ascii_case(&self.key())
            || name.eq_ignore_ascii_case(&format!("{}.{}", self.ar.kind, self.ar.group))
    }
}
