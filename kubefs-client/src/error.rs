use k8s_openapi::serde_json;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kube: {0}")]
    Kube(#[from] kube::Error),

    #[error("kubeconfig: {0}")]
    Config(#[from] kube::config::KubeconfigError),

    #[error("building request: {0}")]
    Request(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The resolver has no resource kind under this name.
    #[error("resource not found in cluster: {0}")]
    UnknownKind(String),

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("decode: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<kube::core::request::Error> for Error {
    fn from(e: kube::core::request::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Error::Request(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
