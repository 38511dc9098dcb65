use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerPort, ContainerStatus, Pod};
use k8s_openapi::serde_json::{self, Value};

use super::{join_path, Deps, Folder, Item, ObjectRef, Populate, PopulateCtx, View};
use super::{Coords, Listing, LiveFolder};
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::row::Column;
use crate::utils::Cell;

/// Containers of one pod: init first, then regular, then ephemeral.
pub fn containers(
    deps: Arc<Deps>,
    namespace: Option<String>,
    pod: String,
    base_path: String,
) -> Arc<dyn Folder> {
    let path = join_path(&base_path, &pod);
    let coords = Coords {
        kind: "Pod".to_string(),
        namespace: namespace.clone(),
    };
    let source = Containers {
        pod_kind: ResourceKind::from_parts("", "v1", "Pod", true),
        namespace,
        pod,
    };
    Arc::new(LiveFolder::new(deps, path, Box::new(source)).with_coords(coords))
}

struct Containers {
    pod_kind: ResourceKind,
    namespace: Option<String>,
    pod: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerType {
    Init,
    Regular,
    Ephemeral,
}

impl ContainerType {
    fn label(self) -> &'static str {
        match self {
            ContainerType::Init => "init",
            ContainerType::Regular => "container",
            ContainerType::Ephemeral => "ephemeral",
        }
    }
}

/// One container row before it becomes an [`Item`].
#[derive(Debug, Clone)]
struct ContainerRow {
    name: String,
    image: String,
    ctype: ContainerType,
    ready: String,
    state: String,
    restarts: String,
    ports: String,
    started: Option<DateTime<Utc>>,
    spec: Value,
}

fn columns() -> Vec<Column> {
    ["NAME", "IMAGE", "TYPE", "READY", "STATE", "RESTARTS", "PORTS", "AGE"]
        .into_iter()
        .map(Column::named)
        .collect()
}

#[async_trait]
impl Populate for Containers {
    #[tracing::instrument(skip(self, ctx), fields(pod = %self.pod))]
    async fn populate(&self, ctx: &PopulateCtx<'_>) -> Result<Listing> {
        ctx.subscribe(&self.pod_kind, self.namespace.as_deref()).await;
        let obj = ctx
            .deps
            .cluster
            .get_by_kind(&self.pod_kind, self.namespace.as_deref(), &self.pod)
            .await?;
        let pod: Pod = serde_json::from_value(serde_json::to_value(&obj)?)?;

        let output = ctx.deps.view_options().output;
        let items = container_rows(&pod)
            .into_iter()
            .map(|row| {
                let details = format!("{} {} in pod {}", row.ctype.label(), row.name, self.pod);
                let view = Arc::new(SpecView {
                    spec: row.spec,
                    output,
                });
                Arc::new(
                    Item::new(row.name.clone(), row.name.clone(), join_path(ctx.path, &row.name))
                        .with_cells(vec![
                            Cell::new(row.name.clone()),
                            Cell::new(row.image),
                            Cell::new(row.ctype.label()),
                            Cell::status(row.ready),
                            Cell::status(row.state),
                            Cell::new(row.restarts),
                            Cell::new(row.ports),
                        ])
                        .with_age(row.started)
                        .with_details(details)
                        .with_object(ObjectRef {
                            kind: "Pod".to_string(),
                            namespace: self.namespace.clone(),
                            name: self.pod.clone(),
                        })
                        .with_view(view),
                )
            })
            .collect();

        Ok(Listing::new(columns(), items))
    }
}

fn container_rows(pod: &Pod) -> Vec<ContainerRow> {
    let Some(spec) = &pod.spec else {
        return Vec::new();
    };

    let row = |name: &str,
               image: Option<&String>,
               ports: Option<&Vec<ContainerPort>>,
               ctype: ContainerType,
               spec: Value|
     -> ContainerRow {
        let status = find_status(pod, name);
        let (ready, state, started, restarts) = match status {
            Some(cs) => {
                let (state, started) = container_state(cs);
                (cs.ready.to_string(), state, started, cs.restart_count.to_string())
            }
            None => ("n/a".into(), "Unknown".into(), None, "0".into()),
        };
        ContainerRow {
            name: name.to_string(),
            image: image.cloned().unwrap_or_default(),
            ctype,
            ready,
            state,
            restarts,
            ports: ports_to_string(ports),
            started,
            spec,
        }
    };

    let mut rows = Vec::new();
    for c in spec.init_containers.iter().flatten() {
        let value = serde_json::to_value(c).unwrap_or(Value::Null);
        rows.push(row(&c.name, c.image.as_ref(), c.ports.as_ref(), ContainerType::Init, value));
    }
    for c in &spec.containers {
        let value = serde_json::to_value(c).unwrap_or(Value::Null);
        rows.push(row(&c.name, c.image.as_ref(), c.ports.as_ref(), ContainerType::Regular, value));
    }
    for c in spec.ephemeral_containers.iter().flatten() {
        let value = serde_json::to_value(c).unwrap_or(Value::Null);
        rows.push(row(&c.name, c.image.as_ref(), c.ports.as_ref(), ContainerType::Ephemeral, value));
    }
    rows
}

fn container_state(cs: &ContainerStatus) -> (String, Option<DateTime<Utc>>) {
    if let Some(s) = &cs.state {
        if let Some(r) = &s.running {
            return ("Running".into(), r.started_at.as_ref().map(|t| t.0));
        }
        if let Some(w) = &s.waiting {
            return (w.reason.clone().unwrap_or_else(|| "Waiting".into()), None);
        }
        if let Some(t) = &s.terminated {
            let reason = t
                .reason
                .clone()
                .unwrap_or_else(|| format!("ExitCode:{}", t.exit_code));
            return (reason, t.started_at.as_ref().map(|t| t.0));
        }
    }
    ("Unknown".into(), None)
}

fn find_status<'a>(pod: &'a Pod, name: &str) -> Option<&'a ContainerStatus> {
    let status = pod.status.as_ref()?;
    [
        status.init_container_statuses.as_ref(),
        status.container_statuses.as_ref(),
        status.ephemeral_container_statuses.as_ref(),
    ]
    .into_iter()
    .flatten()
    .flatten()
    .find(|cs| cs.name == name)
}

fn ports_to_string(ports: Option<&Vec<ContainerPort>>) -> String {
    ports
        .into_iter()
        .flatten()
        .map(|p| match &p.protocol {
            Some(proto) if proto != "TCP" => format!("{}/{}", p.container_port, proto),
            _ => p.container_port.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Container spec rendered in the configured output mode.
struct SpecView {
    spec: Value,
    output: crate::output::OutputMode,
}

#[async_trait]
impl View for SpecView {
    async fn view(&self) -> Result<String> {
        Ok(self.output.format(&self.spec))
    }
}
