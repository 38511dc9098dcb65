use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Change;
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::table::{RowEvent, RowWatch};

const CHANNEL_CAPACITY: usize = 64;
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Opens a fresh watch over every namespace of a kind.
pub type WatchOpener = Arc<dyn Fn(ResourceKind) -> BoxFuture<'static, Result<RowWatch>> + Send + Sync>;

#[derive(Debug)]
struct Topic {
    tx: broadcast::Sender<Change>,
    task: JoinHandle<()>,
}

/// One shared watch per kind, fanned out to every subscriber.
///
/// The watch is reopened whenever the server closes it and lives until
/// [`ChangeHub::shutdown`] or the hub is dropped.
pub struct ChangeHub {
    opener: WatchOpener,
    cancel: CancellationToken,
    restart_delay: Duration,
    topics: RwLock<HashMap<String, Topic>>,
}

impl ChangeHub {
    pub fn new(opener: WatchOpener, cancel: CancellationToken) -> Self {
        Self {
            opener,
            cancel,
            restart_delay: RESTART_DELAY,
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    #[tracing::instrument(skip(self, kind), fields(kind = %kind.key()))]
    pub async fn subscribe(&self, kind: &ResourceKind) -> broadcast::Receiver<Change> {
        let key = kind.key();
        {
            let topics = self.topics.read().await;
            if let Some(topic) = topics.get(&key).filter(|t| !t.task.is_finished()) {
                return topic.tx.subscribe();
            }
        }

        let mut topics = self.topics.write().await;
        if let Some(topic) = topics.get(&key).filter(|t| !t.task.is_finished()) {
            return topic.tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(pump(
            kind.clone(),
            self.opener.clone(),
            tx.clone(),
            self.cancel.child_token(),
            self.restart_delay,
        ));
        tracing::debug!(kind = %key, "started change watch");
        topics.insert(key, Topic { tx, task });
        rx
    }

    /// Keys of the kinds currently watched.
    pub async fn watched(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.topics.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Aborts every watch. Subscribers see their channel close.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let mut topics = self.topics.write().await;
        for (_, topic) in topics.drain() {
            topic.task.abort();
        }
    }
}

impl Drop for ChangeHub {
    fn drop(&mut self) {
        for (_, topic) in self.topics.get_mut().drain() {
            topic.task.abort();
        }
    }
}

async fn pump(
    kind: ResourceKind,
    opener: WatchOpener,
    tx: broadcast::Sender<Change>,
    cancel: CancellationToken,
    restart_delay: Duration,
) {
    let key = kind.key();
    let mut reopening = false;
    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = opener(kind.clone()) => opened,
        };

        match opened {
            Ok(mut watch) => loop {
                if std::mem::take(&mut reopening) {
                    // events between the two watches are lost
                    let _ = tx.send(Change::resync(key.clone()));
                }
                let event = tokio::select! {
                    _ = cancel.cancelled() => {
                        watch.stop();
                        return;
                    }
                    event = watch.next() => event,
                };
                match event {
                    Some(RowEvent::Error(status)) if status.code == 410 => {
                        tracing::debug!(kind = %key, "watch expired, reopening");
                        break;
                    }
                    Some(RowEvent::Error(status)) => {
                        tracing::warn!(kind = %key, reason = %status.reason, message = %status.message, "watch error");
                    }
                    Some(event) => {
                        if let Some(row) = event.row() {
                            // No receivers is fine, the next subscriber attaches later.
                            let _ = tx.send(Change {
                                kind: key.clone(),
                                namespace: row.meta.namespace.clone(),
                                name: row.name(&[]),
                                event: event.event_type(),
                                resync: false,
                            });
                        }
                    }
                    None => break,
                }
            },
            Err(e) => tracing::warn!(kind = %key, error = %e, "failed to open watch"),
        }
        reopening = true;

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(restart_delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::EventType;
    use futures::stream;
    use futures::{FutureExt, StreamExt};
    use k8s_openapi::serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn line(type_: &str, name: &str) -> std::io::Result<String> {
        Ok(json!({
            "type": type_,
            "object": {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": name, "namespace": "prod"}}
        })
        .to_string())
    }

    fn counting_opener(opens: Arc<AtomicUsize>, endless: bool) -> WatchOpener {
        Arc::new(move |kind: ResourceKind| {
            let n = opens.fetch_add(1, Ordering::SeqCst);
            async move {
                let first = stream::once(async move {
                    // lets every subscriber of the test attach first
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    line("ADDED", &format!("web-{n}"))
                });
                let watch = if endless {
                    RowWatch::from_lines(kind.kind(), first.chain(stream::pending()))
                } else {
                    RowWatch::from_lines(kind.kind(), first)
                };
                Ok(watch)
            }
            .boxed()
        })
    }

    fn pods() -> ResourceKind {
        ResourceKind::from_parts("", "v1", "Pod", true)
    }

    #[tokio::test]
    async fn test_one_watch_per_kind() {
        let opens = Arc::new(AtomicUsize::new(0));
        let hub = ChangeHub::new(counting_opener(opens.clone(), true), CancellationToken::new());

        let mut a = hub.subscribe(&pods()).await;
        let mut b = hub.subscribe(&pods()).await;

        let change = a.recv().await.unwrap();
        assert_eq!(change.kind, "pods");
        assert_eq!(change.namespace.as_deref(), Some("prod"));
        assert_eq!(change.name, "web-0");
        assert_eq!(change.event, EventType::Added);
        assert_eq!(b.recv().await.unwrap(), change);

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(hub.watched().await, vec!["pods"]);
    }

    #[tokio::test]
    async fn test_closed_watch_is_reopened() {
        let opens = Arc::new(AtomicUsize::new(0));
        let hub = ChangeHub::new(counting_opener(opens.clone(), false), CancellationToken::new())
            .with_restart_delay(Duration::from_millis(5));

        let mut rx = hub.subscribe(&pods()).await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.name, "web-0");
        assert!(!first.resync);

        // reopening invalidates the whole kind before new events flow
        assert_eq!(rx.recv().await.unwrap(), Change::resync("pods"));
        assert_eq!(rx.recv().await.unwrap().name, "web-1");
        assert!(opens.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_expired_watch_sends_resync() {
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = opens.clone();
        let opener: WatchOpener = Arc::new(move |kind: ResourceKind| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let expired = json!({
                    "type": "ERROR",
                    "object": {"kind": "Status", "status": "Failure", "reason": "Expired", "code": 410}
                })
                .to_string();
                let lines = if n == 0 {
                    stream::iter(vec![Ok::<_, std::io::Error>(expired)])
                        .chain(stream::pending())
                        .boxed()
                } else {
                    stream::pending().boxed()
                };
                Ok(RowWatch::from_lines(kind.kind(), lines))
            }
            .boxed()
        });
        let hub = ChangeHub::new(opener, CancellationToken::new())
            .with_restart_delay(Duration::from_millis(5));

        let mut rx = hub.subscribe(&pods()).await;
        let change = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(change.resync);
        assert_eq!(change.kind, "pods");
        assert_eq!(change.namespace, None);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscribers() {
        let opens = Arc::new(AtomicUsize::new(0));
        let hub = ChangeHub::new(counting_opener(opens, true), CancellationToken::new());
        let mut rx = hub.subscribe(&pods()).await;
        rx.recv().await.unwrap();

        hub.shutdown().await;
        assert!(hub.watched().await.is_empty());
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
