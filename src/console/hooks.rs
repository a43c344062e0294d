//! Polling resources bound to the connection state.

use std::{
    collections::{BTreeSet, HashSet},
    future::pending,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::{
    sync::{watch, Notify},
    task::JoinHandle,
    time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, warn};

use super::{
    api::{ConsoleApi, Result, TopicsPage},
    sync::ConnectionState,
};
use crate::{
    http::validation::CreateTopicRequest,
    service::model::{BrokerInfo, ClusterOverview},
};

pub type Fetch<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookConfig {
    /// Refetch period while connected and healthy.
    pub poll_interval: Option<Duration>,

    /// Delay of the single retry scheduled after a failed fetch.
    pub retry_delay: Duration,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            poll_interval: None,
            retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// A resource fetched once connected, cleared on disconnect and optionally
/// polled. The background task is aborted when the hook is dropped.
#[derive(Debug)]
pub struct ResourceHook<T> {
    state: watch::Receiver<ResourceState<T>>,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl<T> ResourceHook<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn spawn(
        connection: watch::Receiver<ConnectionState>,
        fetch: Fetch<T>,
        config: HookConfig,
    ) -> Self {
        let (tx, state) = watch::channel(ResourceState::default());
        let refresh = Arc::new(Notify::new());
        let task = tokio::spawn(run(connection, fetch, config, tx, Arc::clone(&refresh)));

        Self {
            state,
            refresh,
            task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.state.clone()
    }

    pub fn state(&self) -> ResourceState<T> {
        self.state.borrow().clone()
    }

    /// Refetches now if connected. Refreshes while disconnected are dropped.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Lets other components trigger [`refresh`](Self::refresh).
    pub fn refresh_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.refresh)
    }
}

impl<T> Drop for ResourceHook<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<T>(
    mut connection: watch::Receiver<ConnectionState>,
    fetch: Fetch<T>,
    config: HookConfig,
    state: watch::Sender<ResourceState<T>>,
    refresh: Arc<Notify>,
) {
    let mut connected = false;
    let mut retry_at: Option<Instant> = None;
    let mut poll = config.poll_interval.map(|period| {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    loop {
        let now_connected = connection.borrow_and_update().is_connected();
        if now_connected && !connected {
            connected = true;
            // a refresh requested while disconnected is covered by this fetch
            refresh.notified().now_or_never();
            retry_at = load(&fetch, &state, &connection, config.retry_delay).await;
        } else if !now_connected && connected {
            debug!("Connection lost, clearing resource");
            connected = false;
            retry_at = None;
            state.send_replace(ResourceState::default());
        }

        tokio::select! {
            changed = connection.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = refresh.notified() => {
                if connected {
                    retry_at = load(&fetch, &state, &connection, config.retry_delay).await;
                }
            }
            _ = retry(retry_at) => {
                // the retry happens once; if it fails too, only a refresh or a
                // reconnect fetches again
                retry_at = None;
                if connected {
                    load(&fetch, &state, &connection, config.retry_delay).await;
                }
            }
            _ = tick(&mut poll) => {
                if connected && state.borrow().error.is_none() {
                    retry_at = load(&fetch, &state, &connection, config.retry_delay).await;
                }
            }
        }
    }
}

async fn retry(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

/// Runs one fetch and returns when to retry, if it failed.
///
/// The caller decides whether a retry is scheduled at all.
async fn load<T>(
    fetch: &Fetch<T>,
    state: &watch::Sender<ResourceState<T>>,
    connection: &watch::Receiver<ConnectionState>,
    retry_delay: Duration,
) -> Option<Instant> {
    state.send_modify(|s| s.loading = true);
    let result = fetch().await;

    if !connection.borrow().is_connected() {
        state.send_modify(|s| s.loading = false);
        return None;
    }

    match result {
        Ok(data) => {
            state.send_modify(|s| {
                s.data = Some(data);
                s.loading = false;
                s.error = None;
            });
            None
        }
        Err(e) => {
            warn!(%e, retry_in = ?retry_delay, "Fetch failed");
            state.send_modify(|s| {
                s.loading = false;
                s.error = Some(e.to_string());
            });
            Some(Instant::now() + retry_delay)
        }
    }
}

pub fn overview_hook(
    api: Arc<dyn ConsoleApi>,
    connection: watch::Receiver<ConnectionState>,
    config: HookConfig,
) -> ResourceHook<ClusterOverview> {
    let fetch: Fetch<ClusterOverview> = Arc::new(move || {
        let api = Arc::clone(&api);
        async move { api.cluster_overview().await }.boxed()
    });
    ResourceHook::spawn(connection, fetch, config)
}

pub fn topics_hook(
    api: Arc<dyn ConsoleApi>,
    connection: watch::Receiver<ConnectionState>,
    config: HookConfig,
) -> ResourceHook<TopicsPage> {
    let fetch: Fetch<TopicsPage> = Arc::new(move || {
        let api = Arc::clone(&api);
        async move { api.topics().await }.boxed()
    });
    ResourceHook::spawn(connection, fetch, config)
}

pub fn brokers_hook(
    api: Arc<dyn ConsoleApi>,
    connection: watch::Receiver<ConnectionState>,
    config: HookConfig,
) -> ResourceHook<Vec<BrokerInfo>> {
    let fetch: Fetch<Vec<BrokerInfo>> = Arc::new(move || {
        let api = Arc::clone(&api);
        async move { api.brokers().await }.boxed()
    });
    ResourceHook::spawn(connection, fetch, config)
}

/// Loading flags and errors of topic mutations.
///
/// Deletes are tracked per topic so several can run at once.
#[derive(Debug)]
pub struct MutationTracker {
    api: Arc<dyn ConsoleApi>,
    creating: AtomicBool,
    deleting: Mutex<HashSet<String>>,
    error: Mutex<Option<String>>,
    on_success: Option<Arc<Notify>>,
}

impl MutationTracker {
    pub fn new(api: Arc<dyn ConsoleApi>) -> Self {
        Self {
            api,
            creating: AtomicBool::new(false),
            deleting: Mutex::new(HashSet::new()),
            error: Mutex::new(None),
            on_success: None,
        }
    }

    /// Triggers `refresh` after every successful mutation.
    pub fn refreshing(mut self, refresh: Arc<Notify>) -> Self {
        self.on_success = Some(refresh);
        self
    }

    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::SeqCst)
    }

    pub fn is_deleting(&self, topic: &str) -> bool {
        self.deleting.lock().contains(topic)
    }

    pub fn deleting(&self) -> BTreeSet<String> {
        self.deleting.lock().iter().cloned().collect()
    }

    pub fn mutation_error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn clear_mutation_error(&self) {
        *self.error.lock() = None;
    }

    pub async fn create_topic(&self, form: CreateTopicRequest) -> Result<()> {
        self.clear_mutation_error();
        self.creating.store(true, Ordering::SeqCst);
        let _pending = Pending::Create(self);

        let result = self.api.create_topic(&form).await;
        self.settle(result)
    }

    pub async fn delete_topic(&self, topic: &str) -> Result<()> {
        self.clear_mutation_error();
        self.deleting.lock().insert(topic.to_string());
        let _pending = Pending::Delete(self, topic);

        let result = self.api.delete_topic(topic).await;
        self.settle(result)
    }

    fn settle(&self, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) => {
                if let Some(refresh) = &self.on_success {
                    refresh.notify_one();
                }
            }
            Err(e) => *self.error.lock() = Some(e.to_string()),
        }
        result
    }
}

/// Resets a loading flag when the mutation finishes or is cancelled.
enum Pending<'a> {
    Create(&'a MutationTracker),
    Delete(&'a MutationTracker, &'a str),
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        match self {
            Self::Create(tracker) => tracker.creating.store(false, Ordering::SeqCst),
            Self::Delete(tracker, topic) => {
                tracker.deleting.lock().remove(*topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::console::api::ConsoleError;
    use crate::service::model::{ClusterConnection, ConnectionStatus};

    fn connected() -> ConnectionState {
        ConnectionState {
            cluster: Some(ClusterConnection {
                id: "1".to_string(),
                name: "local".to_string(),
                bootstrap_servers: vec!["localhost:9092".to_string()],
                status: ConnectionStatus::Connected,
                version: None,
                controller_id: None,
                cluster_id: None,
            }),
            ..ConnectionState::default()
        }
    }

    /// Counts calls and fails the first `failures` of them.
    fn counting(calls: &Arc<AtomicUsize>, failures: usize) -> Fetch<usize> {
        let calls = Arc::clone(calls);
        Arc::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= failures {
                    Err(ConsoleError::UnexpectedResponse("boom".to_string()))
                } else {
                    Ok(n)
                }
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_on_connect_and_clears_on_disconnect() {
        let (conn, rx) = watch::channel(ConnectionState::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = ResourceHook::spawn(rx, counting(&calls, 0), HookConfig::default());
        let mut state = hook.subscribe();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        conn.send_replace(connected());
        state.wait_for(|s| s.data.is_some()).await.unwrap();
        assert_eq!(hook.state().data, Some(1));

        conn.send_replace(ConnectionState::default());
        state.wait_for(|s| s.data.is_none()).await.unwrap();
        assert_eq!(hook.state(), ResourceState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn error_schedules_retry() {
        let (_conn, rx) = watch::channel(connected());
        let calls = Arc::new(AtomicUsize::new(0));
        let config = HookConfig {
            poll_interval: Some(Duration::from_secs(1)),
            retry_delay: Duration::from_millis(10_500),
        };
        let hook = ResourceHook::spawn(rx, counting(&calls, 1), config);
        let mut state = hook.subscribe();

        state.wait_for(|s| s.error.is_some()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // polling is suspended while the error is outstanding
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        state.wait_for(|s| s.data.is_some()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(hook.state().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_retried_once() {
        let (_conn, rx) = watch::channel(connected());
        let calls = Arc::new(AtomicUsize::new(0));
        let config = HookConfig {
            poll_interval: Some(Duration::from_secs(1)),
            retry_delay: Duration::from_secs(5),
        };
        let hook = ResourceHook::spawn(rx, counting(&calls, usize::MAX), config);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(hook.state().error.is_some());

        hook.refresh();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_before_connect_is_not_replayed() {
        let (conn, rx) = watch::channel(ConnectionState::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = ResourceHook::spawn(rx, counting(&calls, 0), HookConfig::default());

        hook.refresh();
        conn.send_replace(connected());
        hook.subscribe()
            .wait_for(|s| s.data.is_some())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_while_healthy() {
        let (_conn, rx) = watch::channel(connected());
        let calls = Arc::new(AtomicUsize::new(0));
        let config = HookConfig {
            poll_interval: Some(Duration::from_secs(1)),
            ..HookConfig::default()
        };
        let hook = ResourceHook::spawn(rx, counting(&calls, 0), config);

        hook.subscribe()
            .wait_for(|s| s.data.is_some())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_the_task() {
        let (conn, rx) = watch::channel(ConnectionState::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = ResourceHook::spawn(rx, counting(&calls, 0), HookConfig::default());
        drop(hook);

        conn.send_replace(connected());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_refetches() {
        let (_conn, rx) = watch::channel(connected());
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = ResourceHook::spawn(rx, counting(&calls, 0), HookConfig::default());
        let mut state = hook.subscribe();

        state.wait_for(|s| s.data == Some(1)).await.unwrap();
        hook.refresh();
        state.wait_for(|s| s.data == Some(2)).await.unwrap();
    }
}
