//! Connection pool state-machine tests with a scripted connector.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout};

use cognigy_a2a_gateway::config::{AgentDescriptor, TransportKind};
use cognigy_a2a_gateway::pool::{
    ConnectionPool, ConnectionState, LinkEvent, PersistentLink, PoolConfig, PoolError, PoolNotice,
    UpstreamConnector,
};

fn agent(id: &str) -> AgentDescriptor {
    AgentDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        version: "1.0.0".to_string(),
        transport: TransportKind::Socket,
        endpoint_url: "https://endpoint.example".to_string(),
        endpoint_token: "tok".to_string(),
        skills: Vec::new(),
    }
}

fn fast_config() -> PoolConfig {
    PoolConfig {
        idle_timeout: Duration::from_millis(80),
        reconnect_base: Duration::from_millis(5),
        reconnect_cap: Duration::from_millis(20),
        max_attempts: 6,
        jitter: 0.0,
    }
}

struct FakeLink {
    rx: mpsc::Receiver<LinkEvent>,
}

#[async_trait]
impl PersistentLink for FakeLink {
    async fn next_event(&mut self) -> LinkEvent {
        self.rx.recv().await.unwrap_or(LinkEvent::Disconnected)
    }

    async fn close(&mut self) {}
}

/// Connector that follows a scripted plan of connect results; successful
/// connects hand back a link the test can fail on demand.
#[derive(Default)]
struct FakeConnector {
    plan: Mutex<VecDeque<Result<(), String>>>,
    links: Mutex<Vec<mpsc::Sender<LinkEvent>>>,
    attempts: AtomicUsize,
}

impl FakeConnector {
    async fn push_plan(&self, results: Vec<Result<(), String>>) {
        self.plan.lock().await.extend(results);
    }

    async fn fail_link(&self, index: usize, event: LinkEvent) {
        let links = self.links.lock().await;
        links[index].send(event).await.unwrap();
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(
        &self,
        _agent: &AgentDescriptor,
    ) -> Result<Box<dyn PersistentLink>, PoolError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.plan.lock().await.pop_front().unwrap_or(Ok(()));
        match next {
            Ok(()) => {
                let (tx, rx) = mpsc::channel(4);
                self.links.lock().await.push(tx);
                Ok(Box::new(FakeLink { rx }))
            }
            Err(message) => Err(PoolError::ConnectFailed { message }),
        }
    }
}

fn pool_with(connector: Arc<FakeConnector>, config: PoolConfig) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::with_config(connector, config))
}

async fn wait_for_state(
    pool: &Arc<ConnectionPool>,
    agent_id: &str,
    expected: Option<ConnectionState>,
) {
    for _ in 0..200 {
        if pool.state_of(agent_id).await == expected {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "agent '{}' never reached {:?} (currently {:?})",
        agent_id,
        expected,
        pool.state_of(agent_id).await
    );
}

#[tokio::test]
async fn connect_admits_an_idle_entry() {
    let connector = Arc::new(FakeConnector::default());
    let pool = pool_with(Arc::clone(&connector), fast_config());

    let state = pool.get_or_create(&agent("a")).await.unwrap();
    assert_eq!(state, ConnectionState::Idle);
    assert!(pool.contains("a").await);
    assert_eq!(pool.active_sessions("a").await, Some(0));
    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn session_counting_drives_idle_active() {
    let connector = Arc::new(FakeConnector::default());
    let pool = pool_with(connector, fast_config());
    pool.get_or_create(&agent("a")).await.unwrap();

    pool.session_started("a").await;
    pool.session_started("a").await;
    assert_eq!(pool.state_of("a").await, Some(ConnectionState::Active));
    assert_eq!(pool.active_sessions("a").await, Some(2));

    pool.session_ended("a").await;
    assert_eq!(pool.state_of("a").await, Some(ConnectionState::Active));

    pool.session_ended("a").await;
    assert_eq!(pool.state_of("a").await, Some(ConnectionState::Idle));
    assert_eq!(pool.active_sessions("a").await, Some(0));

    // Never below zero.
    pool.session_ended("a").await;
    assert_eq!(pool.active_sessions("a").await, Some(0));
}

#[tokio::test]
async fn idle_entries_are_evicted_active_entries_are_not() {
    let connector = Arc::new(FakeConnector::default());
    let pool = pool_with(connector, fast_config());

    pool.get_or_create(&agent("idle")).await.unwrap();
    pool.get_or_create(&agent("busy")).await.unwrap();
    pool.session_started("busy").await;

    sleep(Duration::from_millis(200)).await;

    assert!(!pool.contains("idle").await, "idle entry should be evicted");
    assert!(pool.contains("busy").await, "active entry must survive");
}

#[tokio::test]
async fn disconnect_triggers_reconnect_and_recovers() {
    let connector = Arc::new(FakeConnector::default());
    let pool = pool_with(Arc::clone(&connector), fast_config());
    pool.get_or_create(&agent("a")).await.unwrap();
    // Keep it active so the idle timer stays out of the way.
    pool.session_started("a").await;

    connector.fail_link(0, LinkEvent::Disconnected).await;

    // Initial connect plus one successful reconnect.
    for _ in 0..200 {
        if connector.attempts() == 2 {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(connector.attempts(), 2);
    wait_for_state(&pool, "a", Some(ConnectionState::Active)).await;
}

#[tokio::test]
async fn reconnect_restores_idle_when_no_sessions() {
    let connector = Arc::new(FakeConnector::default());
    let pool = pool_with(Arc::clone(&connector), fast_config());
    pool.get_or_create(&agent("a")).await.unwrap();

    connector.fail_link(0, LinkEvent::Disconnected).await;

    for _ in 0..200 {
        if connector.attempts() == 2 {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(connector.attempts(), 2);
    wait_for_state(&pool, "a", Some(ConnectionState::Idle)).await;
}

#[tokio::test]
async fn six_failed_reconnects_kill_the_entry() {
    let connector = Arc::new(FakeConnector::default());
    let pool = pool_with(Arc::clone(&connector), fast_config());
    let mut notices = pool.subscribe();

    pool.get_or_create(&agent("a")).await.unwrap();
    pool.session_started("a").await;

    connector
        .push_plan((0..6).map(|i| Err(format!("attempt {} refused", i))).collect())
        .await;
    connector.fail_link(0, LinkEvent::Disconnected).await;

    let notice = timeout(Duration::from_secs(2), notices.recv())
        .await
        .expect("dead notice within deadline")
        .unwrap();
    let PoolNotice::Dead { agent_id } = notice;
    assert_eq!(agent_id, "a");

    assert!(!pool.contains("a").await, "dead entry leaves the pool");
    // Initial connect + six failed reconnect attempts, no seventh.
    assert_eq!(connector.attempts(), 7);
}

#[tokio::test]
async fn auth_error_goes_straight_to_dead() {
    let connector = Arc::new(FakeConnector::default());
    let pool = pool_with(Arc::clone(&connector), fast_config());
    let mut notices = pool.subscribe();

    pool.get_or_create(&agent("a")).await.unwrap();
    connector
        .fail_link(
            0,
            LinkEvent::Errored {
                message: "HTTP 401 Unauthorized".to_string(),
            },
        )
        .await;

    timeout(Duration::from_secs(1), notices.recv())
        .await
        .expect("dead notice within deadline")
        .unwrap();
    assert!(!pool.contains("a").await);
    // No reconnect attempt was made.
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn auth_failure_on_first_connect_reports_dead() {
    let connector = Arc::new(FakeConnector::default());
    connector
        .push_plan(vec![Err("403 Forbidden".to_string())])
        .await;
    let pool = pool_with(connector, fast_config());

    let err = pool.get_or_create(&agent("a")).await.unwrap_err();
    assert!(matches!(err, PoolError::Dead { .. }));
    assert!(!pool.contains("a").await);
}

#[tokio::test]
async fn plain_connect_failure_is_not_dead() {
    let connector = Arc::new(FakeConnector::default());
    connector
        .push_plan(vec![Err("connection refused".to_string())])
        .await;
    let pool = pool_with(connector, fast_config());

    let err = pool.get_or_create(&agent("a")).await.unwrap_err();
    assert!(matches!(err, PoolError::ConnectFailed { .. }));
    assert!(!pool.contains("a").await);

    // The next attempt may try again from scratch.
    assert_eq!(
        pool.get_or_create(&agent("a")).await.unwrap(),
        ConnectionState::Idle
    );
}

#[tokio::test]
async fn clear_resets_the_pool() {
    let connector = Arc::new(FakeConnector::default());
    let pool = pool_with(connector, fast_config());
    pool.get_or_create(&agent("a")).await.unwrap();
    pool.get_or_create(&agent("b")).await.unwrap();

    pool.clear().await;
    assert!(pool.is_empty().await);
}
