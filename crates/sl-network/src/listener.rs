//! Passive role: bind a random high port, accept sockets, establish each one.
//!
//! Sockets still in handshake/greeting are tracked separately from ready
//! connections so `stop()` can destroy every one of them.

use rand::Rng;
use sl_core::{ConnectionId, RemoteDeviceInfo};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::channel::{HandshakeRole, ReadyChannel};
use crate::config::ListenerConfig;
use crate::establish::{establish, EstablishError};
use crate::gate::ConnectionGate;

pub type TcpReadyChannel = ReadyChannel<TcpStream>;

const ACCEPT_BACKOFF_INITIAL: Duration = Duration::from_millis(50);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(2);
const ACCEPT_MAX_CONSECUTIVE_FAILURES: u32 = 20;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("no free port after {attempts} bind attempts")]
    BindExhausted { attempts: u32 },

    #[error("listener is already running on port {port}")]
    AlreadyRunning { port: u16 },

    #[error("port range {start}..={end} is empty")]
    InvalidPortRange { start: u16, end: u16 },
}

#[derive(Clone)]
pub struct ShardListener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    config: ListenerConfig,
    gate: Arc<dyn ConnectionGate>,
    local: RemoteDeviceInfo,
    running: AsyncMutex<Option<RunningListener>>,
    in_handshake: Arc<AsyncMutex<HashMap<ConnectionId, AbortHandle>>>,
}

struct RunningListener {
    port: u16,
    accept_task: JoinHandle<()>,
}

impl ShardListener {
    pub fn new(config: ListenerConfig, gate: Arc<dyn ConnectionGate>, local: RemoteDeviceInfo) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                config,
                gate,
                local,
                running: AsyncMutex::new(None),
                in_handshake: Arc::new(AsyncMutex::new(HashMap::new())),
            }),
        }
    }

    /// Bind and start accepting. Ready connections arrive on the returned receiver.
    pub async fn start(&self) -> Result<(u16, mpsc::Receiver<TcpReadyChannel>), ListenerError> {
        let mut running = self.inner.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Err(ListenerError::AlreadyRunning { port: current.port });
        }

        let (listener, port) = self.bind_random_port().await?;
        let (ready_tx, ready_rx) = mpsc::channel(self.inner.config.ready_queue_depth.max(1));

        // The accept task only holds a weak reference; dropping the last
        // `ShardListener` aborts it and closes the listening socket.
        let inner = Arc::downgrade(&self.inner);
        let accept_task = tokio::spawn(
            run_accept_loop(inner, listener, ready_tx)
                .instrument(info_span!("listener.accept", port = port)),
        );

        info!(port = port, "listener started");
        *running = Some(RunningListener { port, accept_task });
        Ok((port, ready_rx))
    }

    /// Close the listening socket and destroy every in-handshake socket.
    pub async fn stop(&self) {
        let Some(running) = self.inner.running.lock().await.take() else {
            return;
        };
        running.accept_task.abort();

        let mut in_handshake = self.inner.in_handshake.lock().await;
        let swept = in_handshake.len();
        for (_, handle) in in_handshake.drain() {
            handle.abort();
        }
        info!(port = running.port, swept = swept, "listener stopped");
    }

    pub async fn port(&self) -> Option<u16> {
        self.inner.running.lock().await.as_ref().map(|r| r.port)
    }

    pub async fn in_handshake_count(&self) -> usize {
        self.inner.in_handshake.lock().await.len()
    }

    async fn bind_random_port(&self) -> Result<(TcpListener, u16), ListenerError> {
        let config = &self.inner.config;
        let (start, end) = (*config.port_range.start(), *config.port_range.end());
        if start > end {
            return Err(ListenerError::InvalidPortRange { start, end });
        }

        for attempt in 1..=config.bind_attempts {
            let port = rand::thread_rng().gen_range(start..=end);
            match TcpListener::bind((config.bind_host.as_str(), port)).await {
                Ok(listener) => return Ok((listener, port)),
                Err(err) => {
                    debug!(attempt = attempt, port = port, error = %err, "bind failed, retrying");
                }
            }
        }
        warn!(attempts = config.bind_attempts, "bind attempts exhausted");
        Err(ListenerError::BindExhausted {
            attempts: config.bind_attempts,
        })
    }
}

async fn run_accept_loop(
    inner: Weak<ListenerInner>,
    listener: TcpListener,
    ready_tx: mpsc::Sender<TcpReadyChannel>,
) {
    let mut backoff = ACCEPT_BACKOFF_INITIAL;
    let mut failures = 0u32;
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                failures = 0;
                backoff = ACCEPT_BACKOFF_INITIAL;
                if ready_tx.is_closed() {
                    debug!("ready receiver dropped, stopping accept loop");
                    return;
                }
                let Some(inner) = inner.upgrade() else {
                    debug!("listener dropped, stopping accept loop");
                    return;
                };
                debug!(peer_addr = %peer_addr, "inbound socket accepted");
                inner.spawn_connection(stream, ready_tx.clone()).await;
            }
            Err(err) => {
                failures += 1;
                if failures >= ACCEPT_MAX_CONSECUTIVE_FAILURES {
                    warn!(error = %err, failures = failures, "accept keeps failing, stopping accept loop");
                    return;
                }
                warn!(error = %err, retry_in_ms = backoff.as_millis() as u64, "accept failed");
                tokio::time::sleep(backoff).await;
                backoff = next_accept_backoff(backoff);
            }
        }
    }
}

fn next_accept_backoff(current: Duration) -> Duration {
    (current * 2).min(ACCEPT_BACKOFF_MAX)
}

impl ListenerInner {
    async fn spawn_connection(&self, stream: TcpStream, ready_tx: mpsc::Sender<TcpReadyChannel>) {
        let connection_id = ConnectionId::new();
        let task_connection_id = connection_id.clone();
        let config = self.config.establish.clone();
        let gate = self.gate.clone();
        let local = self.local.clone();
        let registry = self.in_handshake.clone();

        // Hold the registry lock across spawn + insert so the task's own
        // removal cannot run before its handle is registered.
        let mut in_handshake = self.in_handshake.lock().await;
        let task = tokio::spawn(async move {
            let result = establish(
                stream,
                HandshakeRole::Passive,
                task_connection_id.clone(),
                &config,
                gate.as_ref(),
                &local,
            )
            .await;

            registry.lock().await.remove(&task_connection_id);

            match result {
                Ok(ready) => {
                    if ready_tx.send(ready).await.is_err() {
                        debug!(connection_id = %task_connection_id, "ready receiver dropped");
                    }
                }
                Err(EstablishError::Rejected) => {
                    info!(connection_id = %task_connection_id, "inbound connection rejected by operator");
                }
                Err(err) => {
                    warn!(connection_id = %task_connection_id, error = %err, "inbound connection failed");
                }
            }
        });
        in_handshake.insert(connection_id, task.abort_handle());
    }
}

impl Drop for ListenerInner {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.accept_task.abort();
            debug!(port = running.port, "listener dropped without stop, accept task aborted");
        }
        if let Ok(mut in_handshake) = self.in_handshake.try_lock() {
            for (_, handle) in in_handshake.drain() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ShardConnector;
    use crate::test_support::{device, ScriptedGate};
    use sl_core::ports::OperatorDecision;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn loopback_config() -> ListenerConfig {
        ListenerConfig {
            bind_host: "127.0.0.1".to_string(),
            ..ListenerConfig::default()
        }
    }

    fn listener(decision: OperatorDecision) -> ShardListener {
        ShardListener::new(loopback_config(), Arc::new(ScriptedGate(decision)), device("listener"))
    }

    fn connector(decision: OperatorDecision) -> ShardConnector {
        ShardConnector::new(
            loopback_config().establish,
            Arc::new(ScriptedGate(decision)),
            device("dialer"),
        )
    }

    #[tokio::test]
    async fn start_binds_within_configured_range() {
        let listener = listener(OperatorDecision::Approved);
        let (port, _rx) = listener.start().await.expect("start");
        assert!((10000..=60000).contains(&port));
        assert_eq!(listener.port().await, Some(port));

        let err = listener.start().await.err().expect("second start fails");
        assert!(matches!(err, ListenerError::AlreadyRunning { .. }));
        listener.stop().await;
        assert_eq!(listener.port().await, None);
    }

    #[tokio::test]
    async fn bind_exhaustion_is_reported() {
        let blocker = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let taken = blocker.local_addr().unwrap().port();
        let config = ListenerConfig {
            port_range: taken..=taken,
            bind_attempts: 3,
            ..loopback_config()
        };
        let listener = ShardListener::new(config, Arc::new(ScriptedGate(OperatorDecision::Approved)), device("l"));

        let err = listener.start().await.err().expect("bind must fail");
        assert!(matches!(err, ListenerError::BindExhausted { attempts: 3 }));
    }

    #[test]
    fn accept_backoff_doubles_up_to_cap() {
        let mut backoff = ACCEPT_BACKOFF_INITIAL;
        let mut steps = Vec::new();
        for _ in 0..8 {
            backoff = next_accept_backoff(backoff);
            steps.push(backoff.as_millis());
        }
        assert_eq!(steps, vec![100, 200, 400, 800, 1600, 2000, 2000, 2000]);
    }

    #[tokio::test]
    async fn dropping_a_running_listener_closes_its_port() {
        let listener = listener(OperatorDecision::Approved);
        let (port, _ready_rx) = listener.start().await.unwrap();
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_ok());

        drop(listener);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            TcpStream::connect(("127.0.0.1", port)).await.is_err(),
            "port must refuse connections once the listener is gone"
        );
    }

    #[tokio::test]
    async fn connector_and_listener_become_ready() {
        let listener = listener(OperatorDecision::Approved);
        let (port, mut ready_rx) = listener.start().await.unwrap();

        let dialed = connector(OperatorDecision::Approved)
            .connect(&format!("127.0.0.1:{port}"))
            .await
            .expect("connect");
        let accepted = ready_rx.recv().await.expect("ready connection");

        assert_eq!(dialed.remote().name, "listener");
        assert_eq!(accepted.remote().name, "dialer");
        assert_eq!(dialed.pairing_code(), accepted.pairing_code());
        listener.stop().await;
    }

    #[tokio::test]
    async fn rejected_pairing_never_becomes_ready() {
        let listener = listener(OperatorDecision::Denied);
        let (port, mut ready_rx) = listener.start().await.unwrap();

        let result = connector(OperatorDecision::Approved)
            .connect(&format!("127.0.0.1:{port}"))
            .await;
        assert!(result.is_err());

        let nothing = tokio::time::timeout(Duration::from_millis(200), ready_rx.recv()).await;
        assert!(nothing.is_err(), "no ready channel may surface");
        listener.stop().await;
    }

    #[tokio::test]
    async fn concurrent_dials_get_independent_channels() {
        let listener = listener(OperatorDecision::Approved);
        let (port, mut ready_rx) = listener.start().await.unwrap();
        let addr = format!("127.0.0.1:{port}");

        let first = connector(OperatorDecision::Approved);
        let second = connector(OperatorDecision::Approved);
        let (a, b) = tokio::join!(first.connect(&addr), second.connect(&addr));
        let (mut a, mut b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.connection_id(), b.connection_id());

        let mut accepted = vec![ready_rx.recv().await.unwrap(), ready_rx.recv().await.unwrap()];
        for channel in accepted.iter_mut() {
            let reply = sl_core::ShardMessage::Reject {
                reason: channel.pairing_code().to_string(),
            };
            channel.send_message(&reply).await.unwrap();
        }

        for dialed in [&mut a, &mut b] {
            match dialed.expect_message().await.unwrap() {
                sl_core::ShardMessage::Reject { reason } => {
                    assert_eq!(reason, dialed.pairing_code().to_string());
                }
                other => panic!("unexpected message {other:?}"),
            }
        }
        listener.stop().await;
    }

    #[tokio::test]
    async fn stop_sweeps_in_handshake_sockets() {
        let listener = listener(OperatorDecision::Approved);
        let (port, _ready_rx) = listener.start().await.unwrap();

        // A peer that connects but never answers the negotiation frame.
        let mut silent = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(listener.in_handshake_count().await, 1);

        listener.stop().await;
        assert_eq!(listener.in_handshake_count().await, 0);

        let mut buf = [0u8; 256];
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = silent.write_all(b"x").await;
        let read = tokio::time::timeout(Duration::from_secs(1), async {
            use tokio::io::AsyncReadExt;
            loop {
                match silent.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        })
        .await;
        assert!(read.is_ok(), "socket should be closed by stop()");
    }
}
