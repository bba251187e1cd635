use application::ConnectionSupervisor;
use domain::{
    BindError, ConnectionState, DependentServiceBinder, DeviceService, RemoteError,
    ServiceBinder, ServiceEndpoint, ServiceError, ServiceEvent, SupervisorConfig, VectorPrinter,
};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// --- Platform fakes ---

/// Rejects the next `failures` bind requests, accepts the rest
struct ScriptedBinder {
    failures: AtomicUsize,
    requests: AtomicUsize,
}

impl ScriptedBinder {
    fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            requests: AtomicUsize::new(0),
        })
    }

    fn accepting() -> Arc<Self> {
        Self::failing(0)
    }

    fn fail_next(&self, failures: usize) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ServiceBinder for ScriptedBinder {
    fn bind(&self, endpoint: &ServiceEndpoint) -> Result<(), BindError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            Err(BindError::ServiceNotFound(endpoint.to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct CountingDependent {
    binds: AtomicUsize,
    unbinds: AtomicUsize,
}

impl DependentServiceBinder for CountingDependent {
    fn bind(&self, _service: Arc<dyn DeviceService>) -> Result<(), BindError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unbind(&self) {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
    }
}

mock! {
    Dependent {}
    impl DependentServiceBinder for Dependent {
        fn bind(&self, service: Arc<dyn DeviceService>) -> Result<(), BindError>;
        fn unbind(&self);
    }
}

struct FakeService {
    version: Result<String, RemoteError>,
    register: Result<(), RemoteError>,
}

impl FakeService {
    fn healthy(version: &str) -> Arc<Self> {
        Arc::new(Self {
            version: Ok(version.to_string()),
            register: Ok(()),
        })
    }
}

impl DeviceService for FakeService {
    fn version(&self) -> Result<String, RemoteError> {
        self.version.clone()
    }

    fn debug_log(&self, _enabled: bool) -> Result<(), RemoteError> {
        Err(RemoteError::Security("debug log requires system uid".to_string()))
    }

    fn register(&self, _use_epay_module: bool) -> Result<(), RemoteError> {
        self.register.clone()
    }

    fn unregister(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    fn vector_printer(&self) -> Result<Arc<dyn VectorPrinter>, RemoteError> {
        Err(RemoteError::Remote("no printer on this device".to_string()))
    }
}

// --- Helpers ---

fn supervisor(binder: Arc<ScriptedBinder>) -> (ConnectionSupervisor, Arc<CountingDependent>) {
    let dependent = Arc::new(CountingDependent::default());
    let supervisor =
        ConnectionSupervisor::new(SupervisorConfig::default(), binder, dependent.clone());
    (supervisor, dependent)
}

fn recorder(supervisor: &ConnectionSupervisor) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    supervisor.register_listener(move |version: &str| {
        sink.lock().unwrap().push(version.to_string());
    });
    seen
}

/// Let spawned retry tasks run
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

// --- Tests ---

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent_while_connected() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder.clone());

    supervisor.connect().unwrap();
    supervisor.on_service_connected(FakeService::healthy("1.0.0"));

    for _ in 0..3 {
        supervisor.connect().unwrap();
    }

    assert_eq!(binder.requests(), 1);
    assert_eq!(supervisor.state(), ConnectionState::Connected);
    assert_eq!(supervisor.retry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_bind_in_flight_issues_no_duplicate() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder.clone());

    supervisor.connect().unwrap();
    supervisor.connect().unwrap();

    assert_eq!(binder.requests(), 1);
    assert_eq!(supervisor.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn test_single_bind_failure_retries_after_interval() {
    let binder = ScriptedBinder::failing(1);
    let (supervisor, _) = supervisor(binder.clone());
    let seen = recorder(&supervisor);

    supervisor.connect().unwrap();
    settle().await;

    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(supervisor.retry_count(), 1);
    assert_eq!(binder.requests(), 1);

    // Nothing happens before the retry interval
    advance(2999).await;
    assert_eq!(binder.requests(), 1);

    advance(1).await;
    assert_eq!(binder.requests(), 2);
    assert_eq!(supervisor.state(), ConnectionState::Connecting);

    supervisor.on_service_connected(FakeService::healthy("2.4.1"));

    assert_eq!(supervisor.state(), ConnectionState::Connected);
    assert_eq!(supervisor.retry_count(), 0);
    assert_eq!(*seen.lock().unwrap(), vec!["2.4.1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_retries_stop_after_max_failures() {
    let binder = ScriptedBinder::failing(usize::MAX);
    let (supervisor, _) = supervisor(binder.clone());

    supervisor.connect().unwrap();
    settle().await;
    assert_eq!(supervisor.retry_count(), 1);

    advance(3000).await;
    assert_eq!(binder.requests(), 2);
    assert_eq!(supervisor.retry_count(), 2);

    advance(3000).await;
    assert_eq!(binder.requests(), 3);
    assert_eq!(supervisor.retry_count(), 3);

    // Budget spent: no more automatic attempts
    advance(30_000).await;
    assert_eq!(binder.requests(), 3);
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);

    // An explicit connect gets exactly one more attempt
    let result = supervisor.connect();
    assert_eq!(result, Err(ServiceError::BindRetryExhausted { attempts: 3 }));
    assert_eq!(binder.requests(), 4);
    assert_eq!(supervisor.retry_count(), 3);

    advance(30_000).await;
    assert_eq!(binder.requests(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_is_reported_to_the_caller() {
    let binder = ScriptedBinder::failing(usize::MAX);
    let config = SupervisorConfig {
        max_retry_count: 1,
        ..SupervisorConfig::default()
    };
    let supervisor = ConnectionSupervisor::new(
        config,
        binder.clone(),
        Arc::new(CountingDependent::default()),
    );

    assert_eq!(
        supervisor.connect(),
        Err(ServiceError::BindRetryExhausted { attempts: 1 })
    );

    advance(10_000).await;
    assert_eq!(binder.requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_successful_connection_resets_retry_counter() {
    let binder = ScriptedBinder::failing(2);
    let (supervisor, _) = supervisor(binder.clone());

    supervisor.connect().unwrap();
    settle().await;
    advance(3000).await;
    assert_eq!(supervisor.retry_count(), 2);

    advance(3000).await;
    assert_eq!(binder.requests(), 3);
    supervisor.on_service_connected(FakeService::healthy("1.0.0"));
    assert_eq!(supervisor.retry_count(), 0);

    // A new failure run counts up from zero again
    binder.fail_next(usize::MAX);
    supervisor.on_service_disconnected();
    assert_eq!(binder.requests(), 4);
    assert_eq!(supervisor.retry_count(), 1);
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_listener_registered_while_disconnected_waits_for_connection() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder);
    let seen = recorder(&supervisor);

    assert!(seen.lock().unwrap().is_empty());

    supervisor.connect().unwrap();
    assert!(seen.lock().unwrap().is_empty());

    supervisor.on_service_connected(FakeService::healthy("5.0.0"));
    assert_eq!(*seen.lock().unwrap(), vec!["5.0.0".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_listener_registered_while_connected_fires_once_immediately() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder);

    supervisor.connect().unwrap();
    supervisor.on_service_connected(FakeService::healthy("5.1.0"));

    let seen = recorder(&supervisor);
    assert_eq!(*seen.lock().unwrap(), vec!["5.1.0".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_last_registered_listener_wins() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder);

    let first = recorder(&supervisor);
    let second = recorder(&supervisor);

    supervisor.connect().unwrap();
    supervisor.on_service_connected(FakeService::healthy("1.2.3"));

    assert!(first.lock().unwrap().is_empty());
    assert_eq!(second.lock().unwrap().len(), 1);
}

/// Registers a ready listener while the connection is being announced
#[derive(Default)]
struct RegisteringDependent {
    supervisor: Mutex<Option<ConnectionSupervisor>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl DependentServiceBinder for RegisteringDependent {
    fn bind(&self, _service: Arc<dyn DeviceService>) -> Result<(), BindError> {
        let supervisor = self.supervisor.lock().unwrap().take();
        if let Some(supervisor) = supervisor {
            let sink = self.seen.clone();
            supervisor.register_listener(move |version: &str| {
                sink.lock().unwrap().push(version.to_string());
            });
        }
        Ok(())
    }

    fn unbind(&self) {}
}

#[tokio::test(start_paused = true)]
async fn test_listener_registered_during_connection_is_notified_once() {
    let binder = ScriptedBinder::accepting();
    let dependent = Arc::new(RegisteringDependent::default());
    let supervisor =
        ConnectionSupervisor::new(SupervisorConfig::default(), binder, dependent.clone());
    *dependent.supervisor.lock().unwrap() = Some(supervisor.clone());

    supervisor.connect().unwrap();
    supervisor.on_service_connected(FakeService::healthy("1.0"));

    assert_eq!(*dependent.seen.lock().unwrap(), vec!["1.0".to_string()]);

    // The next connection notifies it again, once
    supervisor.on_service_disconnected();
    supervisor.on_service_connected(FakeService::healthy("1.1"));
    assert_eq!(
        *dependent.seen.lock().unwrap(),
        vec!["1.0".to_string(), "1.1".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_version_failure_skips_notification_but_stays_connected() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder);
    let seen = recorder(&supervisor);

    supervisor.connect().unwrap();
    supervisor.on_service_connected(Arc::new(FakeService {
        version: Err(RemoteError::Remote("version unavailable".to_string())),
        register: Ok(()),
    }));

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(supervisor.state(), ConnectionState::Connected);
    assert!(supervisor.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_dependent_bind_failure_does_not_roll_back_connection() {
    let binder = ScriptedBinder::accepting();
    let mut dependent = MockDependent::new();
    dependent
        .expect_bind()
        .times(1)
        .returning(|_| Err(BindError::Rejected("limited service missing".to_string())));
    dependent.expect_unbind().times(0);

    let supervisor =
        ConnectionSupervisor::new(SupervisorConfig::default(), binder, Arc::new(dependent));
    let seen = recorder(&supervisor);

    supervisor.connect().unwrap();
    supervisor.on_service_connected(FakeService::healthy("7.0.0"));

    assert_eq!(supervisor.state(), ConnectionState::Connected);
    assert_eq!(*seen.lock().unwrap(), vec!["7.0.0".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_guarded_call_while_disconnected_binds_exactly_once() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder.clone());

    let result = supervisor.guarded_call(|service| service.version());
    assert_eq!(result, Err(ServiceError::NotConnected));
    assert_eq!(binder.requests(), 1);

    let result = supervisor.guarded_call(|service| service.version());
    assert_eq!(result, Err(ServiceError::NotConnected));
    assert_eq!(binder.requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dead_process_invalidates_handle() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder.clone());

    supervisor.connect().unwrap();
    supervisor.on_service_connected(Arc::new(FakeService {
        version: Ok("1.0.0".to_string()),
        register: Err(RemoteError::DeadObject),
    }));

    assert_eq!(supervisor.register(true), Err(ServiceError::ProcessDead));
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert!(!supervisor.is_connected());

    // No stale success from the old handle
    assert_eq!(supervisor.version(), Err(ServiceError::NotConnected));
    assert_eq!(binder.requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures_carry_diagnostics() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, _) = supervisor(binder);

    supervisor.connect().unwrap();
    supervisor.on_service_connected(FakeService::healthy("1.0.0"));

    assert_eq!(
        supervisor.debug_log(true),
        Err(ServiceError::TransportFailure(
            "debug log requires system uid".to_string()
        ))
    );
    assert_eq!(
        supervisor.vector_printer().err(),
        Some(ServiceError::TransportFailure(
            "no printer on this device".to_string()
        ))
    );
    assert_eq!(supervisor.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_handle_and_rebinds() {
    let binder = ScriptedBinder::accepting();
    let (supervisor, dependent) = supervisor(binder.clone());
    let seen = recorder(&supervisor);

    supervisor.connect().unwrap();
    supervisor.on_service_connected(FakeService::healthy("1.0.0"));
    assert_eq!(dependent.binds.load(Ordering::SeqCst), 1);

    supervisor.on_service_disconnected();

    assert_eq!(dependent.unbinds.load(Ordering::SeqCst), 1);
    assert_eq!(binder.requests(), 2);
    assert_eq!(supervisor.state(), ConnectionState::Connecting);
    assert_eq!(supervisor.version(), Err(ServiceError::NotConnected));

    supervisor.on_service_connected(FakeService::healthy("1.0.1"));
    assert_eq!(supervisor.state(), ConnectionState::Connected);
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["1.0.0".to_string(), "1.0.1".to_string()]
    );
}

// --- Event pump ---

/// Platform that reports every accepted bind as established
struct LoopbackBinder {
    events: mpsc::UnboundedSender<ServiceEvent>,
    service: Arc<FakeService>,
    requests: AtomicUsize,
}

impl ServiceBinder for LoopbackBinder {
    fn bind(&self, _endpoint: &ServiceEndpoint) -> Result<(), BindError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let service: Arc<dyn DeviceService> = self.service.clone();
        let _ = self.events.send(ServiceEvent::Connected(service));
        Ok(())
    }
}

#[tokio::test]
async fn test_self_healing_after_asynchronous_disconnect() {
    let (tx, rx) = mpsc::unbounded_channel();
    let binder = Arc::new(LoopbackBinder {
        events: tx.clone(),
        service: FakeService::healthy("8.8.8"),
        requests: AtomicUsize::new(0),
    });
    let supervisor = ConnectionSupervisor::new(
        SupervisorConfig::default(),
        binder.clone(),
        Arc::new(CountingDependent::default()),
    );

    let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
    supervisor.register_listener(move |version: &str| {
        let _ = ready_tx.send(version.to_string());
    });

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(supervisor.clone().run(rx, cancel.clone()));

    supervisor.connect().unwrap();
    assert_eq!(ready_rx.recv().await.unwrap(), "8.8.8");
    assert!(supervisor.is_connected());

    // Platform drops the binding; the supervisor must come back on its own
    tx.send(ServiceEvent::Disconnected).unwrap();
    assert_eq!(ready_rx.recv().await.unwrap(), "8.8.8");

    assert!(supervisor.is_connected());
    assert_eq!(binder.requests.load(Ordering::SeqCst), 2);

    cancel.cancel();
    handle.await.unwrap();
}
