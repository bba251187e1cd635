use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::{
    BindError, ConnectionState, DependentServiceBinder, DeviceService, ReadyListener, RemoteError,
    ServiceBinder, ServiceError, ServiceEvent, SupervisorConfig, VectorPrinter,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::guard;

/// State, handle and retry counter change together under one lock
struct Link {
    state: ConnectionState,
    service: Option<Arc<dyn DeviceService>>,
    retry: u32,
    // Bumped on every transition into Connected
    generation: u64,
}

/// Current ready listener and the connection it was last notified for
#[derive(Default)]
struct ListenerSlot {
    listener: Option<Arc<dyn ReadyListener>>,
    notified: Option<u64>,
}

struct Shared {
    config: SupervisorConfig,
    binder: Arc<dyn ServiceBinder>,
    dependent: Arc<dyn DependentServiceBinder>,
    runtime: Handle,
    link: Mutex<Link>,
    // Mirrors `link.state == Connected`; written only with `link` held
    connected: AtomicBool,
    lifecycle: Mutex<()>,
    listener: Mutex<ListenerSlot>,
    notify_gate: Mutex<()>,
}

/// Owns the single binding to the remote device service.
///
/// Constructed once by the composition root and shared by cloning; every clone
/// drives the same connection. Lifecycle callbacks from the platform arrive
/// either through [`ConnectionSupervisor::run`] or by calling
/// [`ConnectionSupervisor::on_service_connected`] and
/// [`ConnectionSupervisor::on_service_disconnected`] directly. Both paths are
/// processed one at a time.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionSupervisor {
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; its handle is used to
    /// schedule bind retries.
    pub fn new(
        config: SupervisorConfig,
        binder: Arc<dyn ServiceBinder>,
        dependent: Arc<dyn DependentServiceBinder>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                binder,
                dependent,
                runtime: Handle::current(),
                link: Mutex::new(Link {
                    state: ConnectionState::Disconnected,
                    service: None,
                    retry: 0,
                    generation: 0,
                }),
                connected: AtomicBool::new(false),
                lifecycle: Mutex::new(()),
                listener: Mutex::new(ListenerSlot::default()),
                notify_gate: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.link).state
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Synchronous bind failures since the last successful connection
    pub fn retry_count(&self) -> u32 {
        lock(&self.shared.link).retry
    }

    /// Issue a bind request unless connected or a request is already in flight.
    ///
    /// A synchronous bind failure schedules a delayed retry while the retry
    /// budget lasts and still returns `Ok`. Once the budget is spent the
    /// failure is returned as [`ServiceError::BindRetryExhausted`].
    pub fn connect(&self) -> Result<(), ServiceError> {
        if self.is_connected() {
            return Ok(());
        }

        {
            let mut link = lock(&self.shared.link);
            match link.state.to_connecting() {
                Ok(next) => link.state = next,
                Err(reason) => {
                    debug!(state = %link.state, "Skipping bind: {}", reason);
                    return Ok(());
                }
            }
        }

        let endpoint = &self.shared.config.endpoint;
        info!(endpoint = %endpoint, "🔌 Binding device service...");
        match self.shared.binder.bind(endpoint) {
            Ok(()) => Ok(()),
            Err(e) => self.on_bind_failure(e),
        }
    }

    fn on_bind_failure(&self, error: BindError) -> Result<(), ServiceError> {
        let max = self.shared.config.max_retry_count;
        let retry = {
            let mut link = lock(&self.shared.link);
            if link.state != ConnectionState::Connecting {
                // A platform callback already settled this attempt
                return Ok(());
            }
            link.state = link.state.to_disconnected();
            link.retry = (link.retry + 1).min(max);
            link.retry
        };

        if retry < max {
            warn!(
                error = %error,
                attempt = retry,
                "❌ Bind failed. Rebinding in {:?}...",
                self.shared.config.retry_interval
            );
            self.schedule_retry();
            Ok(())
        } else {
            error!(error = %error, attempts = retry, "❌ Bind failed. No retries left");
            Err(ServiceError::BindRetryExhausted { attempts: max })
        }
    }

    fn schedule_retry(&self) {
        let supervisor = self.clone();
        let deadline = tokio::time::Instant::now() + self.shared.config.retry_interval;
        self.shared.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Err(e) = supervisor.connect() {
                warn!(error = %e, "Scheduled rebind gave up");
            }
        });
    }

    /// Platform callback: the binding is established
    pub fn on_service_connected(&self, service: Arc<dyn DeviceService>) {
        let _serial = lock(&self.shared.lifecycle);
        let generation = {
            let mut link = lock(&self.shared.link);
            link.retry = 0;
            link.state = link.state.to_connected();
            link.service = Some(Arc::clone(&service));
            link.generation += 1;
            self.shared.connected.store(true, Ordering::Release);
            link.generation
        };
        info!(endpoint = %self.shared.config.endpoint, "✅ Device service connected");

        match self.shared.dependent.bind(service) {
            Ok(()) => debug!("Dependent service bound"),
            Err(e) => error!(error = %e, "Dependent service bind failed"),
        }

        self.notify_ready(generation);
    }

    /// Platform callback: the binding was lost. Rebinds immediately.
    pub fn on_service_disconnected(&self) {
        let _serial = lock(&self.shared.lifecycle);
        {
            let mut link = lock(&self.shared.link);
            link.service = None;
            // A bind already in flight stays in flight
            if link.state.is_connected() {
                link.state = link.state.to_disconnected();
            }
            self.shared.connected.store(false, Ordering::Release);
        }
        warn!("⚠️ Device service disconnected. Rebinding...");

        self.shared.dependent.unbind();

        if let Err(e) = self.connect() {
            error!(error = %e, "Automatic rebind failed");
        }
    }

    /// Consume platform lifecycle events in delivery order
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<ServiceEvent>,
        cancel: CancellationToken,
    ) {
        info!("🛰️ Connection supervisor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(ServiceEvent::Connected(service)) => self.on_service_connected(service),
                        Some(ServiceEvent::Disconnected) => self.on_service_disconnected(),
                        None => {
                            info!("🛰️ Service event channel closed. Supervisor shutting down.");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Replace the ready listener. Fires at once if already connected.
    ///
    /// A listener is notified at most once per connection, even when it is
    /// registered while that connection is still being announced. The listener
    /// must not call `register_listener` from `on_ready`.
    pub fn register_listener<L>(&self, listener: L)
    where
        L: ReadyListener + 'static,
    {
        {
            let _gate = lock(&self.shared.notify_gate);
            *lock(&self.shared.listener) = ListenerSlot {
                listener: Some(Arc::new(listener)),
                notified: None,
            };
        }

        let current = {
            let link = lock(&self.shared.link);
            link.state.is_connected().then_some(link.generation)
        };
        if let Some(generation) = current {
            self.notify_ready(generation);
        }
    }

    fn notify_ready(&self, generation: u64) {
        let _gate = lock(&self.shared.notify_gate);
        let listener = {
            let slot = lock(&self.shared.listener);
            if slot.notified == Some(generation) {
                debug!(generation, "Listener already notified for this connection");
                return;
            }
            let Some(listener) = slot.listener.clone() else {
                return;
            };
            listener
        };

        match self.guarded_call(|service| service.version()) {
            Ok(version) => {
                lock(&self.shared.listener).notified = Some(generation);
                info!(version = %version, "📣 Device service ready");
                listener.on_ready(&version);
            }
            Err(e) => warn!(error = %e, "Could not read service version, skipping ready notification"),
        }
    }

    /// Run one remote invocation against the live handle.
    ///
    /// Without a handle this triggers [`connect`](Self::connect) and fails
    /// with [`ServiceError::NotConnected`] instead of waiting. A dead remote
    /// process invalidates the handle.
    pub fn guarded_call<T, F>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&dyn DeviceService) -> Result<T, RemoteError>,
    {
        let current = lock(&self.shared.link).service.clone();
        let Some(service) = current else {
            if let Err(e) = self.connect() {
                warn!(error = %e, "Bind triggered by remote call failed");
            }
            return Err(ServiceError::NotConnected);
        };

        let result = guard::invoke(service.as_ref(), operation);
        if matches!(result, Err(ServiceError::ProcessDead)) {
            self.invalidate(&service);
        }
        result
    }

    fn invalidate(&self, service: &Arc<dyn DeviceService>) {
        let mut link = lock(&self.shared.link);
        let is_current = link
            .service
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, service));
        if is_current {
            link.service = None;
            link.state = link.state.to_disconnected();
            self.shared.connected.store(false, Ordering::Release);
            warn!("💀 Device service process died. Handle invalidated");
        }
    }

    pub fn version(&self) -> Result<String, ServiceError> {
        self.guarded_call(|service| service.version())
    }

    pub fn debug_log(&self, enabled: bool) -> Result<(), ServiceError> {
        self.guarded_call(|service| service.debug_log(enabled))
    }

    pub fn register(&self, use_epay_module: bool) -> Result<(), ServiceError> {
        self.guarded_call(|service| service.register(use_epay_module))
    }

    pub fn unregister(&self) -> Result<(), ServiceError> {
        self.guarded_call(|service| service.unregister())
    }

    pub fn vector_printer(&self) -> Result<Arc<dyn VectorPrinter>, ServiceError> {
        self.guarded_call(|service| service.vector_printer())
    }
}
