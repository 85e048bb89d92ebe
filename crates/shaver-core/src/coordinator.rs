//! Live/poll connection coordinator.
//!
//! One [`Coordinator`] per shaver. It owns the device's snapshot, connection
//! lease, backoff and capability gate, and runs two tasks:
//!
//! - the **live loop**, which keeps trying to hold a notified session open
//!   and backs off between failures;
//! - the **poll loop**, which does a short connect-read-disconnect cycle
//!   whenever no live session exists and no data arrived within the poll
//!   interval.
//!
//! Both feed decoded values into the same merge-and-publish path. The lease
//! guards opening and closing a connection. Polls skip when it is busy. The
//! live loop waits for it, releases it once its session is established and
//! takes it again for teardown.
//!
//! ```text
//!            ┌──────────────── poll timer ───────────────┐
//!            ▼                                           │
//!  Idle ─► Acquiring ─► PollConnecting ─► Idle ──────────┘
//!   │
//!   └──► Acquiring ─► LiveConnecting ─► LiveActive ─► BackoffWait ─┐
//!            ▲                                                     │
//!            └─────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shaver_types::{Capabilities, Capability, LightZone, Rgb, ShavingMode, decode, uuids};

use crate::error::{Error, Result};
use crate::events::{
    DeviceEvent, DisconnectReason, EventDispatcher, EventReceiver, PollSkipReason,
};
use crate::lease::ConnectionLease;
use crate::reconnect::{Backoff, BackoffOptions};
use crate::snapshot::{Field, FieldUpdates, Snapshot, SnapshotStore};
use crate::table::{self, CharacteristicSpec, DecodeFn};
use crate::traits::{DisconnectCallback, GattSession, NotifyCallback, ShaverTransport};

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Longest accepted poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(300);
/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Options for a [`Coordinator`].
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorOptions {
    /// Time between poll attempts, measured from the end of the previous one.
    pub poll_interval: Duration,
    /// Run the live loop. Without it the device is only polled.
    pub enable_live_updates: bool,
    /// Timeout for opening a session.
    pub connect_timeout: Duration,
    /// Timeout for each read, write, subscribe and disconnect.
    pub operation_timeout: Duration,
    /// Battery read cadence on a live session.
    pub keep_alive_interval: Duration,
    /// How long the device stays available without fresh data.
    pub staleness_window: Duration,
    /// Live loop retry delays.
    pub backoff: BackoffOptions,
    /// Capability bits known from pairing; 0 means read them from the device.
    pub capabilities: u32,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            enable_live_updates: true,
            connect_timeout: Duration::from_secs(15),
            operation_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::from_secs(30),
            staleness_window: Duration::from_secs(300),
            backoff: BackoffOptions::default(),
            capabilities: 0,
        }
    }
}

impl CoordinatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn enable_live_updates(mut self, enabled: bool) -> Self {
        self.enable_live_updates = enabled;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    #[must_use]
    pub fn staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffOptions) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn capabilities(mut self, bits: u32) -> Self {
        self.capabilities = bits;
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL).contains(&self.poll_interval) {
            return Err(Error::invalid_config(format!(
                "poll interval must be between {}s and {}s, got {}s",
                MIN_POLL_INTERVAL.as_secs(),
                MAX_POLL_INTERVAL.as_secs(),
                self.poll_interval.as_secs()
            )));
        }
        for (name, value) in [
            ("connect timeout", self.connect_timeout),
            ("operation timeout", self.operation_timeout),
            ("keep-alive interval", self.keep_alive_interval),
            ("staleness window", self.staleness_window),
        ] {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{name} must be > 0")));
            }
        }
        self.backoff.validate()
    }
}

/// What the coordinator is doing with the link right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Idle,
    /// Waiting for the connection lease.
    Acquiring,
    LiveConnecting,
    /// A live session is held and subscribed.
    LiveActive,
    PollConnecting,
    /// The live loop is waiting out its backoff delay.
    BackoffWait,
}

impl LinkState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Acquiring => "acquiring",
            LinkState::LiveConnecting => "live_connecting",
            LinkState::LiveActive => "live_active",
            LinkState::PollConnecting => "poll_connecting",
            LinkState::BackoffWait => "backoff_wait",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The session was opened; `fields` values were decoded.
    Completed { fields: usize },
    Skipped(PollSkipReason),
    /// The session could not be opened.
    Failed(String),
    Cancelled,
}

/// The single merge-and-publish entry point shared by polls, the live bulk
/// read, notifications and local writes.
#[derive(Debug, Clone)]
struct Publisher {
    address: Arc<str>,
    store: SnapshotStore,
    /// Time of the last decoded value, changed or not.
    last_contact: Arc<watch::Sender<Option<Instant>>>,
    events: EventDispatcher,
}

impl Publisher {
    fn publish(&self, updates: &FieldUpdates) -> Vec<Field> {
        if updates.is_empty() {
            return Vec::new();
        }
        self.last_contact.send_replace(Some(Instant::now()));
        let changed = self.store.merge(updates);
        if !changed.is_empty() {
            debug!(address = %self.address, ?changed, "Snapshot updated");
            self.events.send(DeviceEvent::SnapshotUpdated {
                address: self.address.to_string(),
                changed: changed.clone(),
            });
        }
        changed
    }

    fn last_contact(&self) -> Option<Instant> {
        *self.last_contact.borrow()
    }
}

/// Decodes notifications of one characteristic into the snapshot.
#[derive(Debug, Clone)]
pub struct NotificationHandler {
    characteristic: Uuid,
    field: Field,
    decode: DecodeFn,
    publisher: Publisher,
}

impl NotificationHandler {
    fn new(spec: &CharacteristicSpec, publisher: Publisher) -> Self {
        Self {
            characteristic: spec.uuid,
            field: spec.field,
            decode: spec.decode,
            publisher,
        }
    }

    #[must_use]
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    #[must_use]
    pub fn field(&self) -> Field {
        self.field
    }

    /// Decode one payload and publish it. Returns the fields that changed.
    pub fn handle(&self, data: &[u8]) -> Vec<Field> {
        let updates = (self.decode)(data);
        if updates.is_empty() {
            debug!(field = %self.field, len = data.len(), "Notification decoded to nothing");
        }
        self.publisher.publish(&updates)
    }

    fn into_callback(self) -> NotifyCallback {
        Box::new(move |data| {
            self.handle(data);
        })
    }
}

struct Shared {
    address: String,
    options: CoordinatorOptions,
    transport: Arc<dyn ShaverTransport>,
    publisher: Publisher,
    lease: ConnectionLease,
    live: RwLock<Option<Arc<dyn GattSession>>>,
    capabilities: OnceLock<Capabilities>,
    link: watch::Sender<LinkState>,
    cancel: CancellationToken,
}

enum LiveOutcome {
    NotObservable,
    ConnectFailed,
    Ended(DisconnectReason),
    Cancelled,
}

impl Shared {
    fn set_link(&self, state: LinkState) {
        self.link.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities.get().copied()
    }

    async fn live_session(&self) -> Option<Arc<dyn GattSession>> {
        self.live.read().await.clone()
    }

    async fn has_live_session(&self) -> bool {
        match self.live_session().await {
            Some(session) => session.is_connected().await,
            None => false,
        }
    }

    async fn read(&self, session: &dyn GattSession, characteristic: Uuid) -> Result<Vec<u8>> {
        let limit = self.options.operation_timeout;
        timeout(limit, session.read(characteristic))
            .await
            .map_err(|_| Error::timeout(format!("read {characteristic}"), limit))?
    }

    /// Read every entry; failures leave their fields out of the result.
    async fn read_batch<'a>(
        &self,
        session: &dyn GattSession,
        specs: impl Iterator<Item = &'a CharacteristicSpec>,
    ) -> FieldUpdates {
        let mut updates = FieldUpdates::new();
        for spec in specs {
            match self.read(session, spec.uuid).await {
                Ok(data) => {
                    let decoded = (spec.decode)(&data);
                    if decoded.is_empty() {
                        debug!(field = %spec.field, len = data.len(), "Payload decoded to nothing");
                    }
                    updates.extend(decoded);
                }
                Err(e) => warn!(field = %spec.field, error = %e, "Read failed"),
            }
        }
        updates
    }

    /// The capability gate: configured bits, or one read from the device
    /// the first time a session allows it.
    async fn ensure_capabilities(&self, session: &dyn GattSession) -> Option<Capabilities> {
        if let Some(caps) = self.capabilities() {
            return Some(caps);
        }
        let data = match self.read(session, uuids::CAPABILITIES).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Capability read failed, optional features stay disabled");
                return None;
            }
        };
        let Some(decoded) = decode::capabilities(&data) else {
            warn!("Capability characteristic returned no data");
            return None;
        };
        let caps = *self.capabilities.get_or_init(|| decoded);
        info!(bits = caps.bits(), "Capabilities derived from device");
        self.publisher
            .publish(&FieldUpdates::single(Field::Capabilities, Some(caps.bits().into())));
        Some(caps)
    }

    // --- Poll path ---

    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    async fn poll_once(&self) -> PollOutcome {
        if self.cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        if self.has_live_session().await {
            return self.skip_poll(PollSkipReason::LiveSessionActive);
        }
        if let Some(at) = self.publisher.last_contact()
            && at.elapsed() < self.options.poll_interval
        {
            return self.skip_poll(PollSkipReason::RecentData);
        }
        let Some(_lease) = self.lease.try_acquire() else {
            return self.skip_poll(PollSkipReason::LeaseBusy);
        };
        // A dropped live session keeps its slot until teardown, which
        // holds the lease.
        if self.live.read().await.is_some() {
            return self.skip_poll(PollSkipReason::LiveSessionActive);
        }
        if self.transport.is_device_observable(&self.address).await.is_none() {
            return self.skip_poll(PollSkipReason::NotObservable);
        }

        let previous = *self.link.borrow();
        self.set_link(LinkState::PollConnecting);
        let outcome = self.poll_session().await;
        self.link.send_if_modified(|current| {
            if *current == LinkState::PollConnecting {
                *current = previous;
                true
            } else {
                false
            }
        });
        outcome
    }

    fn skip_poll(&self, reason: PollSkipReason) -> PollOutcome {
        debug!(?reason, "Poll skipped");
        self.publisher.events.send(DeviceEvent::PollSkipped {
            address: self.address.clone(),
            reason,
        });
        PollOutcome::Skipped(reason)
    }

    async fn poll_session(&self) -> PollOutcome {
        let on_disconnect: DisconnectCallback = Arc::new(|| {});
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return PollOutcome::Cancelled,
            r = self.transport.open_session(&self.address, on_disconnect, self.options.connect_timeout) => r,
        };
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Poll connect failed");
                self.publisher.events.send(DeviceEvent::ConnectFailed {
                    address: self.address.clone(),
                    error: e.to_string(),
                });
                return PollOutcome::Failed(e.to_string());
            }
        };

        let updates = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            u = async {
                let caps = self.ensure_capabilities(session.as_ref()).await;
                self.read_batch(session.as_ref(), table::poll_set(caps.as_ref())).await
            } => Some(u),
        };
        if let Some(updates) = &updates {
            self.publisher.publish(updates);
        }
        self.disconnect(session.as_ref()).await;

        match updates {
            Some(updates) => {
                info!(fields = updates.len(), "Poll completed");
                self.publisher.events.send(DeviceEvent::PollCompleted {
                    address: self.address.clone(),
                    fields: updates.len(),
                });
                PollOutcome::Completed {
                    fields: updates.len(),
                }
            }
            None => PollOutcome::Cancelled,
        }
    }

    // --- Live path ---

    #[tracing::instrument(level = "debug", skip_all, fields(address = %self.address))]
    async fn live_attempt(&self, backoff: &mut Backoff) -> LiveOutcome {
        self.set_link(LinkState::Acquiring);
        let lease = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return LiveOutcome::Cancelled,
            guard = self.lease.acquire() => guard,
        };
        if self.transport.is_device_observable(&self.address).await.is_none() {
            debug!("Device not in range");
            return LiveOutcome::NotObservable;
        }

        self.set_link(LinkState::LiveConnecting);
        info!("Establishing live connection");
        let link_lost = self.cancel.child_token();
        let on_disconnect: DisconnectCallback = {
            let link_lost = link_lost.clone();
            Arc::new(move || link_lost.cancel())
        };
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return LiveOutcome::Cancelled,
            r = self.transport.open_session(&self.address, on_disconnect, self.options.connect_timeout) => r,
        };
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Live connect failed");
                self.publisher.events.send(DeviceEvent::ConnectFailed {
                    address: self.address.clone(),
                    error: e.to_string(),
                });
                return LiveOutcome::ConnectFailed;
            }
        };
        backoff.reset();
        *self.live.write().await = Some(Arc::clone(&session));

        let established = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.establish_live(session.as_ref()) => true,
        };
        drop(lease);

        let reason = if established {
            self.set_link(LinkState::LiveActive);
            info!("Live monitoring active, polling paused");
            self.publisher.events.send(DeviceEvent::LiveConnected {
                address: self.address.clone(),
            });
            self.hold(session.as_ref(), &link_lost).await
        } else {
            DisconnectReason::Shutdown
        };

        self.teardown(session.as_ref()).await;
        info!(?reason, "Live connection ended");
        self.publisher.events.send(DeviceEvent::LiveDisconnected {
            address: self.address.clone(),
            reason: reason.clone(),
        });
        match reason {
            DisconnectReason::Shutdown => LiveOutcome::Cancelled,
            other => LiveOutcome::Ended(other),
        }
    }

    /// Bulk read the live set, then subscribe to every notifying entry.
    async fn establish_live(&self, session: &dyn GattSession) {
        let caps = self.ensure_capabilities(session).await;
        let updates = self.read_batch(session, table::live_set(caps.as_ref())).await;
        debug!(fields = updates.len(), "Live initial read");
        self.publisher.publish(&updates);

        let limit = self.options.operation_timeout;
        for spec in table::notify_set(caps.as_ref()) {
            let handler = NotificationHandler::new(spec, self.publisher.clone());
            match timeout(limit, session.subscribe(spec.uuid, handler.into_callback())).await {
                Ok(Ok(())) => debug!(field = %spec.field, "Subscribed"),
                Ok(Err(e)) => warn!(field = %spec.field, error = %e, "Subscribe failed"),
                Err(_) => warn!(field = %spec.field, "Subscribe timed out"),
            }
        }
    }

    /// Block until the session ends, reading the battery as keep-alive.
    async fn hold(
        &self,
        session: &dyn GattSession,
        link_lost: &CancellationToken,
    ) -> DisconnectReason {
        let period = self.options.keep_alive_interval;
        let mut keep_alive = tokio::time::interval_at(Instant::now() + period, period);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return DisconnectReason::Shutdown,
                _ = link_lost.cancelled() => return DisconnectReason::Remote,
                _ = keep_alive.tick() => {
                    let read = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return DisconnectReason::Shutdown,
                        _ = link_lost.cancelled() => return DisconnectReason::Remote,
                        r = self.read(session, uuids::BATTERY_LEVEL) => r,
                    };
                    match read {
                        Ok(data) => {
                            self.publisher.publish(&table::decode(uuids::BATTERY_LEVEL, &data));
                        }
                        Err(e) => {
                            warn!(error = %e, "Keep-alive read failed");
                            return DisconnectReason::KeepAliveFailed(e.to_string());
                        }
                    }
                }
            }
        }
    }

    /// Unsubscribe everything, close the session and forget it. Errors are
    /// ignored. The lease is held until the session is forgotten.
    async fn teardown(&self, session: &dyn GattSession) {
        let _lease = self.lease.acquire().await;
        if session.is_connected().await {
            let limit = self.options.operation_timeout;
            for spec in table::notify_set(self.capabilities().as_ref()) {
                if let Ok(Err(e)) = timeout(limit, session.unsubscribe(spec.uuid)).await {
                    debug!(field = %spec.field, error = %e, "Unsubscribe failed");
                }
            }
        }
        self.disconnect(session).await;
        self.live.write().await.take();
    }

    async fn disconnect(&self, session: &dyn GattSession) {
        match timeout(self.options.operation_timeout, session.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Disconnect failed"),
            Err(_) => debug!("Disconnect timed out"),
        }
    }

    // --- Writes ---

    /// Writes need a connected live session and a coordinator that is not
    /// shutting down.
    async fn writable_session(&self) -> Result<Arc<dyn GattSession>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.live_session().await {
            Some(session) if session.is_connected().await => Ok(session),
            _ => Err(Error::NotConnected),
        }
    }

    async fn write(&self, characteristic: Uuid, data: &[u8], updates: FieldUpdates) -> Result<()> {
        let session = self.writable_session().await?;
        let limit = self.options.operation_timeout;
        let written = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            r = timeout(limit, session.write(characteristic, data)) => r,
        };
        written.map_err(|_| Error::timeout(format!("write {characteristic}"), limit))??;
        self.publisher.publish(&updates);
        Ok(())
    }
}

async fn run_live_loop(shared: Arc<Shared>) {
    let mut backoff = Backoff::new(shared.options.backoff.clone());
    loop {
        match shared.live_attempt(&mut backoff).await {
            LiveOutcome::Cancelled => break,
            LiveOutcome::NotObservable => {
                debug!(address = %shared.address, "Live attempt skipped, not observable")
            }
            LiveOutcome::ConnectFailed => {}
            LiveOutcome::Ended(reason) => {
                debug!(address = %shared.address, ?reason, "Live session over")
            }
        }
        let delay = backoff.advance();
        shared.set_link(LinkState::BackoffWait);
        debug!(
            address = %shared.address,
            delay_secs = delay.as_secs_f64(),
            "Retrying live connection later"
        );
        shared.publisher.events.send(DeviceEvent::BackoffScheduled {
            address: shared.address.clone(),
            delay,
        });
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    shared.set_link(LinkState::Idle);
    debug!(address = %shared.address, "Live loop stopped");
}

async fn run_poll_loop(shared: Arc<Shared>) {
    loop {
        if let PollOutcome::Cancelled = shared.poll_once().await {
            break;
        }
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.options.poll_interval) => {}
        }
    }
    debug!(address = %shared.address, "Poll loop stopped");
}

/// Owns the connection and state of one shaver.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use shaver_core::{Coordinator, CoordinatorOptions, MockTransport};
///
/// #[tokio::main]
/// async fn main() -> shaver_core::Result<()> {
///     let transport = Arc::new(MockTransport::new());
///     let coordinator = Coordinator::new(
///         transport.address(),
///         transport.clone(),
///         CoordinatorOptions::default().enable_live_updates(false),
///     )?;
///     coordinator.poll_once().await;
///     assert_eq!(coordinator.snapshot().battery(), Some(85));
///     coordinator.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Coordinator {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("address", &self.shared.address)
            .field("link_state", &*self.shared.link.borrow())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator. Nothing runs until [`start`](Self::start).
    pub fn new(
        address: impl Into<String>,
        transport: Arc<dyn ShaverTransport>,
        options: CoordinatorOptions,
    ) -> Result<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(Error::invalid_config("device address must not be empty"));
        }
        options.validate()?;

        let publisher = Publisher {
            address: Arc::from(address.as_str()),
            store: SnapshotStore::new(),
            last_contact: Arc::new(watch::channel(None).0),
            events: EventDispatcher::default(),
        };
        let capabilities = OnceLock::new();
        if options.capabilities != 0 {
            let caps = Capabilities::from_bits(options.capabilities.into());
            let _ = capabilities.set(caps);
            publisher
                .store
                .merge(&FieldUpdates::single(Field::Capabilities, Some(caps.bits().into())));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                address,
                options,
                transport,
                publisher,
                lease: ConnectionLease::new(),
                live: RwLock::new(None),
                capabilities,
                link: watch::channel(LinkState::Idle).0,
                cancel: CancellationToken::new(),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the poll loop (first attempt immediately) and, if enabled, the
    /// live loop. Calling it again does nothing.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.shared.address))]
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() || self.shared.cancel.is_cancelled() {
            return;
        }
        tasks.push(tokio::spawn(run_poll_loop(Arc::clone(&self.shared))));
        if self.shared.options.enable_live_updates {
            tasks.push(tokio::spawn(run_live_loop(Arc::clone(&self.shared))));
        }
        info!(
            live = self.shared.options.enable_live_updates,
            poll_secs = self.shared.options.poll_interval.as_secs(),
            "Coordinator started"
        );
    }

    /// Stop both loops and wait for them. A held live session is
    /// unsubscribed and disconnected on the way out.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.shared.address))]
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Coordinator task ended abnormally");
            }
        }
        if let Some(session) = self.shared.live_session().await {
            self.shared.teardown(session.as_ref()).await;
        }
        self.shared.set_link(LinkState::Idle);
        info!("Coordinator stopped");
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    #[must_use]
    pub fn options(&self) -> &CoordinatorOptions {
        &self.shared.options
    }

    /// The latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.publisher.store.current()
    }

    /// Receiver notified on every publish.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.shared.publisher.store.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> EventReceiver {
        self.shared.publisher.events.subscribe()
    }

    #[must_use]
    pub fn link_state(&self) -> LinkState {
        *self.shared.link.borrow()
    }

    #[must_use]
    pub fn watch_link_state(&self) -> watch::Receiver<LinkState> {
        self.shared.link.subscribe()
    }

    /// Capabilities, once configured or read from the device.
    #[must_use]
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.shared.capabilities()
    }

    /// Time of the last decoded value, whether it changed anything or not.
    #[must_use]
    pub fn last_contact(&self) -> Option<Instant> {
        self.shared.publisher.last_contact()
    }

    /// Whether a connected live session is held.
    pub async fn is_live(&self) -> bool {
        self.shared.has_live_session().await
    }

    /// A live session is held, or data arrived within the staleness window.
    pub async fn is_available(&self, now: Instant) -> bool {
        if self.is_live().await {
            return true;
        }
        self.last_contact()
            .is_some_and(|at| now.saturating_duration_since(at) <= self.shared.options.staleness_window)
    }

    /// Run one poll attempt now, subject to the usual skip rules.
    pub async fn poll_once(&self) -> PollOutcome {
        self.shared.poll_once().await
    }

    /// Set the colour of one light ring zone.
    ///
    /// Needs a live session and the light ring capability. Fails with
    /// [`Error::Cancelled`] once shutdown has begun.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.shared.address))]
    pub async fn set_light_color(&self, zone: LightZone, color: Rgb) -> Result<()> {
        self.shared.writable_session().await?;
        if !self
            .capabilities()
            .is_some_and(|caps| caps.supports(Capability::LightRing))
        {
            return Err(Error::Unsupported(format!(
                "light ring colour ({zone})"
            )));
        }
        self.shared
            .write(
                zone.characteristic(),
                &color.to_rgba(),
                FieldUpdates::single(Field::color(zone), Some(color.into())),
            )
            .await
    }

    /// Select a shaving mode. Needs a live session.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.shared.address))]
    pub async fn set_shaving_mode(&self, mode: ShavingMode) -> Result<()> {
        let value = mode.write_value()?;
        let mut updates = FieldUpdates::new();
        updates.insert(Field::ShavingMode, mode);
        updates.insert(Field::ShavingModeValue, value);
        self.shared.write(uuids::SHAVING_MODE, &[value], updates).await
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn coordinator(transport: &MockTransport, options: CoordinatorOptions) -> Coordinator {
        Coordinator::new(transport.address(), Arc::new(transport.clone()), options).unwrap()
    }

    #[test]
    fn test_options_validation() {
        assert!(CoordinatorOptions::default().validate().is_ok());
        assert!(
            CoordinatorOptions::default()
                .poll_interval(Duration::from_secs(29))
                .validate()
                .is_err()
        );
        assert!(
            CoordinatorOptions::default()
                .poll_interval(Duration::from_secs(301))
                .validate()
                .is_err()
        );
        assert!(
            CoordinatorOptions::default()
                .poll_interval(Duration::from_secs(300))
                .validate()
                .is_ok()
        );
        let err = CoordinatorOptions::default()
            .keep_alive_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("keep-alive"));
    }

    #[test]
    fn test_new_rejects_empty_address() {
        let transport = MockTransport::new();
        let result = Coordinator::new("  ", Arc::new(transport), CoordinatorOptions::default());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_configured_capabilities_are_used() {
        let transport = MockTransport::new();
        let coordinator = coordinator(
            &transport,
            CoordinatorOptions::default().capabilities(Capability::LightRing.mask()),
        );
        let caps = coordinator.capabilities().unwrap();
        assert!(caps.light_ring);
        assert!(!caps.pressure);
        assert_eq!(
            coordinator.snapshot().uint(Field::Capabilities),
            Some(u64::from(Capability::LightRing.mask()))
        );
    }

    #[tokio::test]
    async fn test_notification_handler_publishes_single_field() {
        let transport = MockTransport::new();
        let coordinator = coordinator(&transport, CoordinatorOptions::default());
        let spec = table::lookup(uuids::DEVICE_STATE).unwrap();
        let handler = NotificationHandler::new(spec, coordinator.shared.publisher.clone());

        assert_eq!(handler.field(), Field::DeviceState);
        assert_eq!(handler.handle(&[0x02]), vec![Field::DeviceState]);
        assert!(handler.handle(&[0x02]).is_empty());
        assert!(handler.handle(&[]).is_empty());
        assert_eq!(
            coordinator.snapshot().device_state(),
            Some(shaver_types::DeviceState::Shaving)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_skipped_while_lease_held() {
        let transport = MockTransport::new();
        let coordinator = coordinator(&transport, CoordinatorOptions::default());
        let lease = coordinator.shared.lease.try_acquire().unwrap();

        assert_eq!(
            coordinator.poll_once().await,
            PollOutcome::Skipped(PollSkipReason::LeaseBusy)
        );
        assert_eq!(transport.sessions_opened(), 0);

        drop(lease);
        assert!(matches!(
            coordinator.poll_once().await,
            PollOutcome::Completed { .. }
        ));
        assert!(!coordinator.shared.lease.is_held());
    }

    #[test]
    fn test_link_state_names() {
        assert_eq!(LinkState::default(), LinkState::Idle);
        assert_eq!(LinkState::LiveActive.to_string(), "live_active");
        assert_eq!(
            serde_json::to_string(&LinkState::BackoffWait).unwrap(),
            r#""backoff_wait""#
        );
    }
}
