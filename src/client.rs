use crate::bus::Bus;
use crate::channel::{ChannelKind, ChannelRef};
use crate::command::Command;
use crate::connection::Connection;
use crate::error::{Result, VbanError};
use crate::kinds::{self, Kind};
use crate::profile::{self, Profile, ProfileStore};
use crate::protocol::{self, TextRequest, MAX_PACKET_SIZE};
use crate::state::StateStore;
use crate::strip::Strip;
use crate::subscription::{EventReceiver, EventSubscriptions, Observer, Observers};
use crate::types::{Event, MixerType, ParamValue};
use crate::values;
use crate::vban::Vban;
use crate::worker;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Pause between channels of a batch so the remote can keep up
const APPLY_DELAY: Duration = Duration::from_millis(1);

/// Time the loops get to observe shutdown before the sockets close
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

const EVENT_BROADCAST_CAPACITY: usize = 100;

/// Session parameters
///
/// Every field has a default, so a config can be deserialized from a
/// partial TOML or JSON document. Durations are given in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote host name or address
    pub ip: String,
    /// Remote UDP port
    pub port: u16,
    /// Local port the response socket binds to (defaults to `port`)
    pub local_port: Option<u16>,
    /// Local address the response socket binds to
    pub bind_address: String,
    /// Outbound VBAN-TEXT stream name, at most 16 bytes
    pub streamname: String,
    /// Serial rate, one of [`protocol::BPS_OPTS`]
    pub bps: u32,
    /// Text sub-channel, 0-255
    pub channel: u16,
    /// Snapshot receive timeout (first snapshot and steady state)
    #[serde(deserialize_with = "seconds")]
    pub timeout: Duration,
    /// Minimum duration of one receiver iteration
    #[serde(deserialize_with = "seconds")]
    pub ratelimit: Duration,
    /// Initial interest in parameter events
    pub pdirty: bool,
    /// Initial interest in level events
    pub ldirty: bool,
    /// Capacity of the receiver to dispatcher event queue
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip: "localhost".to_string(),
            port: 6980,
            local_port: None,
            bind_address: "0.0.0.0".to_string(),
            streamname: "Command1".to_string(),
            bps: 0,
            channel: 0,
            timeout: Duration::from_secs(5),
            ratelimit: Duration::from_millis(10),
            pdirty: false,
            ldirty: false,
            event_capacity: 64,
        }
    }
}

impl Config {
    /// Config for a remote host with every other field defaulted
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Self::default()
        }
    }

    /// Check every construction parameter
    pub fn validate(&self) -> Result<()> {
        protocol::bps_index(self.bps)?;
        protocol::stream_name(&self.streamname)?;
        if self.channel > u8::MAX as u16 {
            return Err(VbanError::Configuration(format!(
                "channel {} out of range, expected 0-255",
                self.channel
            )));
        }
        if self.timeout.is_zero() {
            return Err(VbanError::Configuration("timeout must be non-zero".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(VbanError::Configuration("event_capacity must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// State shared between the session handle and its background loops
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) kind: Kind,
    pub(crate) store: StateStore,
    pub(crate) subscriptions: EventSubscriptions,
    pub(crate) observers: Observers,
    text: Mutex<TextRequest>,
    fault: watch::Sender<Option<String>>,
}

impl Shared {
    /// Remember the first background fault; the session stays unusable
    pub(crate) fn record_fault(&self, reason: String) {
        self.fault.send_if_modified(|fault| {
            if fault.is_none() {
                *fault = Some(reason);
                true
            } else {
                false
            }
        });
    }

    fn fault(&self) -> Option<String> {
        self.fault.borrow().clone()
    }

    pub(crate) fn faults(&self) -> watch::Receiver<Option<String>> {
        self.fault.subscribe()
    }
}

/// Running loops of a logged-in session
struct Session {
    connection: Arc<Connection>,
    shutdown: watch::Sender<bool>,
    /// Template for new event receivers; the only sender belongs to the dispatcher
    events: broadcast::Receiver<Event>,
    tasks: Vec<JoinHandle<()>>,
}

/// Client for a remote Voicemeeter instance over VBAN
///
/// Construction validates the configuration; [`VbanCmd::login`] opens the
/// sockets, registers for RT packets and waits for the first snapshot.
///
/// # Example
///
/// ```no_run
/// use vban_cmd::{Config, VbanCmd};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let remote = VbanCmd::new("potato", Config::new("192.168.1.50"))?;
///     remote.login().await?;
///
///     remote.strip(0)?.set_mute(true).await?;
///     println!("strip 0 muted: {}", remote.strip(0)?.mute());
///
///     remote.logout().await;
///     Ok(())
/// }
/// ```
pub struct VbanCmd {
    shared: Arc<Shared>,
    profiles: RwLock<ProfileStore>,
    session: Mutex<Option<Session>>,
}

impl VbanCmd {
    /// Build a session for a Voicemeeter kind (`basic`, `banana`, `potato`)
    ///
    /// Fails with [`VbanError::Configuration`] for an unknown kind or an
    /// invalid config. No I/O happens here.
    pub fn new(kind_id: &str, config: Config) -> Result<Self> {
        let kind = kinds::get(kind_id)?;
        config.validate()?;

        let text = TextRequest::new(&config.streamname, config.bps, config.channel as u8)?;
        let (fault, _) = watch::channel(None);

        let shared = Shared {
            subscriptions: EventSubscriptions::new(config.pdirty, config.ldirty),
            store: StateStore::new(kind),
            observers: Observers::new(),
            text: Mutex::new(text),
            fault,
            kind,
            config,
        };

        tracing::debug!("Built {} for {}:{}", kind, shared.config.ip, shared.config.port);

        Ok(Self {
            shared: Arc::new(shared),
            profiles: RwLock::new(ProfileStore::builtin(&kind)),
            session: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> Kind {
        self.shared.kind
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Canonical state and write-ahead cache
    pub fn store(&self) -> &StateStore {
        &self.shared.store
    }

    // ========== Lifecycle ==========

    /// Open the sockets, start the keepalive and wait for the first snapshot
    ///
    /// Returns [`VbanError::Connection`] if the host cannot be resolved or no
    /// snapshot arrives within the configured timeout. The session cannot be
    /// reused after that.
    pub async fn login(&self) -> Result<()> {
        if self.session.lock().is_some() {
            tracing::warn!("Already logged in");
            return Ok(());
        }
        self.check()?;

        let connection = Arc::new(Connection::bind(&self.shared.config).await?);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = vec![tokio::spawn(worker::keepalive(
            connection.clone(),
            self.shared.clone(),
            shutdown_rx.clone(),
        ))];

        let mut fault_rx = self.shared.faults();
        let first = tokio::select! {
            result = connection.recv_snapshot(self.shared.config.timeout) => result,
            reason = worker::wait_fault(&mut fault_rx) => Err(VbanError::Connection(reason)),
        };

        let first = match first {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                self.shared.record_fault(e.reason());
                let _ = shutdown.send(true);
                for task in tasks {
                    task.abort();
                }
                return Err(e);
            }
        };
        self.shared.store.replace_snapshot(Arc::new(first));

        let (queue_tx, queue_rx) = mpsc::channel(self.shared.config.event_capacity);
        let (broadcast_tx, events) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        tasks.push(tokio::spawn(worker::receive(
            connection.clone(),
            self.shared.clone(),
            queue_tx,
            shutdown_rx.clone(),
        )));
        let shared = self.shared.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            worker::dispatch(shared, queue_rx, broadcast_tx, shutdown_rx)
        }));

        tracing::info!(
            "Logged in to Voicemeeter {} at {}:{}",
            self.shared.kind,
            self.shared.config.ip,
            self.shared.config.port
        );

        *self.session.lock() = Some(Session {
            connection,
            shutdown,
            events,
            tasks,
        });
        Ok(())
    }

    /// Stop the background loops and close the sockets
    ///
    /// Returns once the dispatcher has finished its current callback; event
    /// receivers of this session report [`VbanError::NotConnected`] after that.
    pub async fn logout(&self) {
        let session = self.session.lock().take();
        let Some(session) = session else {
            return;
        };

        let _ = session.shutdown.send(true);
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        for task in session.tasks {
            if !task.is_finished() {
                task.abort();
            }
            let _ = task.await;
        }
        drop(session.connection);
        tracing::info!("Logged out of {}:{}", self.shared.config.ip, self.shared.config.port);
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Fail with the recorded background fault, if any
    pub fn check(&self) -> Result<()> {
        match self.shared.fault() {
            Some(reason) => Err(VbanError::Connection(reason)),
            None => Ok(()),
        }
    }

    /// Local address snapshots are received on
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.connection()?.local_addr()
    }

    fn connection(&self) -> Result<Arc<Connection>> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.connection.clone())
            .ok_or(VbanError::NotConnected)
    }

    // ========== Commands ==========

    async fn send_script(&self, script: &str) -> Result<()> {
        self.check()?;
        let connection = self.connection()?;
        let packet = self.shared.text.lock().next_packet(script);
        if packet.len() > MAX_PACKET_SIZE {
            tracing::warn!(
                "Command datagram is {} bytes, remote accepts at most {}",
                packet.len(),
                MAX_PACKET_SIZE
            );
        }
        tracing::debug!("Sending {}", script);
        connection.send_text(&packet).await
    }

    /// Send a raw VBAN-TEXT script, e.g. `Strip[0].mute=1;Bus[1].gain=-6.0;`
    pub async fn sendtext(&self, script: &str) -> Result<()> {
        self.send_script(script).await
    }

    /// Set one parameter by its fully qualified identifier
    ///
    /// Once the datagram has been handed to the socket the value is cached,
    /// whether or not the send succeeded, so the next read of `identifier`
    /// returns it even before the remote confirms it in a snapshot. Fire and
    /// forget. Nothing is cached when the session is not usable.
    pub async fn write(&self, identifier: &str, value: impl Into<ParamValue>) -> Result<()> {
        let value = value.into();
        self.check()?;
        self.connection()?;

        let sent = self
            .send_script(&format!("{}={};", identifier, value.to_script()))
            .await;
        self.shared.store.cache(identifier, value);
        sent
    }

    /// Read a parameter, preferring a pending written value (read-once)
    pub fn read<T>(
        &self,
        identifier: &str,
        from_cache: impl FnOnce(ParamValue) -> Option<T>,
        derive: impl FnOnce(&protocol::Snapshot) -> T,
    ) -> T {
        self.shared.store.read(identifier, from_cache, derive)
    }

    /// Set many parameters at once
    ///
    /// Keys are `strip-<n>`, `bus-<n>`, `vban-in-<n>` or `vban-out-<n>`. Every
    /// key is validated before anything is sent; each channel then goes out
    /// as one datagram, paced by a short delay.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use vban_cmd::{Config, Profile, VbanCmd};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let remote = VbanCmd::new("banana", Config::new("192.168.1.50"))?;
    /// # remote.login().await?;
    /// let batch: Profile = serde_json::from_value(serde_json::json!({
    ///     "strip-2": {"A1": true, "B1": true, "gain": -6.0},
    ///     "bus-2": {"mute": true, "mode": "composite"},
    ///     "vban-out-1": {"name": "streamname"},
    /// }))?;
    /// remote.apply(&batch).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn apply(&self, batch: &Profile) -> Result<()> {
        let scripts = profile::build_scripts(batch, &self.shared.kind)?;
        self.check()?;
        self.connection()?;

        for script in scripts {
            let sent = self.send_script(&script.text()).await;
            for (identifier, value) in script.assignments {
                self.shared.store.cache(identifier, value);
            }
            sent?;
            tokio::time::sleep(APPLY_DELAY).await;
        }
        Ok(())
    }

    // ========== Profiles ==========

    /// Apply a loaded profile by name, resolving `extends`
    pub async fn apply_profile(&self, name: &str) -> Result<()> {
        let resolved = self.profiles.read().resolve(name)?;
        self.apply(&resolved).await?;
        tracing::info!("Profile '{}' applied", name);
        Ok(())
    }

    /// Register a profile under `name`, replacing any existing one
    pub fn add_profile(&self, name: impl Into<String>, profile: Profile) {
        self.profiles.write().insert(name, profile);
    }

    /// Load every `*.toml` file of a directory as a profile
    pub fn load_profiles(&self, dir: impl AsRef<Path>) -> Result<usize> {
        self.profiles.write().load_dir(dir.as_ref())
    }

    /// Load profiles from `./profiles/<kind>` and `~/Documents/Voicemeeter/profiles/<kind>`
    pub fn load_default_profiles(&self) -> usize {
        self.profiles.write().load_default_dirs(&self.shared.kind)
    }

    /// Names of all loaded profiles
    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.read().names()
    }

    // ========== Events ==========

    /// Interest flags for parameter and level events
    pub fn events(&self) -> &EventSubscriptions {
        &self.shared.subscriptions
    }

    /// Register an observer; callbacks run on the dispatcher thread
    pub fn register(&self, observer: Arc<dyn Observer>) {
        self.shared.observers.add(observer);
    }

    /// Deregister an observer
    pub fn deregister(&self, observer: &Arc<dyn Observer>) {
        self.shared.observers.remove(observer);
    }

    /// Receive the events dispatched by the current session
    ///
    /// The receiver closes when the session ends, through `logout` or a
    /// connection fault. Outside a session it is closed from the start.
    pub fn subscribe(&self) -> EventReceiver {
        let session = self.session.lock();
        match session.as_ref() {
            Some(session) => EventReceiver::new(session.events.resubscribe()),
            None => EventReceiver::closed(),
        }
    }

    /// True iff the latest snapshot changed a parameter
    pub fn pdirty(&self) -> bool {
        self.shared.store.pdirty()
    }

    /// True iff the latest snapshot moved a level meter
    pub fn ldirty(&self) -> bool {
        self.shared.store.ldirty()
    }

    // ========== Snapshot info ==========

    /// Voicemeeter product reported by the remote
    pub fn mixer_type(&self) -> Option<MixerType> {
        MixerType::from_raw(self.shared.store.snapshot().mixer_type)
    }

    /// Voicemeeter version as `a.b.c.d`
    pub fn version(&self) -> String {
        let v = self.shared.store.snapshot().version;
        format!("{}.{}.{}.{}", v[3], v[2], v[1], v[0])
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.store.snapshot().sample_rate
    }

    /// Every active input level in dB (inactive slots skipped)
    pub fn input_levels(&self) -> Vec<f64> {
        let snapshot = self.shared.store.snapshot();
        active_levels(&snapshot.input_levels[..self.shared.kind.num_strip_levels()])
    }

    /// Every active output level in dB (inactive slots skipped)
    pub fn output_levels(&self) -> Vec<f64> {
        let snapshot = self.shared.store.snapshot();
        active_levels(&snapshot.output_levels[..self.shared.kind.num_bus_levels()])
    }

    // ========== Accessors ==========

    /// Input strip `index`
    pub fn strip(&self, index: usize) -> Result<Strip<'_>> {
        Ok(Strip::new(self, ChannelRef::new(ChannelKind::Strip, index, &self.shared.kind)?))
    }

    /// Output bus `index`
    pub fn bus(&self, index: usize) -> Result<Bus<'_>> {
        Ok(Bus::new(self, ChannelRef::new(ChannelKind::Bus, index, &self.shared.kind)?))
    }

    /// VBAN stream settings
    pub fn vban(&self) -> Vban<'_> {
        Vban::new(self)
    }

    /// Global actions (show, hide, restart, ...)
    pub fn command(&self) -> Command<'_> {
        Command::new(self)
    }
}

fn active_levels(raw: &[u16]) -> Vec<f64> {
    raw.iter()
        .filter(|&&level| level != values::LEVEL_INACTIVE)
        .map(|&level| values::level_db(level))
        .collect()
}

impl Drop for VbanCmd {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            let _ = session.shutdown.send(true);
            for task in session.tasks {
                task.abort();
            }
        }
    }
}

impl std::fmt::Debug for VbanCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VbanCmd")
            .field("kind", &self.shared.kind.id)
            .field("ip", &self.shared.config.ip)
            .field("port", &self.shared.config.port)
            .field("streamname", &self.shared.config.streamname)
            .finish()
    }
}
