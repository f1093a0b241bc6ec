//! A loopback stand-in for a Voicemeeter instance
//!
//! Counts register packets, records VBAN-TEXT scripts and streams the
//! current snapshot to the client every 20 ms once registered.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vban_cmd::protocol::{HEADER_SIZE, VBAN_PROTOCOL_SERVICE, VBAN_SERVICE_RTPACKETREGISTER};
use vban_cmd::{Config, Snapshot};

const STREAM_INTERVAL: Duration = Duration::from_millis(20);

pub struct FakeMixer {
    socket: Arc<UdpSocket>,
    client: SocketAddr,
    snapshot: Arc<Mutex<Snapshot>>,
    registrations: Arc<AtomicUsize>,
    commands: mpsc::UnboundedReceiver<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeMixer {
    /// Start a mixer on a free loopback port; returns it with a matching client config
    pub async fn start(initial: Snapshot) -> (Self, Config) {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let client_port = free_port().await;
        let client: SocketAddr = ([127, 0, 0, 1], client_port).into();

        let config = Config {
            ip: "127.0.0.1".to_string(),
            port: socket.local_addr().unwrap().port(),
            local_port: Some(client_port),
            bind_address: "127.0.0.1".to_string(),
            timeout: Duration::from_secs(2),
            ..Config::default()
        };

        let snapshot = Arc::new(Mutex::new(initial));
        let registrations = Arc::new(AtomicUsize::new(0));
        let streaming = Arc::new(AtomicBool::new(false));
        let (command_tx, commands) = mpsc::unbounded_channel();

        let listener = {
            let socket = socket.clone();
            let registrations = registrations.clone();
            let streaming = streaming.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                while let Ok((len, _)) = socket.recv_from(&mut buf).await {
                    let packet = &buf[..len];
                    if len < HEADER_SIZE || &packet[..4] != b"VBAN" {
                        continue;
                    }
                    if packet[4] == VBAN_PROTOCOL_SERVICE && packet[6] == VBAN_SERVICE_RTPACKETREGISTER {
                        registrations.fetch_add(1, Ordering::SeqCst);
                        streaming.store(true, Ordering::SeqCst);
                    } else if packet[4] & 0xE0 == 0x40 {
                        let script = String::from_utf8_lossy(&packet[HEADER_SIZE..]).into_owned();
                        let _ = command_tx.send(script);
                    }
                }
            })
        };

        let streamer = {
            let socket = socket.clone();
            let snapshot = snapshot.clone();
            tokio::spawn(async move {
                let mut counter = 0u32;
                let mut ticker = tokio::time::interval(STREAM_INTERVAL);
                loop {
                    ticker.tick().await;
                    if !streaming.load(Ordering::SeqCst) {
                        continue;
                    }
                    let packet = snapshot.lock().encode(counter);
                    counter = counter.wrapping_add(1);
                    let _ = socket.send_to(&packet, client).await;
                }
            })
        };

        let mixer = Self {
            socket,
            client,
            snapshot,
            registrations,
            commands,
            tasks: vec![listener, streamer],
        };
        (mixer, config)
    }

    /// Change the state the mixer streams from now on
    pub fn update(&self, change: impl FnOnce(&mut Snapshot)) {
        change(&mut self.snapshot.lock());
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Send arbitrary bytes to the client's response socket
    pub async fn send_raw(&self, bytes: &[u8]) {
        self.socket.send_to(bytes, self.client).await.unwrap();
    }

    /// Stop streaming and answering
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Next text script received, if one arrives within `wait`
    pub async fn next_command(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.commands.recv()).await.ok().flatten()
    }

    /// Every script received so far, without waiting
    pub fn drain_commands(&mut self) -> Vec<String> {
        let mut scripts = Vec::new();
        while let Ok(script) = self.commands.try_recv() {
            scripts.push(script);
        }
        scripts
    }
}

impl Drop for FakeMixer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A loopback UDP port that was free a moment ago
pub async fn free_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.local_addr().unwrap().port()
}

/// A banana snapshot with every level slot inactive
pub fn banana_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::empty();
    snapshot.mixer_type = 2;
    snapshot.version = [1, 0, 8, 2];
    snapshot.sample_rate = 48000;
    snapshot.input_levels = [0xFFFF; 34];
    snapshot.output_levels = [0xFFFF; 64];
    snapshot
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
