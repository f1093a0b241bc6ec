//! Rust library for remote controlling Voicemeeter over VBAN
//!
//! This library provides an async API for reading and writing mixer
//! parameters of a local or remote Voicemeeter instance. It supports:
//!
//! - Basic, Banana and Potato topologies
//! - Strip and bus control (mute, gain, routing, labels, bus modes)
//! - VBAN stream settings and global commands
//! - Real-time state through the VBAN RT service (parameters and levels)
//! - Write-ahead caching so a write is visible to the next read
//! - Change notifications through observers or an event stream
//! - Batch updates and TOML profiles
//!
//! # Quick Start
//!
//! ```no_run
//! use vban_cmd::{Config, VbanCmd};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = VbanCmd::new("banana", Config::new("192.168.1.50"))?;
//!     remote.login().await?;
//!
//!     println!("Connected to Voicemeeter {} {}", remote.kind(), remote.version());
//!
//!     let strip = remote.strip(0)?;
//!     strip.set_gain(-12.0).await?;
//!     strip.set_route("A1", true).await?;
//!     println!("strip 0 gain: {}", strip.gain());
//!
//!     remote.logout().await;
//!     Ok(())
//! }
//! ```
//!
//! # Events
//!
//! Snapshots arrive roughly every 20 ms. Each one that changes a parameter
//! or moves a level meter produces an [`Event`]:
//!
//! ```no_run
//! use vban_cmd::{Config, Event, VbanCmd};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         pdirty: true,
//!         ..Config::new("localhost")
//!     };
//!     let remote = VbanCmd::new("potato", config)?;
//!     remote.login().await?;
//!
//!     // ends on logout or when the connection fails
//!     let mut events = remote.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if event == Event::ParameterChanged {
//!             println!("bus 0 muted: {}", remote.bus(0)?.mute());
//!         }
//!     }
//!     remote.check()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Protocol**: VBAN packet framing and the RT snapshot layout
//! - **Values**: decoding of state words, gains, levels and bus modes
//! - **Connection**: the register, request and response UDP sockets
//! - **Worker**: keepalive and snapshot receiver tasks, event dispatcher thread
//! - **State**: canonical snapshot, dirty detection and write-ahead cache
//! - **Client**: session lifecycle, commands and accessors

mod bus;
pub mod channel;
mod client;
mod command;
mod connection;
mod error;
pub mod kinds;
pub mod profile;
pub mod protocol;
mod state;
mod strip;
mod subscription;
mod types;
pub mod values;
mod vban;
mod worker;

// Public exports
pub use bus::{Bus, BusLevels, BusModeAccess};
pub use channel::{ChannelKind, ChannelRef};
pub use client::{Config, VbanCmd};
pub use command::Command;
pub use error::{Result, VbanError};
pub use kinds::Kind;
pub use profile::{Profile, ProfileStore};
pub use protocol::Snapshot;
pub use state::{Dirty, LevelMasks, StateStore};
pub use strip::{GainLayer, Strip, StripLevels};
pub use subscription::{EventReceiver, EventSubscriptions, Observer, Observers};
pub use types::{BusMode, Event, GainValue, LevelValue, MixerType, ParamValue};
pub use vban::{Vban, VbanStream};
