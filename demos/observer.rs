//! Print parameter and level changes of a Voicemeeter instance
//!
//! Usage: cargo run --example observer -- <host> [kind]
//! Set RUST_LOG=vban_cmd=debug to see the protocol traffic.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vban_cmd::{Config, Event, Observer, VbanCmd};

struct Printer {
    remote: Weak<VbanCmd>,
}

impl Observer for Printer {
    fn on_update(&self, event: Event) {
        let Some(remote) = self.remote.upgrade() else {
            return;
        };
        match event {
            Event::ParameterChanged => {
                if let Ok(strip) = remote.strip(0) {
                    println!(
                        "[pdirty] strip 0 '{}': mute={} gain={:.1} dB",
                        strip.label(),
                        strip.mute(),
                        strip.gain()
                    );
                }
            }
            Event::LevelChanged => {
                for i in 0..remote.kind().num_strip() {
                    let Ok(strip) = remote.strip(i) else { continue };
                    if strip.levels().is_dirty() {
                        println!("[ldirty] strip {}: {:?}", i, strip.levels().prefader());
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let kind = args.next().unwrap_or_else(|| "potato".to_string());

    let config = Config {
        pdirty: true,
        ldirty: true,
        ..Config::new(host)
    };
    let remote = Arc::new(VbanCmd::new(&kind, config)?);
    remote.login().await?;
    println!(
        "Connected to Voicemeeter {} {} ({} Hz)",
        remote.kind(),
        remote.version(),
        remote.sample_rate()
    );

    let observer: Arc<dyn Observer> = Arc::new(Printer {
        remote: Arc::downgrade(&remote),
    });
    remote.register(observer.clone());

    println!("Listening for 30 seconds, toggle something in Voicemeeter...");
    tokio::time::sleep(Duration::from_secs(30)).await;

    remote.deregister(&observer);
    remote.logout().await;
    Ok(())
}
