use crate::channel::ChannelRef;
use crate::client::VbanCmd;
use crate::error::Result;
use crate::types::{BusMode, GainValue, LevelValue};
use crate::values;

/// One output bus of a logged-in session
#[derive(Clone, Copy)]
pub struct Bus<'a> {
    remote: &'a VbanCmd,
    channel: ChannelRef,
}

impl<'a> Bus<'a> {
    pub(crate) fn new(remote: &'a VbanCmd, channel: ChannelRef) -> Self {
        Self { remote, channel }
    }

    pub fn index(&self) -> usize {
        self.channel.index()
    }

    pub fn is_physical(&self) -> bool {
        self.channel.is_physical()
    }

    /// Wire identifier, `Bus[n]`
    pub fn identifier(&self) -> String {
        self.channel.identifier()
    }

    fn state_flag(&self, param: &str, mask: u32) -> bool {
        let i = self.index();
        self.remote.read(
            &self.channel.param(param),
            |v| v.as_bool(),
            |s| values::flag(s.bus_state[i], mask),
        )
    }

    pub fn mute(&self) -> bool {
        self.state_flag("mute", values::MUTE)
    }

    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.remote.write(&self.channel.param("mute"), mute).await
    }

    pub fn mono(&self) -> bool {
        self.state_flag("mono", values::MONO)
    }

    pub async fn set_mono(&self, mono: bool) -> Result<()> {
        self.remote.write(&self.channel.param("mono"), mono).await
    }

    pub fn eq(&self) -> bool {
        self.state_flag("eq.on", values::EQ_ON)
    }

    pub async fn set_eq(&self, on: bool) -> Result<()> {
        self.remote.write(&self.channel.param("eq.on"), on).await
    }

    pub fn eq_ab(&self) -> bool {
        self.state_flag("eq.ab", values::EQ_AB)
    }

    pub async fn set_eq_ab(&self, on: bool) -> Result<()> {
        self.remote.write(&self.channel.param("eq.ab"), on).await
    }

    pub fn gain(&self) -> GainValue {
        let i = self.index();
        self.remote.read(
            &self.channel.param("gain"),
            |v| v.as_f64(),
            |s| values::gain_db(s.bus_gain[i]),
        )
    }

    pub async fn set_gain(&self, gain: GainValue) -> Result<()> {
        self.remote.write(&self.channel.param("gain"), gain).await
    }

    pub fn label(&self) -> String {
        let i = self.index();
        self.remote.read(
            &self.channel.param("label"),
            |v| v.as_str().map(str::to_string),
            |s| values::decode_label(&s.bus_labels[i]),
        )
    }

    pub async fn set_label(&self, label: &str) -> Result<()> {
        self.remote.write(&self.channel.param("label"), label).await
    }

    pub fn mode(&self) -> BusModeAccess<'a> {
        BusModeAccess {
            remote: self.remote,
            channel: self.channel,
        }
    }

    pub fn levels(&self) -> BusLevels<'a> {
        BusLevels {
            remote: self.remote,
            channel: self.channel,
        }
    }
}

/// The mutually exclusive mode of a bus, addressed as `Bus[n].mode.<name>`
#[derive(Clone, Copy)]
pub struct BusModeAccess<'a> {
    remote: &'a VbanCmd,
    channel: ChannelRef,
}

impl BusModeAccess<'_> {
    fn identifier(&self, mode: BusMode) -> String {
        self.channel.param(&format!("mode.{}", mode.as_str()))
    }

    /// Current mode; a pending write wins over the snapshot once
    pub fn get(&self) -> BusMode {
        let store = self.remote.store();
        let mut pending = None;
        for mode in BusMode::ALL {
            let cached = store.take_cached(&self.identifier(mode));
            if cached.and_then(|v| v.as_bool()).unwrap_or(false) {
                pending = Some(mode);
            }
        }
        pending.unwrap_or_else(|| values::bus_mode(store.snapshot().bus_state[self.channel.index()]))
    }

    pub async fn set(&self, mode: BusMode) -> Result<()> {
        self.remote.write(&self.identifier(mode), true).await?;
        // only the latest mode may stay pending
        for other in BusMode::ALL.into_iter().filter(|m| *m != mode) {
            self.remote.store().take_cached(&self.identifier(other));
        }
        Ok(())
    }
}

/// Meter readings of a bus
#[derive(Clone, Copy)]
pub struct BusLevels<'a> {
    remote: &'a VbanCmd,
    channel: ChannelRef,
}

impl BusLevels<'_> {
    /// All 8 channel levels of the bus in dB
    pub fn all(&self) -> Vec<LevelValue> {
        let range = self.remote.kind().bus_level_range(self.channel.index());
        let snapshot = self.remote.store().snapshot();
        snapshot.output_levels[range]
            .iter()
            .map(|&raw| values::level_db(raw))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        let range = self.remote.kind().bus_level_range(self.channel.index());
        self.remote.store().level_masks().outputs[range]
            .iter()
            .any(|&changed| changed)
    }
}
