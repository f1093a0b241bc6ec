use crate::channel::ChannelRef;
use crate::client::VbanCmd;
use crate::error::{Result, VbanError};
use crate::protocol::NUM_GAIN_LAYERS;
use crate::types::{GainValue, LevelValue};
use crate::values;

/// One input strip of a logged-in session
///
/// Reads come from the write-ahead cache first, then the latest snapshot.
/// Setters are fire and forget.
#[derive(Clone, Copy)]
pub struct Strip<'a> {
    remote: &'a VbanCmd,
    channel: ChannelRef,
}

impl<'a> Strip<'a> {
    pub(crate) fn new(remote: &'a VbanCmd, channel: ChannelRef) -> Self {
        Self { remote, channel }
    }

    pub fn index(&self) -> usize {
        self.channel.index()
    }

    pub fn is_physical(&self) -> bool {
        self.channel.is_physical()
    }

    /// Wire identifier, `Strip[n]`
    pub fn identifier(&self) -> String {
        self.channel.identifier()
    }

    fn state_flag(&self, param: &str, mask: u32) -> bool {
        let i = self.index();
        self.remote.read(
            &self.channel.param(param),
            |v| v.as_bool(),
            |s| values::flag(s.strip_state[i], mask),
        )
    }

    fn require_physical(&self, param: &str) -> Result<()> {
        if self.is_physical() {
            Ok(())
        } else {
            Err(VbanError::Value(format!("{} is only available on physical strips, {} is virtual", param, self.channel)))
        }
    }

    fn require_virtual(&self, param: &str) -> Result<()> {
        if self.is_physical() {
            Err(VbanError::Value(format!("{} is only available on virtual strips, {} is physical", param, self.channel)))
        } else {
            Ok(())
        }
    }

    // ========== State flags ==========

    pub fn mute(&self) -> bool {
        self.state_flag("mute", values::MUTE)
    }

    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.remote.write(&self.channel.param("mute"), mute).await
    }

    pub fn solo(&self) -> bool {
        self.state_flag("solo", values::SOLO)
    }

    pub async fn set_solo(&self, solo: bool) -> Result<()> {
        self.remote.write(&self.channel.param("solo"), solo).await
    }

    pub fn mono(&self) -> bool {
        self.state_flag("mono", values::MONO)
    }

    pub async fn set_mono(&self, mono: bool) -> Result<()> {
        self.remote.write(&self.channel.param("mono"), mono).await
    }

    /// Mono-compatible mixdown; virtual strips only
    pub fn mc(&self) -> Result<bool> {
        self.require_virtual("mc")?;
        Ok(self.state_flag("mc", values::MC))
    }

    pub async fn set_mc(&self, mc: bool) -> Result<()> {
        self.require_virtual("mc")?;
        self.remote.write(&self.channel.param("mc"), mc).await
    }

    // ========== Gain and label ==========

    /// Fader gain in dB (gain layer 0)
    pub fn gain(&self) -> GainValue {
        let i = self.index();
        self.remote.read(
            &self.channel.param("gain"),
            |v| v.as_f64(),
            |s| values::gain_db(s.strip_gain_layers[0][i]),
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
            |s| values::decode_label(&s.strip_labels[i]),
        )
    }

    pub async fn set_label(&self, label: &str) -> Result<()> {
        self.remote.write(&self.channel.param("label"), label).await
    }

    /// Gain layer `layer` (0-7), one per bus of the largest kind
    pub fn gainlayer(&self, layer: usize) -> Result<GainLayer<'a>> {
        if layer >= NUM_GAIN_LAYERS {
            return Err(VbanError::Value(format!(
                "gain layer {} out of range, expected 0-{}",
                layer,
                NUM_GAIN_LAYERS - 1
            )));
        }
        Ok(GainLayer {
            remote: self.remote,
            channel: self.channel,
            layer,
        })
    }

    // ========== Routing ==========

    fn check_output(&self, output: &str) -> Result<u32> {
        let kind = self.remote.kind();
        let known = output
            .get(1..)
            .and_then(|n| n.parse::<usize>().ok())
            .is_some_and(|n| match output.as_bytes()[0] {
                b'A' => (1..=kind.phys_out).contains(&n),
                b'B' => (1..=kind.virt_out).contains(&n),
                _ => false,
            });
        if !known {
            return Err(VbanError::Value(format!(
                "unknown output '{}' for {}, expected A1-A{} or B1-B{}",
                output, kind, kind.phys_out, kind.virt_out
            )));
        }
        values::route_mask(output)
            .ok_or_else(|| VbanError::Value(format!("unknown output '{}'", output)))
    }

    /// Whether the strip is routed to `output` (`A1`..`A5`, `B1`..`B3`)
    pub fn route(&self, output: &str) -> Result<bool> {
        let mask = self.check_output(output)?;
        Ok(self.state_flag(output, mask))
    }

    pub async fn set_route(&self, output: &str, on: bool) -> Result<()> {
        self.check_output(output)?;
        self.remote.write(&self.channel.param(output), on).await
    }

    // ========== Write-only parameters ==========

    /// Audibility limit in dB, -40 to 12
    pub async fn set_limit(&self, limit: i32) -> Result<()> {
        if !(-40..=12).contains(&limit) {
            return Err(VbanError::Value(format!("limit got {} but expected a value from -40 to 12", limit)));
        }
        self.remote.write(&self.channel.param("limit"), limit).await
    }

    /// Compressor amount, 0 to 10; physical strips only
    pub async fn set_comp(&self, amount: f64) -> Result<()> {
        self.require_physical("comp")?;
        check_knob("comp", amount)?;
        self.remote.write(&self.channel.param("comp"), amount).await
    }

    /// Gate amount, 0 to 10; physical strips only
    pub async fn set_gate(&self, amount: f64) -> Result<()> {
        self.require_physical("gate")?;
        check_knob("gate", amount)?;
        self.remote.write(&self.channel.param("gate"), amount).await
    }

    /// Karaoke mode, 0 to 4; virtual strips only
    pub async fn set_karaoke(&self, mode: i32) -> Result<()> {
        self.require_virtual("karaoke")?;
        if !(0..=4).contains(&mode) {
            return Err(VbanError::Value(format!("karaoke got {} but expected a value from 0 to 4", mode)));
        }
        self.remote.write(&self.channel.param("karaoke"), mode).await
    }

    pub fn levels(&self) -> StripLevels<'a> {
        StripLevels {
            remote: self.remote,
            channel: self.channel,
        }
    }
}

fn check_knob(param: &str, amount: f64) -> Result<()> {
    if (0.0..=10.0).contains(&amount) {
        Ok(())
    } else {
        Err(VbanError::Value(format!("{} got {} but expected a value from 0 to 10", param, amount)))
    }
}

/// One gain layer of a strip: `Strip[n].GainLayer[k]`
#[derive(Clone, Copy)]
pub struct GainLayer<'a> {
    remote: &'a VbanCmd,
    channel: ChannelRef,
    layer: usize,
}

impl GainLayer<'_> {
    fn identifier(&self) -> String {
        self.channel.param(&format!("GainLayer[{}]", self.layer))
    }

    pub fn gain(&self) -> GainValue {
        let (i, layer) = (self.channel.index(), self.layer);
        self.remote.read(
            &self.identifier(),
            |v| v.as_f64(),
            |s| values::gain_db(s.strip_gain_layers[layer][i]),
        )
    }

    pub async fn set_gain(&self, gain: GainValue) -> Result<()> {
        self.remote.write(&self.identifier(), gain).await
    }
}

/// Meter readings of a strip
#[derive(Clone, Copy)]
pub struct StripLevels<'a> {
    remote: &'a VbanCmd,
    channel: ChannelRef,
}

impl StripLevels<'_> {
    /// Pre-fader levels in dB: 2 slots for physical strips, 8 for virtual
    pub fn prefader(&self) -> Vec<LevelValue> {
        let range = self.remote.kind().strip_level_range(self.channel.index());
        let snapshot = self.remote.store().snapshot();
        snapshot.input_levels[range]
            .iter()
            .map(|&raw| values::level_db(raw))
            .collect()
    }

    /// True iff one of this strip's slots moved in the latest level-dirty snapshot
    pub fn is_dirty(&self) -> bool {
        let range = self.remote.kind().strip_level_range(self.channel.index());
        self.remote.store().level_masks().inputs[range]
            .iter()
            .any(|&changed| changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Config;
    use crate::protocol::Snapshot;
    use std::sync::Arc;

    fn remote(kind: &str) -> VbanCmd {
        VbanCmd::new(kind, Config::default()).unwrap()
    }

    #[test]
    fn test_flags_and_routing_from_snapshot() {
        let remote = remote("banana");
        let mut snapshot = Snapshot::empty();
        snapshot.strip_state[1] = values::MUTE | values::BUS_A[2] | values::BUS_B[1];
        remote.store().replace_snapshot(Arc::new(snapshot));

        let strip = remote.strip(1).unwrap();
        assert!(strip.mute());
        assert!(!strip.solo());
        assert!(strip.route("A3").unwrap());
        assert!(strip.route("B2").unwrap());
        assert!(!strip.route("A1").unwrap());
        // banana has three physical buses and two virtual ones
        assert!(strip.route("A4").is_err());
        assert!(strip.route("B3").is_err());
        assert!(strip.route("C1").is_err());
    }

    #[test]
    fn test_capabilities_follow_topology() {
        let remote = remote("basic");
        let physical = remote.strip(0).unwrap();
        let virtual_strip = remote.strip(2).unwrap();
        assert!(physical.is_physical());
        assert!(!virtual_strip.is_physical());
        assert!(physical.mc().is_err());
        assert!(virtual_strip.mc().is_ok());
        assert!(remote.strip(3).is_err());
        assert!(physical.gainlayer(8).is_err());
    }

    #[tokio::test]
    async fn test_write_only_parameters_validate_before_sending() {
        let remote = remote("potato");
        let physical = remote.strip(0).unwrap();
        let virtual_strip = remote.strip(5).unwrap();

        assert!(matches!(physical.set_limit(13).await, Err(VbanError::Value(_))));
        assert!(matches!(physical.set_karaoke(1).await, Err(VbanError::Value(_))));
        assert!(matches!(virtual_strip.set_karaoke(5).await, Err(VbanError::Value(_))));
        assert!(matches!(virtual_strip.set_comp(2.0).await, Err(VbanError::Value(_))));
        assert!(matches!(physical.set_gate(11.0).await, Err(VbanError::Value(_))));
        // valid values reach the transport, which is not connected
        assert!(matches!(physical.set_limit(-40).await, Err(VbanError::NotConnected)));
    }

    #[test]
    fn test_gain_layers_and_levels() {
        let remote = remote("potato");
        let mut snapshot = Snapshot::empty();
        snapshot.strip_gain_layers[0][6] = 600;
        snapshot.strip_gain_layers[3][6] = 0xFFFF - 350;
        snapshot.input_levels[10] = 0xFFFF - 2000;
        snapshot.input_levels[18] = 0xFFFF - 500;
        remote.store().replace_snapshot(Arc::new(snapshot));

        let strip = remote.strip(6).unwrap();
        assert_eq!(strip.gain(), -6.0);
        assert_eq!(strip.gainlayer(3).unwrap().gain(), 3.5);

        // potato: 5 physical strips use slots 0..10, strip 6 is the second virtual
        let levels = remote.strip(5).unwrap().levels().prefader();
        assert_eq!(levels.len(), 8);
        assert_eq!(levels[0], -20.0);
        assert_eq!(remote.strip(6).unwrap().levels().prefader()[0], -5.0);
        assert!(!remote.strip(6).unwrap().levels().is_dirty());
    }
}
