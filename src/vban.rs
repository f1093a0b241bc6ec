//! VBAN stream settings
//!
//! The RT packet carries no stream state, so these are write-only. Values
//! outside the documented ranges are logged and sent anyway; the remote
//! decides what to do with them.

use crate::channel::{ChannelKind, ChannelRef};
use crate::client::VbanCmd;
use crate::error::{Result, VbanError};
use crate::types::ParamValue;

const SAMPLE_RATES: [u32; 10] = [11025, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000];

/// Entry point for `vban.*` parameters
#[derive(Clone, Copy)]
pub struct Vban<'a> {
    remote: &'a VbanCmd,
}

impl<'a> Vban<'a> {
    pub(crate) fn new(remote: &'a VbanCmd) -> Self {
        Self { remote }
    }

    /// Incoming stream `index`
    pub fn instream(&self, index: usize) -> Result<VbanStream<'a>> {
        self.stream(ChannelKind::VbanInstream, index)
    }

    /// Outgoing stream `index`
    pub fn outstream(&self, index: usize) -> Result<VbanStream<'a>> {
        self.stream(ChannelKind::VbanOutstream, index)
    }

    fn stream(&self, kind: ChannelKind, index: usize) -> Result<VbanStream<'a>> {
        Ok(VbanStream {
            remote: self.remote,
            channel: ChannelRef::new(kind, index, &self.remote.kind())?,
        })
    }

    pub async fn enable(&self) -> Result<()> {
        self.remote.write("vban.Enable", true).await
    }

    /// Turn VBAN off on the remote; this session stops receiving after that
    pub async fn disable(&self) -> Result<()> {
        self.remote.write("vban.Enable", false).await
    }
}

/// One VBAN stream: `vban.instream[n]` or `vban.outstream[n]`
#[derive(Clone, Copy)]
pub struct VbanStream<'a> {
    remote: &'a VbanCmd,
    channel: ChannelRef,
}

impl VbanStream<'_> {
    pub fn index(&self) -> usize {
        self.channel.index()
    }

    pub fn identifier(&self) -> String {
        self.channel.identifier()
    }

    pub fn is_instream(&self) -> bool {
        self.channel.kind() == ChannelKind::VbanInstream
    }

    async fn set(&self, param: &str, value: impl Into<ParamValue>) -> Result<()> {
        self.remote.write(&self.channel.param(param), value).await
    }

    /// Format settings of an incoming stream are dictated by its sender
    fn require_outstream(&self, param: &str) -> Result<()> {
        if self.is_instream() {
            Err(VbanError::Value(format!("{} is read only on {}", param, self.channel)))
        } else {
            Ok(())
        }
    }

    pub async fn set_on(&self, on: bool) -> Result<()> {
        self.set("on", on).await
    }

    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.set("name", name).await
    }

    pub async fn set_ip(&self, ip: &str) -> Result<()> {
        self.set("ip", ip).await
    }

    pub async fn set_port(&self, port: u16) -> Result<()> {
        if port < 1024 {
            tracing::warn!("port got: {} but expected a value from 1024 to 65535", port);
        }
        self.set("port", port).await
    }

    pub async fn set_sr(&self, sr: u32) -> Result<()> {
        self.require_outstream("sr")?;
        if !SAMPLE_RATES.contains(&sr) {
            tracing::warn!("sr got: {} but expected a value in {:?}", sr, SAMPLE_RATES);
        }
        self.set("sr", sr as i64).await
    }

    pub async fn set_channel(&self, channel: i32) -> Result<()> {
        self.require_outstream("channel")?;
        if !(1..=8).contains(&channel) {
            tracing::warn!("channel got: {} but expected a value from 1 to 8", channel);
        }
        self.set("channel", channel).await
    }

    /// Sample format, 16 or 24 bit
    pub async fn set_bit(&self, bit: u32) -> Result<()> {
        self.require_outstream("bit")?;
        if bit != 16 && bit != 24 {
            tracing::warn!("bit got: {} but expected value 16 or 24", bit);
        }
        self.set("bit", if bit == 16 { 1i32 } else { 2 }).await
    }

    pub async fn set_quality(&self, quality: i32) -> Result<()> {
        if !(0..=4).contains(&quality) {
            tracing::warn!("quality got: {} but expected a value from 0 to 4", quality);
        }
        self.set("quality", quality).await
    }

    pub async fn set_route(&self, route: i32) -> Result<()> {
        if !(0..=8).contains(&route) {
            tracing::warn!("route got: {} but expected a value from 0 to 8", route);
        }
        self.set("route", route).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Config;

    #[tokio::test]
    async fn test_stream_addressing() {
        let remote = VbanCmd::new("basic", Config::default()).unwrap();
        let vban = remote.vban();
        assert_eq!(vban.instream(3).unwrap().identifier(), "vban.instream[3]");
        assert_eq!(vban.outstream(0).unwrap().identifier(), "vban.outstream[0]");
        assert!(vban.instream(4).is_err());

        let instream = vban.instream(0).unwrap();
        assert!(matches!(instream.set_sr(48000).await, Err(VbanError::Value(_))));
        assert!(matches!(instream.set_bit(24).await, Err(VbanError::Value(_))));
        assert!(matches!(
            vban.outstream(0).unwrap().set_bit(24).await,
            Err(VbanError::NotConnected)
        ));
    }
}
