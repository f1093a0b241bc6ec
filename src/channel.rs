use crate::error::{Result, VbanError};
use crate::kinds::Kind;
use std::fmt;

/// Addressable object kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    Strip,
    Bus,
    VbanInstream,
    VbanOutstream,
}

impl ChannelKind {
    /// Number of objects of this kind on a topology
    pub fn count(&self, topology: &Kind) -> usize {
        match self {
            ChannelKind::Strip => topology.num_strip(),
            ChannelKind::Bus => topology.num_bus(),
            ChannelKind::VbanInstream => topology.vban_in,
            ChannelKind::VbanOutstream => topology.vban_out,
        }
    }

    fn physical_count(&self, topology: &Kind) -> usize {
        match self {
            ChannelKind::Strip => topology.phys_in,
            ChannelKind::Bus => topology.phys_out,
            ChannelKind::VbanInstream | ChannelKind::VbanOutstream => 0,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ChannelKind::Strip => "strip",
            ChannelKind::Bus => "bus",
            ChannelKind::VbanInstream => "vban instream",
            ChannelKind::VbanOutstream => "vban outstream",
        }
    }
}

/// A validated channel address: `{kind, index, is_physical}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelRef {
    kind: ChannelKind,
    index: usize,
    is_physical: bool,
}

impl ChannelRef {
    /// Address `index` of `kind`, rejecting indices outside the topology
    pub fn new(kind: ChannelKind, index: usize, topology: &Kind) -> Result<Self> {
        let count = kind.count(topology);
        if index >= count {
            return Err(VbanError::Value(format!(
                "{} index {} out of range, {} has {}",
                kind.name(),
                index,
                topology,
                count
            )));
        }
        Ok(Self {
            kind,
            index,
            is_physical: index < kind.physical_count(topology),
        })
    }

    /// Resolve a batch key such as `strip-0`, `bus-3`, `vban-in-1`, `vban-outstream-0`
    pub fn parse_key(key: &str, topology: &Kind) -> Result<Self> {
        let parts: Vec<&str> = key.split('-').collect();
        let (kind, index) = match parts.as_slice() {
            ["strip", n] => (ChannelKind::Strip, *n),
            ["bus", n] => (ChannelKind::Bus, *n),
            ["vban", "in" | "instream", n] => (ChannelKind::VbanInstream, *n),
            ["vban", "out" | "outstream", n] => (ChannelKind::VbanOutstream, *n),
            _ => return Err(VbanError::Value(format!("unknown object '{}'", key))),
        };
        let index = index
            .parse::<usize>()
            .map_err(|_| VbanError::Value(format!("invalid index in '{}'", key)))?;
        Self::new(kind, index, topology)
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_physical(&self) -> bool {
        self.is_physical
    }

    /// Wire identifier (`Strip[3]`, `Bus[0]`, `vban.instream[1]`)
    pub fn identifier(&self) -> String {
        match self.kind {
            ChannelKind::Strip => format!("Strip[{}]", self.index),
            ChannelKind::Bus => format!("Bus[{}]", self.index),
            ChannelKind::VbanInstream => format!("vban.instream[{}]", self.index),
            ChannelKind::VbanOutstream => format!("vban.outstream[{}]", self.index),
        }
    }

    /// Fully qualified parameter path (`Strip[3].mute`)
    pub fn param(&self, param: &str) -> String {
        qualify(&self.identifier(), param)
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Join an identifier and parameter name; an empty parameter addresses the object itself
pub fn qualify(identifier: &str, param: &str) -> String {
    if param.is_empty() {
        identifier.to_string()
    } else {
        format!("{}.{}", identifier, param)
    }
}

/// Identifier for global actions
pub const COMMAND: &str = "Command";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{BANANA, POTATO};

    #[test]
    fn test_identifiers() {
        let strip = ChannelRef::new(ChannelKind::Strip, 3, &POTATO).unwrap();
        assert_eq!(strip.identifier(), "Strip[3]");
        assert_eq!(strip.param("mute"), "Strip[3].mute");
        assert_eq!(strip.param("GainLayer[2]"), "Strip[3].GainLayer[2]");
        assert!(strip.is_physical());

        let bus = ChannelRef::new(ChannelKind::Bus, 0, &POTATO).unwrap();
        assert_eq!(bus.param("mode.composite"), "Bus[0].mode.composite");

        let instream = ChannelRef::new(ChannelKind::VbanInstream, 1, &POTATO).unwrap();
        assert_eq!(instream.identifier(), "vban.instream[1]");
        assert!(!instream.is_physical());
        assert_eq!(qualify(COMMAND, "show"), "Command.show");
        assert_eq!(qualify("Strip[0]", ""), "Strip[0]");
    }

    #[test]
    fn test_physical_boundary() {
        assert!(ChannelRef::new(ChannelKind::Strip, 2, &BANANA).unwrap().is_physical());
        assert!(!ChannelRef::new(ChannelKind::Strip, 3, &BANANA).unwrap().is_physical());
        assert!(!ChannelRef::new(ChannelKind::Bus, 3, &BANANA).unwrap().is_physical());
    }

    #[test]
    fn test_parse_keys() {
        let key = ChannelRef::parse_key("strip-7", &POTATO).unwrap();
        assert_eq!(key.identifier(), "Strip[7]");
        let key = ChannelRef::parse_key("vban-in-0", &POTATO).unwrap();
        assert_eq!(key.identifier(), "vban.instream[0]");
        let key = ChannelRef::parse_key("vban-outstream-7", &POTATO).unwrap();
        assert_eq!(key.identifier(), "vban.outstream[7]");

        let err = ChannelRef::parse_key("bus-99", &POTATO).unwrap_err();
        assert!(matches!(err, VbanError::Value(_)));
        assert!(err.to_string().contains("99"));
        assert!(ChannelRef::parse_key("button-0", &POTATO).is_err());
        assert!(ChannelRef::parse_key("strip-x", &POTATO).is_err());
        assert!(ChannelRef::parse_key("strip", &POTATO).is_err());
    }
}
