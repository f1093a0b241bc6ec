use crate::error::{Result, VbanError};
use std::fmt;
use std::ops::Range;

/// Channel topology of one Voicemeeter product variant
///
/// Counts never change for a kind, so every index range used by the
/// accessors and the level tables is derived from here once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kind {
    /// Lookup id (`basic`, `banana`, `potato`)
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    pub phys_in: usize,
    pub virt_in: usize,
    pub phys_out: usize,
    pub virt_out: usize,
    pub vban_in: usize,
    pub vban_out: usize,
}

pub const BASIC: Kind = Kind {
    id: "basic",
    name: "Basic",
    phys_in: 2,
    virt_in: 1,
    phys_out: 1,
    virt_out: 1,
    vban_in: 4,
    vban_out: 4,
};

pub const BANANA: Kind = Kind {
    id: "banana",
    name: "Banana",
    phys_in: 3,
    virt_in: 2,
    phys_out: 3,
    virt_out: 2,
    vban_in: 8,
    vban_out: 8,
};

pub const POTATO: Kind = Kind {
    id: "potato",
    name: "Potato",
    phys_in: 5,
    virt_in: 3,
    phys_out: 5,
    virt_out: 3,
    vban_in: 8,
    vban_out: 8,
};

/// Every supported kind
pub const ALL: [Kind; 3] = [BASIC, BANANA, POTATO];

/// Level slots per physical strip (stereo)
const PHYS_STRIP_LEVELS: usize = 2;
/// Level slots per virtual strip and per bus (8 channels)
const VIRT_STRIP_LEVELS: usize = 8;
const BUS_LEVELS: usize = 8;

/// Look up a kind by id
pub fn get(kind_id: &str) -> Result<Kind> {
    ALL.iter()
        .find(|kind| kind.id == kind_id)
        .copied()
        .ok_or_else(|| VbanError::Configuration(format!("Unknown Voicemeeter kind '{}'", kind_id)))
}

impl Kind {
    /// Total number of input strips
    pub fn num_strip(&self) -> usize {
        self.phys_in + self.virt_in
    }

    /// Total number of output buses
    pub fn num_bus(&self) -> usize {
        self.phys_out + self.virt_out
    }

    /// Number of meaningful input level slots in a snapshot
    pub fn num_strip_levels(&self) -> usize {
        self.phys_in * PHYS_STRIP_LEVELS + self.virt_in * VIRT_STRIP_LEVELS
    }

    /// Number of meaningful output level slots in a snapshot
    pub fn num_bus_levels(&self) -> usize {
        self.num_bus() * BUS_LEVELS
    }

    /// Input level slots owned by strip `index`
    pub fn strip_level_range(&self, index: usize) -> Range<usize> {
        if index < self.phys_in {
            let start = index * PHYS_STRIP_LEVELS;
            start..start + PHYS_STRIP_LEVELS
        } else {
            let start =
                self.phys_in * PHYS_STRIP_LEVELS + (index - self.phys_in) * VIRT_STRIP_LEVELS;
            start..start + VIRT_STRIP_LEVELS
        }
    }

    /// Output level slots owned by bus `index`
    pub fn bus_level_range(&self, index: usize) -> Range<usize> {
        let start = index * BUS_LEVELS;
        start..start + BUS_LEVELS
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_potato_level_tables_fill_the_packet() {
        assert_eq!(POTATO.num_strip_levels(), 34);
        assert_eq!(POTATO.num_bus_levels(), 64);
        assert_eq!(POTATO.strip_level_range(4), 8..10);
        assert_eq!(POTATO.strip_level_range(5), 10..18);
        assert_eq!(POTATO.strip_level_range(7), 26..34);
        assert_eq!(POTATO.bus_level_range(7), 56..64);
    }

    #[test]
    fn test_channel_counts() {
        assert_eq!(BASIC.num_strip(), 3);
        assert_eq!(BASIC.num_bus(), 2);
        assert_eq!(BANANA.num_strip(), 5);
        assert_eq!(BANANA.num_bus(), 5);
        assert_eq!(POTATO.num_strip(), 8);
        assert_eq!(POTATO.num_bus(), 8);
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let err = get("unknown_kind").unwrap_err();
        assert!(matches!(err, VbanError::Configuration(_)));
        assert!(err.to_string().contains("Unknown Voicemeeter kind 'unknown_kind'"));
        assert_eq!(get("banana").unwrap(), BANANA);
    }
}
