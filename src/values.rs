//! Interpretation of raw snapshot fields
//!
//! State words are bit-packed per channel. Gains and levels are 16 bit
//! values in hundredths of a dB using the remote's own (non two's
//! complement) encodings.

use crate::types::BusMode;

pub const MUTE: u32 = 0x0000_0001;
pub const SOLO: u32 = 0x0000_0002;
pub const MONO: u32 = 0x0000_0004;
pub const MC: u32 = 0x0000_0008;

pub const EQ_ON: u32 = 0x0000_0100;
pub const EQ_CROSS: u32 = 0x0000_0200;
pub const EQ_AB: u32 = 0x0000_0800;

/// Strip routing to physical buses A1..A5
pub const BUS_A: [u32; 5] = [0x0000_1000, 0x0000_2000, 0x0000_4000, 0x0000_8000, 0x0008_0000];
/// Strip routing to virtual buses B1..B3
pub const BUS_B: [u32; 3] = [0x0001_0000, 0x0002_0000, 0x0004_0000];

/// The 11 mode bit-groups, in the order the signature table uses
const MODE_GROUPS: [u32; 11] = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x90, 0xA0, 0xB0];

/// Known `(state & group) >> 4` tuples per bus mode. Protocol constants.
const MODE_SIGNATURES: [(BusMode, [u32; 11]); 11] = [
    (BusMode::Amix, [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1]),
    (BusMode::Repeat, [0, 2, 2, 0, 0, 2, 2, 0, 0, 2, 2]),
    (BusMode::Bmix, [1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]),
    (BusMode::Composite, [0, 0, 0, 4, 4, 4, 4, 0, 0, 0, 0]),
    (BusMode::Tvmix, [1, 0, 1, 4, 5, 4, 5, 0, 1, 0, 1]),
    (BusMode::Upmix21, [0, 2, 2, 4, 4, 6, 6, 0, 0, 2, 2]),
    (BusMode::Upmix41, [1, 2, 3, 4, 5, 6, 7, 0, 1, 2, 3]),
    (BusMode::Upmix61, [0, 0, 0, 0, 0, 0, 0, 8, 8, 8, 8]),
    (BusMode::Centeronly, [1, 0, 1, 0, 1, 0, 1, 8, 9, 8, 9]),
    (BusMode::Lfeonly, [0, 2, 2, 0, 0, 2, 2, 8, 8, 10, 10]),
    (BusMode::Rearonly, [1, 2, 3, 0, 1, 2, 3, 8, 9, 10, 11]),
];

/// Attenuation (dB x 100) below which level jitter is ignored. Protocol constant.
pub const LEVEL_QUIET_FLOOR: u16 = 7200;

/// Raw level marking an unused slot
pub const LEVEL_INACTIVE: u16 = 0xFFFF;

pub fn flag(state: u32, mask: u32) -> bool {
    state & mask != 0
}

/// Routing mask for a strip output name (`A1`..`A5`, `B1`..`B3`)
pub fn route_mask(output: &str) -> Option<u32> {
    let (bank, n) = output.split_at(1);
    let n: usize = n.parse().ok()?;
    let index = n.checked_sub(1)?;
    match bank {
        "A" | "a" => BUS_A.get(index).copied(),
        "B" | "b" => BUS_B.get(index).copied(),
        _ => None,
    }
}

/// Match a bus state word against the mode signatures; no match is `Normal`
pub fn bus_mode(state: u32) -> BusMode {
    let groups = MODE_GROUPS.map(|group| (state & group) >> 4);
    MODE_SIGNATURES
        .iter()
        .find(|(_, signature)| *signature == groups)
        .map(|(mode, _)| *mode)
        .unwrap_or(BusMode::Normal)
}

/// Signed gain in hundredths of a dB
pub fn gain_centibels(raw: u16) -> i32 {
    if raw < 10000 {
        -(raw as i32)
    } else if raw == 0xFFFF {
        0
    } else {
        (0xFFFF - raw) as i32
    }
}

/// Gain in dB, rounded to one decimal
pub fn gain_db(raw: u16) -> f64 {
    round1(gain_centibels(raw) as f64 * 0.01)
}

/// Inverse of [`gain_db`]; exact only to 0.01 dB
pub fn encode_gain(db: f64) -> u16 {
    let centibels = (db * 100.0).round() as i32;
    if centibels <= 0 {
        (-centibels).min(9999) as u16
    } else {
        (0xFFFF - centibels.min(0xFFFF - 10000)) as u16
    }
}

/// Meter reading in dB, rounded to one decimal
pub fn level_db(raw: u16) -> f64 {
    round1(-((0xFFFF - raw) as f64) * 0.01)
}

/// True when a level slot should count as changed.
///
/// Differences are ignored while both readings sit below the quiet floor.
pub fn level_changed(previous: u16, current: u16) -> bool {
    previous != current && (is_audible(previous) || is_audible(current))
}

fn is_audible(raw: u16) -> bool {
    0xFFFF - raw <= LEVEL_QUIET_FLOOR
}

/// Per-slot changed mask plus whether any slot changed
pub fn level_changes(previous: &[u16], current: &[u16]) -> (Vec<bool>, bool) {
    let mask: Vec<bool> = previous
        .iter()
        .zip(current)
        .map(|(&p, &c)| level_changed(p, c))
        .collect();
    let any = mask.iter().any(|&changed| changed);
    (mask, any)
}

/// Label bytes up to the first NUL
pub fn decode_label(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn round1(value: f64) -> f64 {
    let rounded = (value * 10.0).round() / 10.0;
    // avoid handing out -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_decode_edge_values() {
        assert_eq!(gain_centibels(0), 0);
        assert_eq!(gain_db(0), 0.0);
        assert_eq!(gain_centibels(9999), -9999);
        assert_eq!(gain_db(9999), -100.0);
        assert_eq!(gain_centibels(10000), 55535);
        assert_eq!(gain_centibels(0xFFFF), 0);
        assert_eq!(gain_db(0xFFFF), 0.0);
        assert_eq!(gain_centibels(0xFFFE), 1);
    }

    #[test]
    fn test_gain_roundtrip_is_value_identical() {
        for raw in [0u16, 9999, 10000, 0xFFFE, 0xFFFF, 600, 0xFFFF - 1200] {
            let db = gain_centibels(raw) as f64 / 100.0;
            assert_eq!(gain_centibels(encode_gain(db)), gain_centibels(raw), "raw {}", raw);
        }
        assert_eq!(gain_db(encode_gain(-6.3)), -6.3);
        assert_eq!(gain_db(encode_gain(12.0)), 12.0);
    }

    #[test]
    fn test_level_db() {
        assert_eq!(level_db(0xFFFF), 0.0);
        assert_eq!(level_db(0xFFFF - 1000), -10.0);
        assert_eq!(level_db(0xFFFF - 7234), -72.3);
    }

    // LEVEL_QUIET_FLOOR is a protocol-fidelity constant, not a tunable
    #[test]
    fn test_level_tolerance_rule() {
        let quiet = 0xFFFF - 9000;
        assert!(!level_changed(quiet, quiet + 3));
        let loud = 0xFFFF - 1000;
        assert!(level_changed(loud, loud + 1));
        assert!(level_changed(loud, loud - 1));
        assert!(!level_changed(loud, loud));
        assert!(level_changed(quiet, loud));
    }

    #[test]
    fn test_level_changes_mask() {
        let previous = [0xFFFF - 9000, 0xFFFF - 1000, 0xFFFF - 500];
        let current = [0xFFFF - 9001, 0xFFFF - 1000, 0xFFFF - 400];
        let (mask, any) = level_changes(&previous, &current);
        assert_eq!(mask, vec![false, false, true]);
        assert!(any);

        let (_, any) = level_changes(&previous[..2], &current[..2]);
        assert!(!any);
    }

    // MODE_SIGNATURES is a protocol-fidelity constant table
    #[test]
    fn test_bus_mode_signatures() {
        assert_eq!(bus_mode(0x40), BusMode::Composite);
        assert_eq!(bus_mode(0x40 | MUTE | EQ_ON), BusMode::Composite);
        assert_eq!(bus_mode(0x10), BusMode::Amix);
        assert_eq!(bus_mode(0x30), BusMode::Bmix);
        assert_eq!(bus_mode(0xB0), BusMode::Rearonly);
        assert_eq!(bus_mode(0), BusMode::Normal);
        assert_eq!(bus_mode(0xF0), BusMode::Normal);
    }

    #[test]
    fn test_routes_and_labels() {
        assert_eq!(route_mask("A1"), Some(0x1000));
        assert_eq!(route_mask("A5"), Some(0x80000));
        assert_eq!(route_mask("B3"), Some(0x40000));
        assert_eq!(route_mask("A6"), None);
        assert_eq!(route_mask("C1"), None);
        assert_eq!(route_mask("A0"), None);

        let mut raw = [0u8; 60];
        raw[..6].copy_from_slice(b"podmic");
        raw[7] = b'x';
        assert_eq!(decode_label(&raw), "podmic");
        assert!(flag(MUTE | SOLO, SOLO));
        assert!(!flag(MUTE, MONO));
    }
}
