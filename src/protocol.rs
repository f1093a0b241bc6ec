//! VBAN wire structures
//!
//! All packets start with the same 24 byte prologue:
//!
//! ```text
//! "VBAN" | sr/protocol (1) | nbs (1) | nbc/sub-format (1) | bit (1) | stream name (16)
//! ```
//!
//! Register and text packets append a little-endian frame counter. RT
//! snapshot packets carry a counter too, followed by a fixed 1384 byte body.

use crate::error::{Result, VbanError};

pub const VBAN_MAGIC: &[u8; 4] = b"VBAN";

pub const VBAN_PROTOCOL_TXT: u8 = 0x40;
pub const VBAN_PROTOCOL_SERVICE: u8 = 0x60;

pub const VBAN_SERVICE_RTPACKETREGISTER: u8 = 32;
pub const VBAN_SERVICE_RTPACKET: u8 = 33;

/// Largest datagram the remote accepts for a text command
pub const MAX_PACKET_SIZE: usize = 1436;

pub const STREAM_NAME_SIZE: usize = 16;
pub const PROLOGUE_SIZE: usize = 4 + 1 + 1 + 1 + 1 + STREAM_NAME_SIZE;
pub const HEADER_SIZE: usize = PROLOGUE_SIZE + 4;

pub const BODY_SIZE: usize = 1384;
pub const SNAPSHOT_SIZE: usize = HEADER_SIZE + BODY_SIZE;

pub const NUM_INPUT_LEVELS: usize = 34;
pub const NUM_OUTPUT_LEVELS: usize = 64;
pub const NUM_CHANNELS: usize = 8;
pub const NUM_GAIN_LAYERS: usize = 8;
pub const LABEL_SIZE: usize = 60;

/// Seconds the remote keeps streaming after one register packet
const REGISTER_TIMEOUT: u8 = 15;
const REGISTER_STREAM_NAME: &str = "Register RTP";
const SNAPSHOT_STREAM_NAME: &str = "Voicemeeter-RTP";
const TEXT_BIT: u8 = 0x10;

/// Valid serial-rate values for a text stream; the header stores the index
pub const BPS_OPTS: [u32; 25] = [
    0, 110, 150, 300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 31250, 38400, 57600, 115200,
    128000, 230400, 250000, 256000, 460800, 921600, 1000000, 1500000, 2000000, 3000000,
];

// Body field offsets relative to the start of the snapshot body
const OFF_TYPE: usize = 0;
const OFF_RESERVED: usize = 1;
const OFF_BUFFER_SIZE: usize = 2;
const OFF_VERSION: usize = 4;
const OFF_OPTION_BITS: usize = 8;
const OFF_SAMPLE_RATE: usize = 12;
const OFF_INPUT_LEVELS: usize = 16;
const OFF_OUTPUT_LEVELS: usize = 84;
const OFF_TRANSPORT_BITS: usize = 212;
const OFF_STRIP_STATE: usize = 216;
const OFF_BUS_STATE: usize = 248;
const OFF_GAIN_LAYERS: usize = 280;
const OFF_BUS_GAIN: usize = 408;
const OFF_STRIP_LABELS: usize = 424;
const OFF_BUS_LABELS: usize = 904;

/// Zero padded stream name, rejecting names that do not fit
pub fn stream_name(name: &str) -> Result<[u8; STREAM_NAME_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.len() > STREAM_NAME_SIZE {
        return Err(VbanError::Configuration(format!(
            "stream name '{}' is {} bytes, at most {} allowed",
            name,
            bytes.len(),
            STREAM_NAME_SIZE
        )));
    }
    let mut out = [0u8; STREAM_NAME_SIZE];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Index of a serial-rate value in [`BPS_OPTS`]
pub fn bps_index(bps: u32) -> Result<u8> {
    BPS_OPTS
        .iter()
        .position(|&opt| opt == bps)
        .map(|i| i as u8)
        .ok_or_else(|| {
            VbanError::Configuration(format!("invalid bps {}, expected one of {:?}", bps, BPS_OPTS))
        })
}

/// The common packet prologue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prologue {
    pub format_sr: u8,
    pub format_nbs: u8,
    pub format_nbc: u8,
    pub format_bit: u8,
    pub stream_name: [u8; STREAM_NAME_SIZE],
}

impl Prologue {
    /// Prologue of the keepalive/registration packet
    pub fn register() -> Self {
        Self {
            format_sr: VBAN_PROTOCOL_SERVICE,
            format_nbs: 0,
            format_nbc: VBAN_SERVICE_RTPACKETREGISTER,
            format_bit: REGISTER_TIMEOUT,
            stream_name: fixed_name(REGISTER_STREAM_NAME),
        }
    }

    /// Prologue every RT snapshot from the remote must carry
    pub fn snapshot() -> Self {
        Self {
            format_sr: VBAN_PROTOCOL_SERVICE,
            format_nbs: 0,
            format_nbc: VBAN_SERVICE_RTPACKET,
            format_bit: 0,
            stream_name: fixed_name(SNAPSHOT_STREAM_NAME),
        }
    }

    /// Prologue of a VBAN-TEXT request
    pub fn text(name: &str, bps: u32, channel: u8) -> Result<Self> {
        Ok(Self {
            format_sr: VBAN_PROTOCOL_TXT + bps_index(bps)?,
            format_nbs: 0,
            format_nbc: channel,
            format_bit: TEXT_BIT,
            stream_name: stream_name(name)?,
        })
    }

    pub fn to_bytes(&self) -> [u8; PROLOGUE_SIZE] {
        let mut out = [0u8; PROLOGUE_SIZE];
        out[..4].copy_from_slice(VBAN_MAGIC);
        out[4] = self.format_sr;
        out[5] = self.format_nbs;
        out[6] = self.format_nbc;
        out[7] = self.format_bit;
        out[8..].copy_from_slice(&self.stream_name);
        out
    }
}

fn fixed_name(name: &str) -> [u8; STREAM_NAME_SIZE] {
    let mut out = [0u8; STREAM_NAME_SIZE];
    out[..name.len()].copy_from_slice(name.as_bytes());
    out
}

/// Registration packet, resent periodically to keep snapshots flowing
#[derive(Debug, Clone)]
pub struct RegisterPacket {
    prologue: Prologue,
    framecounter: u32,
}

impl RegisterPacket {
    pub fn new() -> Self {
        Self {
            prologue: Prologue::register(),
            framecounter: 0,
        }
    }

    pub fn framecounter(&self) -> u32 {
        self.framecounter
    }

    /// Encode the current packet and advance the frame counter
    pub fn next_packet(&mut self) -> Vec<u8> {
        let packet = encode_with_counter(&self.prologue, self.framecounter, &[]);
        self.framecounter = self.framecounter.wrapping_add(1);
        packet
    }
}

impl Default for RegisterPacket {
    fn default() -> Self {
        Self::new()
    }
}

/// VBAN-TEXT request builder
#[derive(Debug, Clone)]
pub struct TextRequest {
    prologue: Prologue,
    framecounter: u32,
}

impl TextRequest {
    pub fn new(name: &str, bps: u32, channel: u8) -> Result<Self> {
        Ok(Self {
            prologue: Prologue::text(name, bps, channel)?,
            framecounter: 0,
        })
    }

    pub fn framecounter(&self) -> u32 {
        self.framecounter
    }

    /// Encode a command script and advance the frame counter.
    ///
    /// The datagram limit of [`MAX_PACKET_SIZE`] is the caller's concern.
    pub fn next_packet(&mut self, script: &str) -> Vec<u8> {
        let packet = encode_with_counter(&self.prologue, self.framecounter, script.as_bytes());
        self.framecounter = self.framecounter.wrapping_add(1);
        packet
    }
}

fn encode_with_counter(prologue: &Prologue, counter: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&prologue.to_bytes());
    out.extend_from_slice(&counter.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// One decoded RT packet: the remote's complete parameter state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub mixer_type: u8,
    pub reserved: u8,
    pub buffer_size: u16,
    pub version: [u8; 4],
    pub option_bits: u32,
    pub sample_rate: u32,
    pub input_levels: [u16; NUM_INPUT_LEVELS],
    pub output_levels: [u16; NUM_OUTPUT_LEVELS],
    pub transport_bits: u32,
    pub strip_state: [u32; NUM_CHANNELS],
    pub bus_state: [u32; NUM_CHANNELS],
    /// `strip_gain_layers[layer][strip]`
    pub strip_gain_layers: [[u16; NUM_CHANNELS]; NUM_GAIN_LAYERS],
    pub bus_gain: [u16; NUM_CHANNELS],
    pub strip_labels: [[u8; LABEL_SIZE]; NUM_CHANNELS],
    pub bus_labels: [[u8; LABEL_SIZE]; NUM_CHANNELS],
}

impl Snapshot {
    /// An all-zero snapshot, used before the first packet arrives
    pub fn empty() -> Self {
        Self {
            mixer_type: 0,
            reserved: 0,
            buffer_size: 0,
            version: [0; 4],
            option_bits: 0,
            sample_rate: 0,
            input_levels: [0; NUM_INPUT_LEVELS],
            output_levels: [0; NUM_OUTPUT_LEVELS],
            transport_bits: 0,
            strip_state: [0; NUM_CHANNELS],
            bus_state: [0; NUM_CHANNELS],
            strip_gain_layers: [[0; NUM_CHANNELS]; NUM_GAIN_LAYERS],
            bus_gain: [0; NUM_CHANNELS],
            strip_labels: [[0; LABEL_SIZE]; NUM_CHANNELS],
            bus_labels: [[0; LABEL_SIZE]; NUM_CHANNELS],
        }
    }

    /// Validate and decode one datagram.
    ///
    /// Anything that is not an RT packet (wrong magic, wrong service,
    /// truncated) yields [`VbanError::Decode`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() <= HEADER_SIZE {
            return Err(VbanError::Decode(format!("datagram of {} bytes has no body", data.len())));
        }
        if data[..PROLOGUE_SIZE] != Prologue::snapshot().to_bytes() {
            return Err(VbanError::Decode("not a VBAN RT packet".to_string()));
        }
        if data.len() < SNAPSHOT_SIZE {
            return Err(VbanError::Decode(format!(
                "RT packet truncated: {} of {} bytes",
                data.len(),
                SNAPSHOT_SIZE
            )));
        }

        let body = &data[HEADER_SIZE..SNAPSHOT_SIZE];
        let mut snapshot = Self::empty();
        snapshot.mixer_type = body[OFF_TYPE];
        snapshot.reserved = body[OFF_RESERVED];
        snapshot.buffer_size = read_u16(body, OFF_BUFFER_SIZE);
        snapshot.version.copy_from_slice(&body[OFF_VERSION..OFF_VERSION + 4]);
        snapshot.option_bits = read_u32(body, OFF_OPTION_BITS);
        snapshot.sample_rate = read_u32(body, OFF_SAMPLE_RATE);
        read_u16_array(body, OFF_INPUT_LEVELS, &mut snapshot.input_levels);
        read_u16_array(body, OFF_OUTPUT_LEVELS, &mut snapshot.output_levels);
        snapshot.transport_bits = read_u32(body, OFF_TRANSPORT_BITS);
        for i in 0..NUM_CHANNELS {
            snapshot.strip_state[i] = read_u32(body, OFF_STRIP_STATE + i * 4);
            snapshot.bus_state[i] = read_u32(body, OFF_BUS_STATE + i * 4);
        }
        for (layer, gains) in snapshot.strip_gain_layers.iter_mut().enumerate() {
            read_u16_array(body, OFF_GAIN_LAYERS + layer * NUM_CHANNELS * 2, gains);
        }
        read_u16_array(body, OFF_BUS_GAIN, &mut snapshot.bus_gain);
        for i in 0..NUM_CHANNELS {
            let strip = OFF_STRIP_LABELS + i * LABEL_SIZE;
            snapshot.strip_labels[i].copy_from_slice(&body[strip..strip + LABEL_SIZE]);
            let bus = OFF_BUS_LABELS + i * LABEL_SIZE;
            snapshot.bus_labels[i].copy_from_slice(&body[bus..bus + LABEL_SIZE]);
        }
        Ok(snapshot)
    }

    /// Encode as a complete RT datagram (what the remote would send)
    pub fn encode(&self, framecounter: u32) -> Vec<u8> {
        let mut body = vec![0u8; BODY_SIZE];
        body[OFF_TYPE] = self.mixer_type;
        body[OFF_RESERVED] = self.reserved;
        write_u16(&mut body, OFF_BUFFER_SIZE, self.buffer_size);
        body[OFF_VERSION..OFF_VERSION + 4].copy_from_slice(&self.version);
        write_u32(&mut body, OFF_OPTION_BITS, self.option_bits);
        write_u32(&mut body, OFF_SAMPLE_RATE, self.sample_rate);
        write_u16_array(&mut body, OFF_INPUT_LEVELS, &self.input_levels);
        write_u16_array(&mut body, OFF_OUTPUT_LEVELS, &self.output_levels);
        write_u32(&mut body, OFF_TRANSPORT_BITS, self.transport_bits);
        for i in 0..NUM_CHANNELS {
            write_u32(&mut body, OFF_STRIP_STATE + i * 4, self.strip_state[i]);
            write_u32(&mut body, OFF_BUS_STATE + i * 4, self.bus_state[i]);
        }
        for (layer, gains) in self.strip_gain_layers.iter().enumerate() {
            write_u16_array(&mut body, OFF_GAIN_LAYERS + layer * NUM_CHANNELS * 2, gains);
        }
        write_u16_array(&mut body, OFF_BUS_GAIN, &self.bus_gain);
        for i in 0..NUM_CHANNELS {
            let strip = OFF_STRIP_LABELS + i * LABEL_SIZE;
            body[strip..strip + LABEL_SIZE].copy_from_slice(&self.strip_labels[i]);
            let bus = OFF_BUS_LABELS + i * LABEL_SIZE;
            body[bus..bus + LABEL_SIZE].copy_from_slice(&self.bus_labels[i]);
        }
        encode_with_counter(&Prologue::snapshot(), framecounter, &body)
    }

    /// True iff any non-level field differs from `other`
    pub fn pdirty(&self, other: &Snapshot) -> bool {
        self.mixer_type != other.mixer_type
            || self.reserved != other.reserved
            || self.buffer_size != other.buffer_size
            || self.version != other.version
            || self.option_bits != other.option_bits
            || self.sample_rate != other.sample_rate
            || self.transport_bits != other.transport_bits
            || self.strip_state != other.strip_state
            || self.bus_state != other.bus_state
            || self.strip_gain_layers != other.strip_gain_layers
            || self.bus_gain != other.bus_gain
            || self.strip_labels != other.strip_labels
            || self.bus_labels != other.bus_labels
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u16_array(buf: &[u8], offset: usize, out: &mut [u16]) {
    for (i, value) in out.iter_mut().enumerate() {
        *value = read_u16(buf, offset + i * 2);
    }
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u16_array(buf: &mut [u8], offset: usize, values: &[u16]) {
    for (i, value) in values.iter().enumerate() {
        write_u16(buf, offset + i * 2, *value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_packet_layout_and_counter() {
        let mut register = RegisterPacket::new();
        let first = register.next_packet();
        assert_eq!(first.len(), HEADER_SIZE);
        assert_eq!(&first[..4], b"VBAN");
        assert_eq!(first[4], 0x60);
        assert_eq!(first[6], 32);
        assert_eq!(first[7], 15);
        assert_eq!(&first[8..20], b"Register RTP");
        assert_eq!(&first[24..28], &0u32.to_le_bytes());

        let second = register.next_packet();
        assert_eq!(&second[24..28], &1u32.to_le_bytes());
    }

    #[test]
    fn test_register_counter_wraps() {
        let mut register = RegisterPacket {
            prologue: Prologue::register(),
            framecounter: u32::MAX,
        };
        let packet = register.next_packet();
        assert_eq!(&packet[24..28], &u32::MAX.to_le_bytes());
        assert_eq!(register.framecounter(), 0);
    }

    #[test]
    fn test_text_request_header() {
        let mut request = TextRequest::new("Command1", 9600, 3).unwrap();
        let packet = request.next_packet("Strip[0].mute=1;");
        assert_eq!(packet[4], VBAN_PROTOCOL_TXT + 8);
        assert_eq!(packet[6], 3);
        assert_eq!(packet[7], 0x10);
        assert_eq!(&packet[8..16], b"Command1");
        assert_eq!(&packet[16..24], &[0u8; 8]);
        assert_eq!(&packet[HEADER_SIZE..], b"Strip[0].mute=1;");
        assert_eq!(request.framecounter(), 1);
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            TextRequest::new("a-stream-name-too-long", 0, 0),
            Err(VbanError::Configuration(_))
        ));
        assert!(matches!(TextRequest::new("Command1", 1234, 0), Err(VbanError::Configuration(_))));
        assert!(stream_name("exactly16bytes!!").is_ok());
    }

    #[test]
    fn test_snapshot_body_offsets() {
        let mut snapshot = Snapshot::empty();
        snapshot.mixer_type = 3;
        snapshot.sample_rate = 48000;
        snapshot.input_levels[0] = 0x1234;
        snapshot.output_levels[63] = 0xBEEF;
        snapshot.strip_state[2] = 0x0000_1001;
        snapshot.bus_state[7] = 0x40;
        snapshot.strip_gain_layers[7][7] = 600;
        snapshot.bus_gain[0] = 0xFFFF;
        snapshot.bus_labels[7][..3].copy_from_slice(b"end");

        let data = snapshot.encode(9);
        assert_eq!(data.len(), SNAPSHOT_SIZE);
        assert_eq!(data[28], 3);
        assert_eq!(&data[40..44], &48000u32.to_le_bytes());
        assert_eq!(&data[44..46], &0x1234u16.to_le_bytes());
        assert_eq!(&data[238..240], &0xBEEFu16.to_le_bytes());
        assert_eq!(&data[252..256], &0x1001u32.to_le_bytes());
        assert_eq!(&data[304..308], &0x40u32.to_le_bytes());
        assert_eq!(&data[434..436], &600u16.to_le_bytes());
        assert_eq!(&data[436..438], &0xFFFFu16.to_le_bytes());
        assert_eq!(&data[1352..1355], b"end");

        assert_eq!(Snapshot::decode(&data).unwrap(), snapshot);
    }

    #[test]
    fn test_decode_rejects_foreign_datagrams() {
        let mut data = Snapshot::empty().encode(0);
        data[0] = b'X';
        assert!(matches!(Snapshot::decode(&data), Err(VbanError::Decode(_))));

        let mut data = Snapshot::empty().encode(0);
        data[6] = VBAN_SERVICE_RTPACKETREGISTER;
        assert!(matches!(Snapshot::decode(&data), Err(VbanError::Decode(_))));

        let data = Snapshot::empty().encode(0);
        assert!(matches!(Snapshot::decode(&data[..HEADER_SIZE]), Err(VbanError::Decode(_))));
        assert!(matches!(Snapshot::decode(&data[..500]), Err(VbanError::Decode(_))));
    }

    #[test]
    fn test_pdirty_ignores_levels() {
        let a = Snapshot::empty();
        let mut b = a.clone();
        b.input_levels[3] = 100;
        b.output_levels[10] = 100;
        assert!(!b.pdirty(&a));

        b.bus_state[1] = 1;
        assert!(b.pdirty(&a));

        let mut c = a.clone();
        c.strip_labels[0][0] = b'x';
        assert!(c.pdirty(&a));
    }
}
