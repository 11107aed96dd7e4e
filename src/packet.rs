//! Over-the-air packet layouts: the bind parameter block, the packet-size
//! groups, airtime/interval accounting, and servo-channel unpacking.

use heapless::Vec;

/// Version of the binding layout this engine speaks.
pub const BINDING_VERSION: u8 = 0x25;
/// Protocol release identifier, BCD-packed (`0x0350` = 3.5.0).
pub const PROTOCOL_VERSION: u16 = 0x0350;
/// Header magic used on the bind channel.
pub const BIND_MAGIC: u32 = 0xdec1_be15 + BINDING_VERSION as u32;
/// Fixed carrier used while binding, Hz.
pub const BINDING_FREQUENCY: u32 = 435_000_000;
/// TX power index used while binding.
pub const BINDING_POWER: u8 = 0x06;

/// Maximum number of hop channels in a bind block; the list is
/// zero-terminated when shorter.
pub const MAXHOPS: usize = 24;
/// Maximum servo channels a data packet can carry.
pub const PPM_CHANNELS: usize = 16;
/// Largest data-packet size of any packet-size group.
pub const MAX_PACKET: usize = 21;
/// Airtime-accounting size of a downlink telemetry frame.
pub const TELEMETRY_PACKETSIZE: u32 = 9;

/// Bind-flags bit: telemetry in either framing is enabled.
pub const TELEMETRY_MASK: u8 = 0x18;
/// Bind-flags bit: dual-receiver diversity, lengthening the preamble.
pub const DIVERSITY_ENABLED: u8 = 0x80;

/// Leading byte of a transmitter's bind request.
pub const BIND_REQUEST_TAG: u8 = b'b';
/// The receiver's one-byte bind acknowledgement.
pub const BIND_ACK_TAG: u8 = b'B';

/// Data-packet sizes by `flags & 0x07`; groups 0 and 7 are reserved.
const PKTSIZES: [u8; 8] = [0, 7, 11, 12, 16, 17, 21, 0];

/// The parameter block a transmitter sends during bind, persisted on the
/// receiver and used to key every later session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BindData {
    /// Binding-layout version; must equal [`BINDING_VERSION`] to be
    /// accepted.
    pub version: u8,
    /// Baud rate of the transparent serial channel (unused by the link
    /// engine itself).
    pub serial_baudrate: u32,
    /// Operational carrier frequency, Hz.
    pub rf_frequency: u32,
    /// 32-bit link identifier, doubling as the 4-byte header pattern.
    pub rf_magic: u32,
    /// TX power index, 0-7.
    pub rf_power: u8,
    /// Hop step size in 10 kHz (low band) / 20 kHz (high band) units.
    pub rf_channel_spacing: u8,
    /// Row index into the modem parameter table.
    pub modem_params: u8,
    /// Packet-size group (bits 0-2), [`TELEMETRY_MASK`],
    /// [`DIVERSITY_ENABLED`].
    pub flags: u8,
    /// Zero-terminated ordered hop sequence.
    pub hopchannel: [u8; MAXHOPS],
}

/// An all-zero block; its version never matches [`BINDING_VERSION`], so a
/// freshly defaulted engine enters bind mode.
impl Default for BindData {
    fn default() -> Self {
        BindData {
            version: 0,
            serial_baudrate: 0,
            rf_frequency: 0,
            rf_magic: 0,
            rf_power: 0,
            rf_channel_spacing: 0,
            modem_params: 0,
            flags: 0,
            hopchannel: [0; MAXHOPS],
        }
    }
}

impl BindData {
    /// Serialized size of the block on the wire.
    pub const WIRE_SIZE: usize = 17 + MAXHOPS;

    /// The stock 433-band profile, handy on the bench when no transmitter
    /// has bound yet.
    pub fn stock() -> Self {
        let mut hopchannel = [0u8; MAXHOPS];
        hopchannel[..6].copy_from_slice(&[22, 10, 19, 34, 49, 41]);
        BindData {
            version: BINDING_VERSION,
            serial_baudrate: 115_200,
            rf_frequency: 435_000_000,
            rf_magic: 0xdead_feed,
            rf_power: 7,
            rf_channel_spacing: 5,
            modem_params: 2,
            flags: 2,
            hopchannel,
        }
    }

    /// Decode a block from its wire representation. Multi-byte fields are
    /// little-endian.
    pub fn from_wire(b: &[u8; Self::WIRE_SIZE]) -> Self {
        let mut hopchannel = [0u8; MAXHOPS];
        hopchannel.copy_from_slice(&b[17..]);
        BindData {
            version: b[0],
            serial_baudrate: u32::from_le_bytes([b[1], b[2], b[3], b[4]]),
            rf_frequency: u32::from_le_bytes([b[5], b[6], b[7], b[8]]),
            rf_magic: u32::from_le_bytes([b[9], b[10], b[11], b[12]]),
            rf_power: b[13],
            rf_channel_spacing: b[14],
            modem_params: b[15],
            flags: b[16],
            hopchannel,
        }
    }

    /// Encode the block into its wire representation.
    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut b = [0u8; Self::WIRE_SIZE];
        b[0] = self.version;
        b[1..5].copy_from_slice(&self.serial_baudrate.to_le_bytes());
        b[5..9].copy_from_slice(&self.rf_frequency.to_le_bytes());
        b[9..13].copy_from_slice(&self.rf_magic.to_le_bytes());
        b[13] = self.rf_power;
        b[14] = self.rf_channel_spacing;
        b[15] = self.modem_params;
        b[16] = self.flags;
        b[17..].copy_from_slice(&self.hopchannel);
        b
    }

    /// Size in bytes of a data packet under this binding.
    pub fn packet_size(&self) -> u8 {
        PKTSIZES[(self.flags & 0x07) as usize]
    }

    /// Number of channels in the hop sequence.
    pub fn hop_count(&self) -> u8 {
        let mut count = 0u8;
        while (count as usize) < MAXHOPS && self.hopchannel[count as usize] != 0 {
            count += 1;
        }
        count
    }

    /// Air data rate of the selected modem profile, bits per second.
    pub fn bps(&self) -> u32 {
        crate::rfm22b::registers::MODEM_PARAMS[self.modem_params as usize].bps
    }

    /// Nominal time between receptions in microseconds: packet airtime
    /// plus guard, plus the telemetry slot when enabled, rounded up to a
    /// whole millisecond. `limit_50hz` clamps the result to 20 ms.
    pub fn interval_us(&self, limit_50hz: bool) -> u32 {
        let diversity = self.flags & DIVERSITY_ENABLED != 0;
        let mut ret =
            bytes_at_baud_to_usec(self.packet_size() as u32, self.bps(), diversity) + 2000;

        if self.flags & TELEMETRY_MASK != 0 {
            ret += bytes_at_baud_to_usec(TELEMETRY_PACKETSIZE, self.bps(), diversity) + 1000;
        }

        // round up to ms
        ret = ((ret + 999) / 1000) * 1000;

        if limit_50hz && ret < 20_000 {
            ret = 20_000;
        }

        ret
    }
}

// Sending x bytes at baud rate y takes about (empirical)
// usec = (x + 15) * 8200000 / baudrate, 20 byte overhead with diversity.
fn bytes_at_baud_to_usec(bytes: u32, bps: u32, diversity: bool) -> u32 {
    (bytes + if diversity { 20 } else { 15 }) * 8_200_000 / bps
}

/// True when a data-packet header byte carries a servo frame.
pub fn is_servo_frame(header: u8) -> bool {
    header & 0x3e == 0x00
}

/// Unpack the servo channels of a data-packet payload (the bytes after
/// the header) for packet-size group `config`.
///
/// Each 5-byte group encodes four 10-bit channels; an odd group count
/// appends one byte of four coarse 2-bit channels mapped to the same
/// scale.
pub fn unpack_channels(config: u8, p: &[u8]) -> Vec<u16, PPM_CHANNELS> {
    let mut ppm = Vec::new();
    let mut at = 0usize;
    for _ in 0..=(config / 2) {
        // 4ch packed in 5 bytes
        let top = p[at + 4] as u16;
        for k in 0..4 {
            let _ = ppm.push(((top >> (2 * k)) & 0x03) << 8 | p[at + k] as u16);
        }
        at += 5;
    }
    if config & 1 != 0 {
        // 4ch packed in 1 byte
        let b = p[at] as u16;
        for k in [6u16, 4, 2, 0] {
            let _ = ppm.push(((b >> k) & 0x03) * 333 + 12);
        }
    }
    ppm
}
