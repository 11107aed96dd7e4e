//! Parameters and status types shared across the crate.

/// Errors reported by the link engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// An SPI bus transaction failed.
    Spi,
    /// The device-type probe did not find an RFM22B; carries the masked
    /// value that was read back.
    DeviceAbsent(u8),
}

/// The radio's operating mode, shared between the driver task and the
/// interrupt handler.
///
/// The interrupt handler only ever performs `Transmit -> Transmitted` and
/// `Receive -> Received`; everything else belongs to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RfMode {
    /// No operation in flight.
    Available = 0,
    /// A transmission has been started and the sent interrupt is armed.
    Transmit = 1,
    /// The packet-sent interrupt fired.
    Transmitted = 2,
    /// The receiver is armed and the packet-valid interrupt is enabled.
    Receive = 3,
    /// The packet-valid interrupt fired; the FIFO holds a frame.
    Received = 4,
}

impl RfMode {
    pub(crate) fn from_u8(raw: u8) -> RfMode {
        match raw {
            1 => RfMode::Transmit,
            2 => RfMode::Transmitted,
            3 => RfMode::Receive,
            4 => RfMode::Received,
            _ => RfMode::Available,
        }
    }
}

/// Which radio GPIO drives the TX antenna switch and which the RX one.
/// Depends on board layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioDirection {
    /// GPIO0 follows the TX state, GPIO1 the RX state.
    #[default]
    Gpio0TxGpio1Rx,
    /// GPIO0 follows the RX state, GPIO1 the TX state.
    Gpio0RxGpio1Tx,
}

/// Board-level configuration for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Antenna-switch routing of the radio GPIOs.
    pub gpio_direction: GpioDirection,
    /// Clamp the packet interval so the servo frame rate never exceeds
    /// 50 Hz.
    pub limit_rate_50hz: bool,
}

/// Coarse phase of the link state machine.
///
/// `Synchronized` and `Lost` are distinctions over the same hop schedule;
/// they differ only in how the scheduler paces channel advances. A session
/// never returns to `BindListening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkPhase {
    /// Waiting on the bind channel for a transmitter's parameter block.
    BindListening,
    /// Bound but no packet received yet; slow-hopping in search of the
    /// transmitter.
    Acquiring,
    /// Phase-locked to the transmitter's hop schedule.
    Synchronized,
    /// Missing packets; hopping on the synthetic schedule (or slow-hopping
    /// once every full hop cycle after the schedule is exhausted).
    Lost,
}

/// Snapshot of link health, taken by [`crate::OpenLrs::link_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// Current phase of the link state machine.
    pub phase: LinkPhase,
    /// Exponentially smoothed RSSI.
    pub rssi_smooth: u8,
    /// Most recent raw RSSI sample.
    pub rssi_last: u8,
    /// Most recent AFC correction reading.
    pub afc_last: u16,
    /// Shift register of recent packet outcomes; bit set = received.
    pub link_quality: u16,
    /// Consecutive missed packets since the last reception.
    pub lost_packets: u8,
    /// True once any valid packet has been received this session.
    pub link_acquired: bool,
    /// Wall-clock milliseconds of the first miss of the current loss run.
    pub link_loss_time_ms: u32,
}

impl LinkStats {
    /// Link quality as a percentage over the last 15 packet intervals.
    pub fn quality_percent(&self) -> u8 {
        (((self.link_quality & 0x7fff).count_ones() * 100) / 15) as u8
    }
}
