//! The link engine: hop scheduling phase-locked to the transmitter,
//! loss detection and resync, receiver-side bind, and the cooperative
//! driver loop tying them together.

use core::sync::atomic::{AtomicU8, Ordering};

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use heapless::Vec;

use crate::mod_params::{Config, Error, LinkPhase, LinkStats, RfMode};
use crate::mod_traits::{BindStore, Clock, PpmSink, Watchdog};
use crate::packet::{
    is_servo_frame, unpack_channels, BindData, BINDING_VERSION, BIND_ACK_TAG, BIND_REQUEST_TAG,
    MAXHOPS, MAX_PACKET, PPM_CHANNELS, PROTOCOL_VERSION,
};
use crate::rfm22b::registers::PowerState;
use crate::rfm22b::Rfm22b;

/// Ceiling on a synchronous transmission before the radio is rolled back
/// to READY.
const TX_TIMEOUT_US: u32 = 100_000;

/// The radio-mode flag shared between the driver task and the interrupt
/// handler.
///
/// Place one in a `static`, hand a reference to [`OpenLrs::new`], and call
/// [`RfModeFlag::on_irq`] from the platform's ISR glue for the radio's
/// interrupt line. The handler performs no I/O; register access triggered
/// by an interrupt happens on the task's next tick.
pub struct RfModeFlag(AtomicU8);

impl RfModeFlag {
    /// A flag starting out in [`RfMode::Available`].
    pub const fn new() -> Self {
        Self(AtomicU8::new(RfMode::Available as u8))
    }

    /// Note the radio interrupt: `Transmit` becomes `Transmitted`,
    /// `Receive` becomes `Received`, anything else is left alone.
    pub fn on_irq(&self) {
        let _ = self
            .0
            .compare_exchange(
                RfMode::Transmit as u8,
                RfMode::Transmitted as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .or_else(|_| {
                self.0.compare_exchange(
                    RfMode::Receive as u8,
                    RfMode::Received as u8,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
            });
    }

    pub(crate) fn get(&self) -> RfMode {
        RfMode::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, mode: RfMode) {
        self.0.store(mode as u8, Ordering::Release);
    }
}

impl Default for RfModeFlag {
    fn default() -> Self {
        Self::new()
    }
}

// All the scheduler's bookkeeping in one owned record.
struct LinkState {
    rf_channel: u8,
    link_acquired: bool,
    last_packet_time_us: u32,
    last_rssi_time_us: u32,
    lost_packets: u8,
    link_quality: u16,
    rssi_last: u8,
    rssi_smooth: u8,
    rssi_sum: u16,
    rssi_count: u8,
    afc_last: u16,
    link_loss_time_ms: u32,
    willhop: bool,
    rx_buf: [u8; MAX_PACKET],
    ppm: Vec<u16, PPM_CHANNELS>,
}

impl LinkState {
    fn new() -> Self {
        LinkState {
            rf_channel: 0,
            link_acquired: false,
            last_packet_time_us: 0,
            last_rssi_time_us: 0,
            lost_packets: 0,
            link_quality: 0,
            rssi_last: 0,
            rssi_smooth: 0,
            rssi_sum: 0,
            rssi_count: 0,
            afc_last: 0,
            link_loss_time_ms: 0,
            willhop: false,
            rx_buf: [0; MAX_PACKET],
            ppm: Vec::new(),
        }
    }
}

/// The OpenLRS receiver link engine.
///
/// Owns the radio and every platform collaborator; the board hands all of
/// them over once at init and then only interacts through
/// [`RfModeFlag::on_irq`] and whatever task runs [`OpenLrs::run`].
pub struct OpenLrs<SPI, DLY, CLK, WDG, STO, SNK = ()> {
    radio: Rfm22b<SPI>,
    delay: DLY,
    clock: CLK,
    watchdog: WDG,
    store: STO,
    config: Config,
    rf_mode: &'static RfModeFlag,
    bind_data: BindData,
    hop_count: u8,
    binding: bool,
    state: LinkState,
    sink: Option<SNK>,
}

impl<SPI, DLY, CLK, WDG, STO, SNK> OpenLrs<SPI, DLY, CLK, WDG, STO, SNK>
where
    SPI: SpiDevice<u8>,
    DLY: DelayNs,
    CLK: Clock,
    WDG: Watchdog,
    STO: BindStore,
    SNK: PpmSink,
{
    /// Probe the radio and build an engine around it.
    ///
    /// Bind parameters come from the store; with nothing stored the engine
    /// starts unbound and [`OpenLrs::run`] will listen for a bind.
    pub fn new(
        spi: SPI,
        delay: DLY,
        clock: CLK,
        watchdog: WDG,
        mut store: STO,
        config: Config,
        rf_mode: &'static RfModeFlag,
    ) -> Result<Self, Error> {
        let mut radio = Rfm22b::new(spi);
        radio.probe()?;
        let bind_data = store.load().unwrap_or_default();
        Ok(Self {
            radio,
            delay,
            clock,
            watchdog,
            store,
            config,
            rf_mode,
            bind_data,
            hop_count: 0,
            binding: false,
            state: LinkState::new(),
            sink: None,
        })
    }

    /// Register the downstream consumer of decoded servo frames.
    pub fn register_ppm_sink(&mut self, sink: SNK) {
        self.sink = Some(sink);
    }

    /// The binding currently in force.
    pub fn bind_data(&self) -> &BindData {
        &self.bind_data
    }

    /// The most recently decoded servo frame.
    pub fn last_ppm(&self) -> &Vec<u16, PPM_CHANNELS> {
        &self.state.ppm
    }

    /// Snapshot of the link health counters.
    pub fn link_stats(&self) -> LinkStats {
        LinkStats {
            phase: self.phase(),
            rssi_smooth: self.state.rssi_smooth,
            rssi_last: self.state.rssi_last,
            afc_last: self.state.afc_last,
            link_quality: self.state.link_quality,
            lost_packets: self.state.lost_packets,
            link_acquired: self.state.link_acquired,
            link_loss_time_ms: self.state.link_loss_time_ms,
        }
    }

    fn phase(&self) -> LinkPhase {
        if self.binding {
            LinkPhase::BindListening
        } else if !self.state.link_acquired {
            LinkPhase::Acquiring
        } else if self.state.lost_packets == 0 {
            LinkPhase::Synchronized
        } else {
            LinkPhase::Lost
        }
    }

    /// The driver task: decide whether to bind, set up, then run the
    /// scheduler at 1 kHz forever.
    pub fn run(&mut self) -> ! {
        let bind = self.bind_data.version != BINDING_VERSION;
        if self.setup(bind).is_err() {
            warn!("receiver setup failed; retrying from the scheduler");
        }
        loop {
            self.watchdog.kick();
            if self.tick().is_err() {
                warn!("scheduler tick failed");
            }
            self.delay.delay_ms(1);
        }
    }

    /// Configure the radio for the current binding and enter receive.
    /// With `bind` set (or no valid stored binding), listens for a bind
    /// exchange first.
    pub fn setup(&mut self, bind: bool) -> Result<(), Error> {
        info!(
            "OpenLRSng RX setup starting, protocol {}.{}.{}",
            (PROTOCOL_VERSION >> 8) & 0x0f,
            (PROTOCOL_VERSION >> 4) & 0x0f,
            PROTOCOL_VERSION & 0x0f,
        );

        if bind && self.bind_receive(0)? {
            info!("bound and persisted");
        }

        info!("entering normal mode");
        self.radio.init(&self.bind_data, &self.config, false)?;
        self.state.rf_channel = 0;
        self.radio.set_channel(&self.bind_data, 0)?;
        self.hop_count = self.bind_data.hop_count();

        self.rf_mode.set(RfMode::Receive);
        self.radio.to_rx(&mut self.delay)?;

        self.state.link_acquired = false;
        self.state.last_packet_time_us = self.clock.now_us();

        info!("OpenLRSng RX setup complete");
        Ok(())
    }

    /// Listen on the bind channel for a transmitter's parameter block.
    ///
    /// Accepts a `'b'`-tagged block whose version matches, acknowledges it
    /// with a single `'B'`, persists it, and returns `Ok(true)`. A zero
    /// `timeout_ms` listens forever. The watchdog is kept fed while
    /// waiting.
    pub fn bind_receive(&mut self, timeout_ms: u32) -> Result<bool, Error> {
        let start = self.clock.now_ms();
        self.binding = true;
        self.radio.init(&self.bind_data, &self.config, true)?;
        self.rf_mode.set(RfMode::Receive);
        self.radio.to_rx(&mut self.delay)?;
        info!("waiting for bind");

        let mut iteration: u32 = 0;
        while timeout_ms == 0 || self.clock.now_ms().wrapping_sub(start) < timeout_ms {
            self.delay.delay_ms(1);
            self.watchdog.kick();

            if iteration % 100 == 0 {
                debug!("bind listen, rf_mode {}", self.rf_mode.get() as u8);
            }
            iteration += 1;

            if self.rf_mode.get() == RfMode::Received {
                let mut tag = [0u8; 1];
                self.radio.read_fifo(&mut tag)?;
                if tag[0] == BIND_REQUEST_TAG {
                    let mut body = [0u8; BindData::WIRE_SIZE];
                    self.radio.read_fifo(&mut body)?;
                    let candidate = BindData::from_wire(&body);
                    debug!("bind block, version {}", candidate.version);
                    if candidate.version == BINDING_VERSION {
                        info!("bind data good");
                        self.bind_data = candidate;
                        self.tx_packet(&[BIND_ACK_TAG])?;
                        if self.store.save(&self.bind_data).is_err() {
                            warn!("bind save failed; continuing on the in-memory binding");
                        }
                        self.binding = false;
                        return Ok(true);
                    }
                }
                self.rf_mode.set(RfMode::Receive);
                self.radio.rx_reset()?;
            }
        }
        self.binding = false;
        Ok(false)
    }

    /// One scheduler iteration, run at roughly 1 kHz.
    pub fn tick(&mut self) -> Result<(), Error> {
        if self.radio.is_wedged()? {
            warn!("RX hang");
            self.radio.init(&self.bind_data, &self.config, false)?;
            self.radio.to_rx(&mut self.delay)?;
        }

        let interval = self.bind_data.interval_us(self.config.limit_rate_50hz);

        if self.rf_mode.get() == RfMode::Received {
            // Timestamp before touching the bus so contention cannot skew
            // the hop schedule.
            let drain_time_us = self.clock.now_us();

            let size = self.bind_data.packet_size() as usize;
            self.radio.read_fifo(&mut self.state.rx_buf[..size])?;
            self.state.afc_last = self.radio.read_afc()?;

            self.state.last_packet_time_us = drain_time_us;
            self.state.lost_packets = 0;
            self.state.link_quality = (self.state.link_quality << 1) | 1;

            if size > 0 && is_servo_frame(self.state.rx_buf[0]) {
                self.state.ppm =
                    unpack_channels(self.bind_data.flags & 0x07, &self.state.rx_buf[1..size]);
                if let Some(sink) = self.sink.as_mut() {
                    sink.ppm_frame(&self.state.ppm);
                }
            }

            self.state.link_acquired = true;

            self.rf_mode.set(RfMode::Receive);
            self.radio.rx_reset()?;
            self.state.willhop = true;
        }

        let time_us = self.clock.now_us();
        let time_ms = self.clock.now_ms();

        // Sample RSSI while the next packet is in the air, once per
        // schedule slot.
        if self.state.lost_packets < 2
            && self.state.last_rssi_time_us != self.state.last_packet_time_us
            && time_us.wrapping_sub(self.state.last_packet_time_us) > interval - 1500
        {
            self.state.last_rssi_time_us = self.state.last_packet_time_us;
            self.state.rssi_last = self.radio.read_rssi()?;
            self.state.rssi_sum += self.state.rssi_last as u16;
            self.state.rssi_count += 1;

            if self.state.rssi_count > 8 {
                let average = self.state.rssi_sum / self.state.rssi_count as u16;
                self.state.rssi_smooth =
                    ((self.state.rssi_smooth as u16 * 3 + average) / 4) as u8;
                self.state.rssi_sum = 0;
                self.state.rssi_count = 0;
                debug!("RSSI {}", self.state.rssi_smooth);
            }
        }

        if self.state.link_acquired {
            if self.state.lost_packets < self.hop_count
                && time_us.wrapping_sub(self.state.last_packet_time_us) > interval + 1000
            {
                // packet lost; stay on the synthetic schedule and hop with
                // the transmitter
                self.state.link_quality <<= 1;
                if self.state.lost_packets == 0 {
                    self.state.link_loss_time_ms = time_ms;
                }
                self.state.lost_packets += 1;
                self.state.last_packet_time_us =
                    self.state.last_packet_time_us.wrapping_add(interval);
                self.state.willhop = true;
            } else if self.state.lost_packets == self.hop_count
                && time_us.wrapping_sub(self.state.last_packet_time_us)
                    > interval * self.hop_count as u32
            {
                // schedule exhausted; hop slowly to allow resync with TX
                self.state.link_quality = 0;
                self.state.rssi_smooth = 0;
                self.state.last_packet_time_us = time_us;
                self.state.willhop = true;
            }
        } else {
            // waiting for the first packet, hop slowly
            if time_us.wrapping_sub(self.state.last_packet_time_us)
                > interval * self.hop_count as u32
            {
                self.state.last_packet_time_us = time_us;
                self.state.willhop = true;
            }
        }

        if self.state.willhop {
            self.state.rf_channel += 1;
            if self.state.rf_channel as usize == MAXHOPS
                || self.bind_data.hopchannel[self.state.rf_channel as usize] == 0
            {
                self.state.rf_channel = 0;
            }
            self.radio.set_channel(&self.bind_data, self.state.rf_channel)?;
            self.state.willhop = false;
        }

        Ok(())
    }

    // Synchronous transmit with a watchdog-fed ceiling. Expiry is not an
    // error: the radio is rolled back to READY and the next tick recovers.
    fn tx_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.radio.start_tx(packet)?;
        self.rf_mode.set(RfMode::Transmit);
        let tx_start = self.clock.now_us();

        while self.rf_mode.get() == RfMode::Transmit {
            if self.clock.now_us().wrapping_sub(tx_start) >= TX_TIMEOUT_US {
                warn!("TX timeout");
                self.radio.set_power_state(PowerState::Ready)?;
                self.rf_mode.set(RfMode::Available);
                break;
            }
            self.delay.delay_ms(1);
            self.watchdog.kick();
        }
        Ok(())
    }
}

#[cfg(test)]
mod test;
