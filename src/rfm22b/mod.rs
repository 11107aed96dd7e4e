//! Register-level driver for the RFM22B: power-on configuration, carrier
//! synthesis, hop-channel selection, FIFO handling and power-state moves.

pub(crate) mod registers;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use registers::*;

use crate::interface::SpiInterface;
use crate::mod_params::{Config, Error, GpioDirection};
use crate::packet::{
    BindData, BINDING_FREQUENCY, BINDING_POWER, BIND_MAGIC, DIVERSITY_ENABLED,
};

/// Driver for one RFM22B on a shared SPI bus.
pub struct Rfm22b<SPI> {
    intf: SpiInterface<SPI>,
}

impl<SPI> Rfm22b<SPI>
where
    SPI: SpiDevice<u8>,
{
    /// Wrap an SPI device routed to the radio's chip select.
    pub fn new(spi: SPI) -> Self {
        Self { intf: SpiInterface::new(spi) }
    }

    /// Check the device-type register for an RFM22B before any other
    /// access.
    pub fn probe(&mut self) -> Result<(), Error> {
        let device_type = self.intf.read_register(Register::DeviceType)? & DEVICE_TYPE_MASK;
        if device_type != DEVICE_TYPE_RFM22B {
            return Err(Error::DeviceAbsent(device_type));
        }
        Ok(())
    }

    /// Full register programming for either the bind channel or the bound
    /// operational profile.
    pub fn init(&mut self, bind_data: &BindData, config: &Config, bind: bool) -> Result<(), Error> {
        debug!("rfm22b init, bind={}", bind);

        // Reading the status pair clears any latched interrupt.
        self.clear_irq_status()?;
        self.intf.write_register(Register::InterruptEnable2, 0x00)?;
        self.intf
            .write_register(Register::OpFuncCtrl1, PowerState::Ready.value())?;
        self.intf.write_register(Register::XtalOscLoadCap, 0x7f)?; // c = 12.5p
        self.intf.write_register(Register::CpuOutputClk, 0x05)?;
        match config.gpio_direction {
            GpioDirection::Gpio0TxGpio1Rx => {
                self.intf.write_register(Register::Gpio0Config, GPIO_CFG_TX_STATE)?;
                self.intf.write_register(Register::Gpio1Config, GPIO_CFG_RX_STATE)?;
            }
            GpioDirection::Gpio0RxGpio1Tx => {
                self.intf.write_register(Register::Gpio0Config, GPIO_CFG_RX_STATE)?;
                self.intf.write_register(Register::Gpio1Config, GPIO_CFG_TX_STATE)?;
            }
        }
        self.intf.write_register(Register::Gpio2Config, GPIO2_CFG_VDD)?;
        self.intf.write_register(Register::IoPortConfig, IO_PORT_DEFAULT)?;

        if bind {
            self.set_modem_regs(&BIND_MODEM_PARAMS)?;
        } else {
            self.set_modem_regs(&MODEM_PARAMS[bind_data.modem_params as usize])?;
        }

        // Packet handler: MSB first, CRC on, all four header bytes
        // checked against the magic, 2-byte sync, variable length.
        self.intf
            .write_register(Register::DataAccessControl, DATA_ACCESS_CONTROL)?;
        self.intf.write_register(Register::HeaderControl1, HEADER_CONTROL1)?;
        self.intf.write_register(Register::HeaderControl2, HEADER_CONTROL2)?;
        let preamble = if bind_data.flags & DIVERSITY_ENABLED != 0 {
            PREAMBLE_NIBBLES_DIVERSITY
        } else {
            PREAMBLE_NIBBLES
        };
        self.intf.write_register(Register::PreambleLength, preamble)?;
        self.intf
            .write_register(Register::PreambleDetectionCtrl1, PREAMBLE_DETECTION)?;
        self.intf
            .write_register(Register::SyncWord3, (SYNC_WORD >> 8) as u8)?;
        self.intf.write_register(Register::SyncWord2, SYNC_WORD as u8)?;
        self.intf.write_register(Register::SyncWord1, 0x00)?;
        self.intf.write_register(Register::SyncWord0, 0x00)?;

        let magic = if bind { BIND_MAGIC } else { bind_data.rf_magic };
        for (i, (tx, check)) in TX_HEADER.iter().zip(CHECK_HEADER.iter()).enumerate() {
            let byte = (magic >> (24 - 8 * i)) as u8;
            self.intf.write_register(*tx, byte)?;
            self.intf.write_register(*check, byte)?;
        }

        self.intf.write_register(Register::HeaderEnable3, 0xff)?;
        self.intf.write_register(Register::HeaderEnable2, 0xff)?;
        self.intf.write_register(Register::HeaderEnable1, 0xff)?;
        self.intf.write_register(Register::HeaderEnable0, 0xff)?;

        let power = if bind { BINDING_POWER } else { bind_data.rf_power };
        self.intf.write_register(Register::TxPower, power)?;

        self.intf
            .write_register(Register::FrequencyHoppingChannelSelect, 0)?;
        self.intf.write_register(
            Register::FrequencyHoppingStepSize,
            bind_data.rf_channel_spacing,
        )?;

        self.intf.write_register(Register::FrequencyOffset1, 0x00)?;
        self.intf.write_register(Register::FrequencyOffset2, 0x00)?;

        self.set_carrier(if bind { BINDING_FREQUENCY } else { bind_data.rf_frequency })
    }

    fn set_modem_regs(&mut self, modem: &ModemConfig) -> Result<(), Error> {
        debug!("modem profile {} bps", modem.bps);
        for (register, value) in MODEM_REG_ADDRS.iter().zip(modem.regs.iter()) {
            self.intf.write_register(*register, *value)?;
        }
        Ok(())
    }

    /// Program the nominal carrier registers for a frequency in Hz.
    pub fn set_carrier(&mut self, f: u32) -> Result<(), Error> {
        debug!("carrier {} Hz", f);
        let (hbsel, fb, fc) = if f < 480_000_000 {
            let fb = f / 10_000_000 - 24;
            let fc = (f - (fb + 24) * 10_000_000) * 4 / 625;
            (0u8, fb as u8, fc as u16)
        } else {
            let fb = f / 20_000_000 - 24;
            let fc = (f - (fb + 24) * 20_000_000) * 2 / 625;
            (1u8, fb as u8, fc as u16)
        };
        // sideband select always on, band select bit for the high band
        self.intf.write_register(
            Register::FrequencyBandSelect,
            0x40 | (if hbsel != 0 { 0x20 } else { 0x00 }) | (fb & 0x1f),
        )?;
        self.intf
            .write_register(Register::NominalCarrierFrequency1, (fc >> 8) as u8)?;
        self.intf
            .write_register(Register::NominalCarrierFrequency0, fc as u8)?;
        Ok(())
    }

    /// Select hop channel `ch` and re-key the header identity: the low
    /// magic byte is XORed with the channel index, so a transmitter out of
    /// hop phase fails the header check.
    pub fn set_channel(&mut self, bind_data: &BindData, ch: u8) -> Result<(), Error> {
        trace!("hop to channel {}", ch);
        let magic_lsb = (bind_data.rf_magic as u8) ^ ch;
        self.intf.write_register(
            Register::FrequencyHoppingChannelSelect,
            bind_data.hopchannel[ch as usize],
        )?;
        self.intf.write_register(Register::TransmitHeader0, magic_lsb)?;
        self.intf.write_register(Register::CheckHeader0, magic_lsb)?;
        Ok(())
    }

    /// Write an operating power state.
    pub(crate) fn set_power_state(&mut self, state: PowerState) -> Result<(), Error> {
        self.intf.write_register(Register::OpFuncCtrl1, state.value())
    }

    fn clear_irq_status(&mut self) -> Result<(), Error> {
        let _ = self.intf.read_register(Register::InterruptStatus1)?;
        let _ = self.intf.read_register(Register::InterruptStatus2)?;
        Ok(())
    }

    fn clear_fifo(&mut self) -> Result<(), Error> {
        self.intf.write_register(Register::OpFuncCtrl2, 0x03)?;
        self.intf.write_register(Register::OpFuncCtrl2, 0x00)
    }

    /// Re-arm the receiver: FIFO threshold and clear, RX power state,
    /// packet-valid interrupt enabled, pending interrupts cleared.
    pub fn rx_reset(&mut self) -> Result<(), Error> {
        self.intf
            .write_register(Register::OpFuncCtrl1, PowerState::Ready.value())?;
        self.intf
            .write_register(Register::RxFifoControl, RX_FIFO_THRESHOLD)?;
        self.clear_fifo()?;
        self.intf
            .write_register(Register::OpFuncCtrl1, PowerState::Rx.value())?;
        self.intf
            .write_register(Register::InterruptEnable1, IE1_PACKET_VALID)?;
        self.clear_irq_status()
    }

    /// Settle into READY, then re-arm the receiver.
    pub fn to_rx(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        self.clear_irq_status()?;
        self.intf
            .write_register(Register::OpFuncCtrl1, PowerState::Ready.value())?;
        delay.delay_ms(10);
        self.rx_reset()
    }

    /// Load a packet into the FIFO and start transmitting; the
    /// packet-sent interrupt is armed and any stale status cleared first.
    pub fn start_tx(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.intf
            .write_register(Register::TransmitPacketLength, packet.len() as u8)?;
        self.intf.write_burst(Register::FifoAccess, packet)?;
        self.intf
            .write_register(Register::InterruptEnable1, IE1_PACKET_SENT)?;
        self.clear_irq_status()?;
        self.intf
            .write_register(Register::OpFuncCtrl1, PowerState::Tx.value())
    }

    /// Drain `buf.len()` bytes of a received packet from the FIFO.
    pub fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.intf.read_burst(Register::FifoAccess, buf)
    }

    /// Raw RSSI register reading.
    pub fn read_rssi(&mut self) -> Result<u8, Error> {
        self.intf.read_register(Register::Rssi)
    }

    /// The 10-bit AFC correction applied to the locked carrier.
    pub fn read_afc(&mut self) -> Result<u16, Error> {
        let high = self.intf.read_register(Register::AfcCorrection1)? as u16;
        let low = self.intf.read_register(Register::AfcCorrection0)? as u16;
        Ok((high << 2) | (low >> 6))
    }

    /// The radio resets its GPIO configuration when it locks up and
    /// reboots; a zero readback means the whole profile must be
    /// reprogrammed.
    pub fn is_wedged(&mut self) -> Result<bool, Error> {
        Ok(self.intf.read_register(Register::Gpio1Config)? == 0)
    }
}
