use embedded_hal::spi::{Operation, SpiDevice};

use crate::mod_params::Error;
use crate::rfm22b::registers::Register;

/// The register-level read/write interface between the MCU and the RFM22B.
///
/// Every method is a single `SpiDevice` transaction, so chip-select
/// bracketing and shared-bus arbitration are owned by the HAL.
pub(crate) struct SpiInterface<SPI> {
    pub(crate) spi: SPI,
}

impl<SPI> SpiInterface<SPI>
where
    SPI: SpiDevice<u8>,
{
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn read_register(&mut self, register: Register) -> Result<u8, Error> {
        let mut read_buffer = [0x00u8];
        self.spi
            .transaction(&mut [
                Operation::Write(&[register.read_addr()]),
                Operation::Read(&mut read_buffer),
            ])
            .map_err(|_| Error::Spi)?;
        trace!("read {:02x} -> {:02x}", register.read_addr(), read_buffer[0]);
        Ok(read_buffer[0])
    }

    pub fn write_register(&mut self, register: Register, value: u8) -> Result<(), Error> {
        let write_buffer = [register.write_addr(), value];
        self.spi.write(&write_buffer).map_err(|_| Error::Spi)?;
        trace!("write {:02x} <- {:02x}", register.write_addr(), value);
        Ok(())
    }

    // Burst read: one opcode, n data bytes. Only used on the FIFO access
    // register, which pops a byte per clocked frame.
    pub fn read_burst(&mut self, register: Register, buf: &mut [u8]) -> Result<(), Error> {
        self.spi
            .transaction(&mut [Operation::Write(&[register.read_addr()]), Operation::Read(buf)])
            .map_err(|_| Error::Spi)?;
        trace!("burst read {:02x}, {} bytes", register.read_addr(), buf.len());
        Ok(())
    }

    pub fn write_burst(&mut self, register: Register, data: &[u8]) -> Result<(), Error> {
        self.spi
            .transaction(&mut [Operation::Write(&[register.write_addr()]), Operation::Write(data)])
            .map_err(|_| Error::Spi)?;
        trace!("burst write {:02x}, {} bytes", register.write_addr(), data.len());
        Ok(())
    }
}
