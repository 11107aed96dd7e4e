//! Shared fixtures: a simulated RFM22B on the SPI bus, a manually driven
//! clock, and recording implementations of the platform traits.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{self, ErrorKind, Operation, SpiDevice};

use crate::link::RfModeFlag;
use crate::mod_traits::{BindStore, Clock, PpmSink};
use crate::packet::{BindData, PPM_CHANNELS};

#[derive(Debug)]
pub enum SimError {}

impl spi::Error for SimError {
    fn kind(&self) -> ErrorKind {
        match *self {}
    }
}

/// Register map, FIFOs and an access log of one simulated chip.
pub struct ChipState {
    pub regs: [u8; 0x80],
    pub rx_fifo: VecDeque<u8>,
    pub tx_fifo: Vec<u8>,
    /// Chronological (address, value) log of register writes; FIFO burst
    /// bytes land in `tx_fifo` instead.
    pub writes: Vec<(u8, u8)>,
    /// Chronological log of read addresses.
    pub reads: Vec<u8>,
}

impl ChipState {
    fn new() -> Self {
        let mut regs = [0u8; 0x80];
        regs[0x00] = 0x08; // device type
        regs[0x0c] = 0x15; // GPIO1 config, nonzero = not wedged
        ChipState { regs, rx_fifo: VecDeque::new(), tx_fifo: Vec::new(), writes: Vec::new(), reads: Vec::new() }
    }

    fn write_reg(&mut self, reg: u8, value: u8) {
        if reg == 0x7f {
            self.tx_fifo.push(value);
        } else {
            self.regs[reg as usize] = value;
            self.writes.push((reg, value));
        }
    }

    fn read_reg(&mut self, reg: u8) -> u8 {
        self.reads.push(reg);
        if reg == 0x7f {
            self.rx_fifo.pop_front().unwrap_or(0)
        } else {
            self.regs[reg as usize]
        }
    }
}

/// Cloneable `SpiDevice` handle onto a [`ChipState`].
#[derive(Clone)]
pub struct SimChip(pub Rc<RefCell<ChipState>>);

impl SimChip {
    pub fn new() -> Self {
        SimChip(Rc::new(RefCell::new(ChipState::new())))
    }

    /// Queue packet bytes for the next FIFO drain.
    pub fn load_rx(&self, bytes: &[u8]) {
        self.0.borrow_mut().rx_fifo.extend(bytes.iter().copied());
    }

    /// Every value written to a register, in order.
    pub fn writes_to(&self, reg: u8) -> Vec<u8> {
        self.0.borrow().writes.iter().filter(|(a, _)| *a == reg).map(|(_, v)| *v).collect()
    }

    pub fn last_write_to(&self, reg: u8) -> Option<u8> {
        self.writes_to(reg).last().copied()
    }

    pub fn set_reg(&self, reg: u8, value: u8) {
        self.0.borrow_mut().regs[reg as usize] = value;
    }
}

impl spi::ErrorType for SimChip {
    type Error = SimError;
}

impl SpiDevice<u8> for SimChip {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        let mut st = self.0.borrow_mut();
        // the first written byte of a transaction is the opcode
        let mut target: Option<(u8, bool)> = None;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(buf) => {
                    let mut data = *buf;
                    if target.is_none() {
                        let opcode = data[0];
                        target = Some((opcode & 0x7f, opcode & 0x80 != 0));
                        data = &data[1..];
                    }
                    let (reg, is_write) = target.unwrap();
                    assert!(is_write || data.is_empty(), "data bytes on a read opcode");
                    for &byte in data {
                        st.write_reg(reg, byte);
                    }
                }
                Operation::Read(buf) => {
                    let (reg, is_write) = target.expect("read before an opcode");
                    assert!(!is_write, "read on a write opcode");
                    for byte in buf.iter_mut() {
                        *byte = st.read_reg(reg);
                    }
                }
                _ => unimplemented!("unused SPI operation"),
            }
        }
        Ok(())
    }
}

/// Manually advanced microsecond clock.
#[derive(Clone)]
pub struct SimClock(Rc<Cell<u32>>);

impl SimClock {
    pub fn new() -> Self {
        SimClock(Rc::new(Cell::new(0)))
    }

    pub fn advance_us(&self, us: u32) {
        self.0.set(self.0.get().wrapping_add(us));
    }

    pub fn now(&self) -> u32 {
        self.0.get()
    }
}

impl Clock for SimClock {
    fn now_us(&mut self) -> u32 {
        self.0.get()
    }
    fn now_ms(&mut self) -> u32 {
        self.0.get() / 1000
    }
}

/// Sleep implementation that advances the simulated clock and, when
/// enabled, fires the radio interrupt after each sleep. Lets the blocking
/// bind and transmit waits make progress inside a test.
pub struct SimDelay {
    pub clock: SimClock,
    pub flag: &'static RfModeFlag,
    pub fire_irq: Rc<Cell<bool>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_us(ns / 1000);
        if self.fire_irq.get() {
            self.flag.on_irq();
        }
    }
}

/// In-memory bind-parameter store.
#[derive(Clone)]
pub struct MemStore(pub Rc<RefCell<Option<BindData>>>);

impl MemStore {
    pub fn new(stored: Option<BindData>) -> Self {
        MemStore(Rc::new(RefCell::new(stored)))
    }
}

impl BindStore for MemStore {
    type Error = core::convert::Infallible;

    fn load(&mut self) -> Option<BindData> {
        *self.0.borrow()
    }

    fn save(&mut self, bind: &BindData) -> Result<(), Self::Error> {
        *self.0.borrow_mut() = Some(*bind);
        Ok(())
    }
}

/// Collects every decoded servo frame.
#[derive(Clone)]
pub struct FrameSink(pub Rc<RefCell<Vec<Vec<u16>>>>);

impl FrameSink {
    pub fn new() -> Self {
        FrameSink(Rc::new(RefCell::new(Vec::new())))
    }
}

impl PpmSink for FrameSink {
    fn ppm_frame(&mut self, channels: &heapless::Vec<u16, PPM_CHANNELS>) {
        self.0.borrow_mut().push(channels.to_vec());
    }
}

/// A leaked flag standing in for the `static` a board would declare.
pub fn leak_flag() -> &'static RfModeFlag {
    Box::leak(Box::new(RfModeFlag::new()))
}
