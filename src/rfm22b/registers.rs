//! RFM22B / Si443x register map and fixed register tables.

/// Register addresses. Read opcode is `addr & 0x7F`, write opcode is
/// `addr | 0x80`.
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum Register {
    DeviceType = 0x00,
    InterruptStatus1 = 0x03,
    InterruptStatus2 = 0x04,
    InterruptEnable1 = 0x05,
    InterruptEnable2 = 0x06,
    OpFuncCtrl1 = 0x07,
    OpFuncCtrl2 = 0x08,
    XtalOscLoadCap = 0x09,
    CpuOutputClk = 0x0a,
    Gpio0Config = 0x0b,
    Gpio1Config = 0x0c,
    Gpio2Config = 0x0d,
    IoPortConfig = 0x0e,
    IfFilterBandwidth = 0x1c,
    AfcLoopGearshiftOverride = 0x1d,
    AfcTimingControl = 0x1e,
    ClkRecoveryOversamplingRatio = 0x20,
    ClkRecoveryOffset2 = 0x21,
    ClkRecoveryOffset1 = 0x22,
    ClkRecoveryOffset0 = 0x23,
    ClkRecoveryTimingLoopGain1 = 0x24,
    ClkRecoveryTimingLoopGain0 = 0x25,
    Rssi = 0x26,
    AfcLimiter = 0x2a,
    AfcCorrection1 = 0x2b,
    AfcCorrection0 = 0x2c,
    DataAccessControl = 0x30,
    HeaderControl1 = 0x32,
    HeaderControl2 = 0x33,
    PreambleLength = 0x34,
    PreambleDetectionCtrl1 = 0x35,
    SyncWord3 = 0x36,
    SyncWord2 = 0x37,
    SyncWord1 = 0x38,
    SyncWord0 = 0x39,
    TransmitHeader3 = 0x3a,
    TransmitHeader2 = 0x3b,
    TransmitHeader1 = 0x3c,
    TransmitHeader0 = 0x3d,
    TransmitPacketLength = 0x3e,
    CheckHeader3 = 0x3f,
    CheckHeader2 = 0x40,
    CheckHeader1 = 0x41,
    CheckHeader0 = 0x42,
    HeaderEnable3 = 0x43,
    HeaderEnable2 = 0x44,
    HeaderEnable1 = 0x45,
    HeaderEnable0 = 0x46,
    TxPower = 0x6d,
    TxDataRate1 = 0x6e,
    TxDataRate0 = 0x6f,
    ModulationModeControl1 = 0x70,
    ModulationModeControl2 = 0x71,
    FrequencyDeviation = 0x72,
    FrequencyOffset1 = 0x73,
    FrequencyOffset2 = 0x74,
    FrequencyBandSelect = 0x75,
    NominalCarrierFrequency1 = 0x76,
    NominalCarrierFrequency0 = 0x77,
    FrequencyHoppingChannelSelect = 0x79,
    FrequencyHoppingStepSize = 0x7a,
    RxFifoControl = 0x7e,
    FifoAccess = 0x7f,
}

impl Register {
    pub fn read_addr(self) -> u8 {
        (self as u8) & 0x7f
    }
    pub fn write_addr(self) -> u8 {
        (self as u8) | 0x80
    }
}

/// Operating-and-function-control-1 power states, xton always set outside
/// of powerdown.
#[derive(Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum PowerState {
    Powerdown = 0x00,
    Ready = 0x01,
    Rx = 0x05,
    Tx = 0x09,
}

impl PowerState {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Interrupt-enable-1 bits used by the engine.
pub const IE1_PACKET_VALID: u8 = 0x02;
pub const IE1_PACKET_SENT: u8 = 0x04;

/// Device-type probe: `DEVICE_TYPE & DT_MASK` must match.
pub const DEVICE_TYPE_MASK: u8 = 0x1f;
pub const DEVICE_TYPE_RFM22B: u8 = 0x08;

// Fixed packet-handler programming: MSB first, CRC on, 4-byte checked
// header, 2-byte sync word, variable length.
pub const DATA_ACCESS_CONTROL: u8 = 0x8c;
pub const HEADER_CONTROL1: u8 = 0x0f;
pub const HEADER_CONTROL2: u8 = 0x42;
pub const PREAMBLE_DETECTION: u8 = 0x2a;
pub const SYNC_WORD: u16 = 0x2dd4;

/// Preamble length register values, in nibbles.
pub const PREAMBLE_NIBBLES: u8 = 0x0a;
pub const PREAMBLE_NIBBLES_DIVERSITY: u8 = 0x14;

/// RX FIFO almost-full threshold armed before every receive.
pub const RX_FIFO_THRESHOLD: u8 = 36;

pub const TX_HEADER: [Register; 4] = [
    Register::TransmitHeader3,
    Register::TransmitHeader2,
    Register::TransmitHeader1,
    Register::TransmitHeader0,
];

pub const CHECK_HEADER: [Register; 4] = [
    Register::CheckHeader3,
    Register::CheckHeader2,
    Register::CheckHeader1,
    Register::CheckHeader0,
];

/// GPIO configuration values for the antenna switch.
pub const GPIO_CFG_TX_STATE: u8 = 0x12;
pub const GPIO_CFG_RX_STATE: u8 = 0x15;
/// GPIO2 sourcing VDD, remaining IO port lines unused.
pub const GPIO2_CFG_VDD: u8 = 0xfd;
pub const IO_PORT_DEFAULT: u8 = 0x00;

/// One row of the modem register table: the values for registers
/// `1C 1D 1E 20 21 22 23 24 25 2A 6E 6F 70 71 72`, in that order.
pub struct ModemConfig {
    pub bps: u32,
    pub regs: [u8; 15],
}

pub const MODEM_REG_ADDRS: [Register; 15] = [
    Register::IfFilterBandwidth,
    Register::AfcLoopGearshiftOverride,
    Register::AfcTimingControl,
    Register::ClkRecoveryOversamplingRatio,
    Register::ClkRecoveryOffset2,
    Register::ClkRecoveryOffset1,
    Register::ClkRecoveryOffset0,
    Register::ClkRecoveryTimingLoopGain1,
    Register::ClkRecoveryTimingLoopGain0,
    Register::AfcLimiter,
    Register::TxDataRate1,
    Register::TxDataRate0,
    Register::ModulationModeControl1,
    Register::ModulationModeControl2,
    Register::FrequencyDeviation,
];

#[rustfmt::skip]
pub const MODEM_PARAMS: [ModemConfig; 5] = [
    ModemConfig { bps: 4800,   regs: [0x1a, 0x40, 0x0a, 0xa1, 0x20, 0x4e, 0xa5, 0x00, 0x1b, 0x1e, 0x27, 0x52, 0x2c, 0x23, 0x30] },
    ModemConfig { bps: 9600,   regs: [0x05, 0x40, 0x0a, 0xa1, 0x20, 0x4e, 0xa5, 0x00, 0x20, 0x24, 0x4e, 0xa5, 0x2c, 0x23, 0x30] },
    ModemConfig { bps: 19200,  regs: [0x06, 0x40, 0x0a, 0xd0, 0x00, 0x9d, 0x49, 0x00, 0x7b, 0x28, 0x9d, 0x49, 0x2c, 0x23, 0x30] },
    ModemConfig { bps: 57600,  regs: [0x05, 0x40, 0x0a, 0x45, 0x01, 0xd7, 0xdc, 0x03, 0xb8, 0x1e, 0x0e, 0xbf, 0x00, 0x23, 0x2e] },
    ModemConfig { bps: 125000, regs: [0x8a, 0x40, 0x0a, 0x60, 0x01, 0x55, 0x55, 0x02, 0xad, 0x1e, 0x20, 0x00, 0x00, 0x23, 0xc8] },
];

/// Modem profile used on the bind channel, identical to the 9600 row.
pub const BIND_MODEM_PARAMS: ModemConfig =
    ModemConfig { bps: 9600, regs: MODEM_PARAMS[1].regs };
