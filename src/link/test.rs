use std::cell::Cell;
use std::rc::Rc;

use super::{OpenLrs, RfModeFlag};
use crate::mod_params::{Config, LinkPhase, RfMode};
use crate::packet::{BindData, BINDING_VERSION, MAXHOPS};
use crate::test_util::{leak_flag, FrameSink, MemStore, SimChip, SimClock, SimDelay};

struct Rig {
    chip: SimChip,
    clock: SimClock,
    flag: &'static RfModeFlag,
    store: MemStore,
    frames: FrameSink,
    fire_irq: Rc<Cell<bool>>,
    lrs: OpenLrs<SimChip, SimDelay, SimClock, (), MemStore, FrameSink>,
}

fn rig(stored: Option<BindData>) -> Rig {
    let chip = SimChip::new();
    let clock = SimClock::new();
    let flag = leak_flag();
    let store = MemStore::new(stored);
    let frames = FrameSink::new();
    let fire_irq = Rc::new(Cell::new(false));
    let delay = SimDelay { clock: clock.clone(), flag, fire_irq: fire_irq.clone() };
    let mut lrs =
        OpenLrs::new(chip.clone(), delay, clock.clone(), (), store.clone(), Config::default(), flag)
            .unwrap();
    lrs.register_ppm_sink(frames.clone());
    Rig { chip, clock, flag, store, frames, fire_irq, lrs }
}

// A servo frame for the stock binding (group 2: header + two 5-byte
// channel groups, eight channels).
fn stock_servo_packet() -> [u8; 11] {
    [0x00, 10, 20, 30, 40, 0x00, 50, 60, 70, 80, 0x00]
}

fn deliver(r: &Rig, packet: &[u8]) {
    r.chip.load_rx(packet);
    r.flag.on_irq();
}

fn acquire(r: &mut Rig) {
    r.lrs.setup(false).unwrap();
    r.clock.advance_us(5_000);
    deliver(r, &stock_servo_packet());
    r.lrs.tick().unwrap();
}

const INTERVAL: u32 = 14_000; // stock binding: 11 bytes at 19200 bps

#[test]
fn acquisition_locks_onto_the_first_packet() {
    let bd = BindData::stock();
    let mut r = rig(Some(bd));

    r.lrs.setup(false).unwrap();
    assert_eq!(r.lrs.link_stats().phase, LinkPhase::Acquiring);
    assert!(!r.lrs.link_stats().link_acquired);
    assert_eq!(r.chip.last_write_to(0x79), Some(bd.hopchannel[0]));

    r.clock.advance_us(5_000);
    deliver(&r, &stock_servo_packet());
    r.lrs.tick().unwrap();

    let stats = r.lrs.link_stats();
    assert!(stats.link_acquired);
    assert_eq!(stats.lost_packets, 0);
    assert_eq!(stats.link_quality & 1, 1);
    assert_eq!(stats.phase, LinkPhase::Synchronized);
    assert_eq!(r.frames.0.borrow().as_slice(), &[vec![10u16, 20, 30, 40, 50, 60, 70, 80]]);
    // reception hops to the next channel in the schedule
    assert_eq!(r.chip.last_write_to(0x79), Some(bd.hopchannel[1]));

    // next packet one interval later on the next channel
    r.clock.advance_us(INTERVAL);
    deliver(&r, &stock_servo_packet());
    r.lrs.tick().unwrap();
    let stats = r.lrs.link_stats();
    assert_eq!(stats.link_quality & 0b11, 0b11);
    assert_eq!(r.chip.last_write_to(0x79), Some(bd.hopchannel[2]));
}

#[test]
fn a_single_missed_packet_hops_on_the_synthetic_schedule() {
    let bd = BindData::stock();
    let mut r = rig(Some(bd));
    acquire(&mut r);

    let hops_before = r.chip.writes_to(0x79).len();
    r.clock.advance_us(INTERVAL + 1001);
    r.lrs.tick().unwrap();

    let stats = r.lrs.link_stats();
    assert!(stats.link_acquired);
    assert_eq!(stats.lost_packets, 1);
    assert_eq!(stats.link_quality & 1, 0);
    assert_eq!(stats.phase, LinkPhase::Lost);
    assert_eq!(stats.link_loss_time_ms, r.clock.now() / 1000);
    // exactly one hop fired for the miss
    assert_eq!(r.chip.writes_to(0x79).len(), hops_before + 1);

    // a further tick inside the same slot does nothing
    r.clock.advance_us(1_000);
    r.lrs.tick().unwrap();
    assert_eq!(r.lrs.link_stats().lost_packets, 1);
    assert_eq!(r.chip.writes_to(0x79).len(), hops_before + 1);

    // the transmitter comes back
    deliver(&r, &stock_servo_packet());
    r.lrs.tick().unwrap();
    let stats = r.lrs.link_stats();
    assert_eq!(stats.lost_packets, 0);
    assert_eq!(stats.phase, LinkPhase::Synchronized);
}

#[test]
fn exhausting_the_hop_schedule_enters_search_mode() {
    let mut bd = BindData::stock();
    bd.hopchannel = [0; MAXHOPS];
    bd.hopchannel[0] = 22;
    bd.hopchannel[1] = 10;
    let mut r = rig(Some(bd));
    acquire(&mut r);

    // two consecutive misses exhaust the two-channel schedule
    for _ in 0..2 {
        r.clock.advance_us(INTERVAL + 1001);
        r.lrs.tick().unwrap();
    }
    assert_eq!(r.lrs.link_stats().lost_packets, 2);

    // one full schedule later the engine drops into search mode
    r.clock.advance_us(3 * INTERVAL);
    r.lrs.tick().unwrap();
    let stats = r.lrs.link_stats();
    assert_eq!(stats.phase, LinkPhase::Lost);
    assert_eq!(stats.link_quality, 0);
    assert_eq!(stats.rssi_smooth, 0);

    // and keeps slow-hopping once per full schedule awaiting resync
    let hops = r.chip.writes_to(0x79).len();
    r.clock.advance_us(2 * INTERVAL + 1);
    r.lrs.tick().unwrap();
    assert_eq!(r.chip.writes_to(0x79).len(), hops + 1);
    r.lrs.tick().unwrap();
    assert_eq!(r.chip.writes_to(0x79).len(), hops + 1);
}

#[test]
fn bind_round_trip_persists_and_acknowledges() {
    let mut r = rig(None);
    assert_ne!(r.lrs.bind_data().version, BINDING_VERSION);

    let offered = BindData::stock();
    let mut frame = vec![b'b'];
    frame.extend_from_slice(&offered.to_wire());
    r.chip.load_rx(&frame);
    r.fire_irq.set(true);

    r.lrs.setup(true).unwrap();

    assert_eq!(r.lrs.bind_data(), &offered);
    assert_eq!(*r.store.0.borrow(), Some(offered));
    assert_eq!(r.chip.0.borrow().tx_fifo, b"B");
    assert_eq!(r.lrs.link_stats().phase, LinkPhase::Acquiring);
}

#[test]
fn bind_rejects_a_version_mismatch() {
    let mut r = rig(None);

    let mut offered = BindData::stock();
    offered.version = BINDING_VERSION + 1;
    let mut frame = vec![b'b'];
    frame.extend_from_slice(&offered.to_wire());
    r.chip.load_rx(&frame);
    r.fire_irq.set(true);

    assert_eq!(r.lrs.bind_receive(50), Ok(false));
    assert_eq!(*r.store.0.borrow(), None);
    assert!(r.chip.0.borrow().tx_fifo.is_empty());
    // the receiver went straight back to listening
    assert!(r.chip.writes_to(0x05).iter().filter(|&&v| v == 0x02).count() >= 2);
}

#[test]
fn non_servo_subtypes_count_for_the_link_but_are_not_forwarded() {
    let bd = BindData::stock();
    let mut r = rig(Some(bd));
    r.lrs.setup(false).unwrap();

    let mut packet = stock_servo_packet();
    packet[0] = 0x38; // serial passthrough subtype
    deliver(&r, &packet);
    r.lrs.tick().unwrap();

    let stats = r.lrs.link_stats();
    assert!(stats.link_acquired);
    assert_eq!(stats.link_quality & 1, 1);
    assert!(r.frames.0.borrow().is_empty());
}

#[test]
fn a_wedged_radio_is_reinitialized_in_place() {
    let bd = BindData::stock();
    let mut r = rig(Some(bd));
    acquire(&mut r);

    let inits = r.chip.writes_to(0x09).len();
    r.chip.set_reg(0x0c, 0x00);
    r.lrs.tick().unwrap();

    // the crystal-load write only happens during a full init
    assert_eq!(r.chip.writes_to(0x09).len(), inits + 1);
    assert_ne!(r.chip.0.borrow().regs[0x0c], 0);
    // link history survives the reinit
    assert!(r.lrs.link_stats().link_acquired);
}

#[test]
fn irq_flag_performs_only_the_two_legal_transitions() {
    let flag = RfModeFlag::new();
    flag.on_irq();
    assert_eq!(flag.get(), RfMode::Available);

    flag.set(RfMode::Receive);
    flag.on_irq();
    assert_eq!(flag.get(), RfMode::Received);
    flag.on_irq();
    assert_eq!(flag.get(), RfMode::Received);

    flag.set(RfMode::Transmit);
    flag.on_irq();
    assert_eq!(flag.get(), RfMode::Transmitted);
}
