//! IOC: interrupt aggregation, the four down-counters, and the KART serial link to the keyboard
//! controller.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU16, AtomicU8, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use log::warn;

use crate::address_map::{ConnectionContext, MmioRegion};
use crate::system_context::{SystemContext, TaskHandle};

/// Forces its payload onto its own cache line, mirroring the source's alignment to
/// `hardware_destructive_interference_size` for independently-contended IOC state. Transparent via
/// `Deref`, so call sites read exactly as they would against the bare field.
#[repr(align(64))]
struct CacheAligned<T>(T);

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

const KART_QUEUE_DEPTH: usize = 16;
const KART_SCHEDULE_FACTOR: u64 = 176;
const COUNT_FREQUENCY_HZ: u64 = 2_000_000;

/// Bits 2-6 of `irq_status` are the only ones a guest write to the clear register can affect;
/// the rest clear only when their driving condition (an IL pin, a counter) clears.
const IRQ_CLEARABLE_MASK: u16 = 0b0111_1100;

const IRQ_TIMER0: u8 = 5;
const IRQ_TIMER1: u8 = 6;
const IRQ_KART_RX: u8 = 15;
const IRQ_KART_TX: u8 = 14;
const IRQ_POR: u8 = 4;

struct Counter {
    task_handle: TaskHandle,
    input_latch: u16,
    output_latch: u16,
    start_time: u64,
    schedule_factor: u64,
}

impl Counter {
    fn new(task_handle: TaskHandle, schedule_factor: u64) -> Self {
        Counter { task_handle, input_latch: 0, output_latch: 0, start_time: 0, schedule_factor }
    }

    fn period_ticks(&self, ticks_per_count: u64) -> u64 {
        ticks_per_count * self.input_latch as u64 * self.schedule_factor
    }

    fn live_count(&self, ticks_per_count: u64, master_clock: u64) -> u16 {
        if self.input_latch == 0 {
            return self.output_latch;
        }
        let period = self.period_ticks(ticks_per_count);
        if period == 0 {
            return self.output_latch;
        }
        let elapsed = master_clock.saturating_sub(self.start_time) % period;
        let per_count = (ticks_per_count * self.schedule_factor).max(1);
        let counted = (elapsed / per_count) as u16;
        self.input_latch.saturating_sub(counted)
    }

    fn write_latch_low(&mut self, byte: u8) {
        self.input_latch = (self.input_latch & 0xFF00) | byte as u16;
    }

    fn write_latch_high(&mut self, byte: u8) {
        self.input_latch = (self.input_latch & 0x00FF) | ((byte as u16) << 8);
    }

    fn latch(&mut self, ctx: &SystemContext) {
        let ticks_per_count = (ctx.master_frequency() / COUNT_FREQUENCY_HZ).max(1);
        self.output_latch = self.live_count(ticks_per_count, ctx.master_clock());
    }

    /// Restart the counter from its input latch. An input latch of zero leaves the counter
    /// inactive and cancels any pending callback.
    fn go(&mut self, ctx: &mut SystemContext) {
        self.start_time = ctx.master_clock();
        if self.input_latch == 0 {
            ctx.cancel(self.task_handle);
            return;
        }
        let ticks_per_count = (ctx.master_frequency() / COUNT_FREQUENCY_HZ).max(1);
        let period = self.period_ticks(ticks_per_count).max(1);
        ctx.schedule(self.task_handle, self.start_time + period);
    }
}

/// The source aliases `_counters[3]` onto `_kartCounter` via a reinterpret cast to dodge a
/// virtual call. Here the four slots are a proper sum type instead, so the KART counter's extra
/// behaviour (servicing the byte queues rather than just raising an IRQ) is an ordinary match arm.
enum CounterSlot {
    General { counter: Counter, irq: Option<u8> },
    Kart { counter: Counter },
}

impl CounterSlot {
    fn counter_mut(&mut self) -> &mut Counter {
        match self {
            CounterSlot::General { counter, .. } => counter,
            CounterSlot::Kart { counter } => counter,
        }
    }
}

/// KART handshake state, mirroring `AcornKeyboardController`'s protocol state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KartState {
    PreReset,
    ReceivedHrst,
    ReceivedRak1,
    Initialised,
}

const HRST: u8 = 0xFF;
const RAK1: u8 = 0xFE;
const RAK2: u8 = 0xFD;

/// The keyboard microcontroller on the other end of the KART link. IOC is resolved by name rather
/// than held directly, since in the source the controller looks its IOC up through the device
/// directory rather than being constructed with a reference to it.
pub struct AcornKeyboardController {
    state: Cell<KartState>,
}

impl AcornKeyboardController {
    pub fn new() -> Rc<Self> {
        Rc::new(AcornKeyboardController { state: Cell::new(KartState::PreReset) })
    }

    /// Process one byte received from IOC over the KART link, returning the reply byte (if any)
    /// to enqueue back onto the RX queue.
    ///
    /// The source's `ReceivedRAK1` branch has a copy-paste bug: on receiving `RAK2` it loops back
    /// to `ReceivedRAK1` and resends `RAK2` instead of completing the handshake. Fixed here: `RAK2`
    /// in that state advances to `Initialised` and sends nothing further.
    fn receive_kart_byte(&self, byte: u8) -> Option<u8> {
        match (self.state.get(), byte) {
            (KartState::PreReset, HRST) => {
                self.state.set(KartState::ReceivedHrst);
                Some(RAK1)
            }
            (KartState::ReceivedHrst, RAK1) => {
                self.state.set(KartState::ReceivedRak1);
                Some(RAK2)
            }
            (KartState::ReceivedRak1, RAK2) => {
                self.state.set(KartState::Initialised);
                None
            }
            (KartState::Initialised, _) => {
                // Key/mouse/LED protocol bytes are out of scope for the core; acknowledge nothing.
                None
            }
            _ => {
                self.state.set(KartState::PreReset);
                Some(HRST)
            }
        }
    }
}

/// IOC's 128-byte MMIO window and the interrupt/timer/KART state it presents.
pub struct Ioc {
    irq_status: CacheAligned<AtomicU16>,
    irq_mask: CacheAligned<AtomicU16>,
    firq_status: CacheAligned<AtomicU8>,
    firq_mask: CacheAligned<AtomicU8>,
    ctrl_input: CacheAligned<AtomicU8>,
    ctrl_output: CacheAligned<AtomicU8>,

    counters: [CounterSlot; 4],

    rx_data: Cell<u8>,
    kart_rx_tx: CacheAligned<SyncSender<u8>>,
    kart_rx_rx: CacheAligned<Receiver<u8>>,
    kart_tx_tx: CacheAligned<SyncSender<u8>>,
    kart_tx_rx: CacheAligned<Receiver<u8>>,

    keyboard: RefCell<Option<Rc<AcornKeyboardController>>>,
}

impl Ioc {
    pub fn new(ctx: &mut SystemContext) -> Rc<RefCell<Ioc>> {
        let (kart_rx_tx, kart_rx_rx) = sync_channel(KART_QUEUE_DEPTH);
        let (kart_tx_tx, kart_tx_rx) = sync_channel(KART_QUEUE_DEPTH);

        let ioc = Rc::new(RefCell::new(Ioc {
            irq_status: CacheAligned(AtomicU16::new(1 << IRQ_POR)),
            irq_mask: CacheAligned(AtomicU16::new(0)),
            firq_status: CacheAligned(AtomicU8::new(0)),
            firq_mask: CacheAligned(AtomicU8::new(0)),
            ctrl_input: CacheAligned(AtomicU8::new(0)),
            ctrl_output: CacheAligned(AtomicU8::new(0xFF)),
            counters: [
                CounterSlot::General { counter: Counter::new(TaskHandle::placeholder(), 1), irq: Some(IRQ_TIMER0) },
                CounterSlot::General { counter: Counter::new(TaskHandle::placeholder(), 1), irq: Some(IRQ_TIMER1) },
                CounterSlot::General { counter: Counter::new(TaskHandle::placeholder(), 1), irq: None },
                CounterSlot::Kart { counter: Counter::new(TaskHandle::placeholder(), KART_SCHEDULE_FACTOR) },
            ],
            rx_data: Cell::new(0),
            kart_rx_tx: CacheAligned(kart_rx_tx),
            kart_rx_rx: CacheAligned(kart_rx_rx),
            kart_tx_tx: CacheAligned(kart_tx_tx),
            kart_tx_rx: CacheAligned(kart_tx_rx),
            keyboard: RefCell::new(None),
        }));

        for idx in 0..4 {
            let owner = Rc::clone(&ioc);
            let handle = ctx.register_task(move |ctx| {
                owner.borrow_mut().on_counter_fire(ctx, idx);
            });
            ioc.borrow_mut().counters[idx].counter_mut().task_handle = handle;
        }

        ioc
    }

    /// Resolve the keyboard controller by name. Called once during startup wiring.
    pub fn connect(&self, connection: &ConnectionContext) {
        if let Some(keyboard) = connection.try_find_device::<AcornKeyboardController>("Keyboard Controller") {
            *self.keyboard.borrow_mut() = Some(keyboard);
        }
    }

    fn on_counter_fire(&mut self, ctx: &mut SystemContext, idx: usize) {
        let is_kart = matches!(self.counters[idx], CounterSlot::Kart { .. });
        if is_kart {
            self.service_kart_byte();
        } else if let CounterSlot::General { irq: Some(bit), .. } = &self.counters[idx] {
            let bit = *bit;
            self.raise_irq(bit);
        }
        self.counters[idx].counter_mut().go(ctx);
    }

    /// One KART tick: deliver a pending TX byte to the keyboard controller, and move any reply
    /// (or any byte already queued from the host side) into the guest-visible RX register.
    fn service_kart_byte(&mut self) {
        if let Ok(byte) = self.kart_tx_rx.try_recv() {
            self.raise_irq(IRQ_KART_TX);
            let keyboard = self.keyboard.borrow().clone();
            if let Some(keyboard) = keyboard {
                if let Some(reply) = keyboard.receive_kart_byte(byte) {
                    if self.kart_rx_tx.try_send(reply).is_err() {
                        warn!("KART RX queue full, dropping keyboard-controller reply byte");
                    }
                }
            }
        }
        if let Ok(byte) = self.kart_rx_rx.try_recv() {
            self.rx_data.set(byte);
            self.raise_irq(IRQ_KART_RX);
        }
    }

    // -- IRQ/FIRQ aggregation --------------------------------------------------------------

    pub fn raise_irq(&self, bit: u8) {
        self.irq_status.fetch_or(1u16 << bit, Ordering::Relaxed);
    }

    fn clear_latched_irqs(&self, mask: u8) {
        let clearable = (mask as u16) & IRQ_CLEARABLE_MASK;
        self.irq_status.fetch_and(!clearable, Ordering::Relaxed);
    }

    pub fn set_il(&self, il: u8, state: bool) {
        let irq_bit = match il {
            0 => 8,
            1..=5 => 8 + il,
            6 => 0,
            7 => 1,
            _ => return,
        };
        self.set_irq_bit(irq_bit, state);
        if il == 0 {
            self.set_firq_bit(6, state);
        }
    }

    fn set_irq_bit(&self, bit: u8, state: bool) {
        if state {
            self.irq_status.fetch_or(1u16 << bit, Ordering::Relaxed);
        } else {
            self.irq_status.fetch_and(!(1u16 << bit), Ordering::Relaxed);
        }
    }

    fn set_firq_bit(&self, bit: u8, state: bool) {
        if state {
            self.firq_status.fetch_or(1u8 << bit, Ordering::Relaxed);
        } else {
            self.firq_status.fetch_and(!(1u8 << bit), Ordering::Relaxed);
        }
    }

    /// `(irq_status | 0x80) & !irq_mask != 0`: the CPU-visible IRQ line.
    pub fn irq_pending(&self) -> bool {
        let status = self.irq_status.load(Ordering::Relaxed) | 0x0080;
        let mask = self.irq_mask.load(Ordering::Relaxed);
        (status & !mask) != 0
    }

    fn firq_status_live(&self) -> u8 {
        let raw = self.firq_status.load(Ordering::Relaxed);
        let ctrl_input = self.ctrl_input.load(Ordering::Relaxed);
        let pin_bits = (!ctrl_input) & 0b0011_1000;
        raw | pin_bits
    }

    /// `firq_status & !firq_mask != 0`, with bits 3-5 additionally driven live by control pins.
    pub fn firq_pending(&self) -> bool {
        let status = self.firq_status_live();
        let mask = self.firq_mask.load(Ordering::Relaxed);
        (status & !mask) != 0
    }

    pub fn set_control_pin_input(&self, pin: u8, state: bool) {
        let bit = 1u8 << pin;
        if state {
            self.ctrl_input.fetch_or(bit, Ordering::Relaxed);
        } else {
            self.ctrl_input.fetch_and(!bit, Ordering::Relaxed);
        }
    }

    fn read_ctrl(&self) -> u8 {
        let output = self.ctrl_output.load(Ordering::Relaxed);
        let input = self.ctrl_input.load(Ordering::Relaxed);
        let pins = output & input;
        let status = self.irq_status.load(Ordering::Relaxed);
        let if_bit = ((status >> 2) & 1) as u8;
        let ir_bit = ((status >> 3) & 1) as u8;
        (pins & 0x3F) | (if_bit << 6) | (ir_bit << 7)
    }

    fn write_ctrl(&self, value: u8) {
        self.ctrl_output.store(value & 0x3F, Ordering::Relaxed);
    }

    // -- KART host-facing handle -------------------------------------------------------------

    /// A clone of the RX-queue producer, given to the host-input thread so it can feed bytes in
    /// with a non-blocking `try_send`, dropping the byte if the queue is already full.
    pub fn host_kart_sender(&self) -> SyncSender<u8> {
        self.kart_rx_tx.clone()
    }

    fn write_kart_tx(&self, byte: u8) {
        self.irq_status.fetch_and(!(1u16 << IRQ_KART_TX), Ordering::Relaxed);
        if self.kart_tx_tx.try_send(byte).is_err() {
            warn!("KART TX queue full, dropping guest byte");
        }
    }

    fn read_kart_rx(&self) -> u8 {
        self.irq_status.fetch_and(!(1u16 << IRQ_KART_RX), Ordering::Relaxed);
        self.rx_data.get()
    }

    // -- Counter register block --------------------------------------------------------------

    fn counter_register(&mut self, offset: u32, ctx: &mut SystemContext, write: Option<u8>) -> u8 {
        let block = ((offset - 0x40) / 0x10) as usize;
        let reg = (offset - 0x40) % 0x10 / 4;
        if block >= self.counters.len() {
            return 0;
        }
        let counter = self.counters[block].counter_mut();
        match (reg, write) {
            (0, Some(byte)) => {
                counter.write_latch_low(byte);
                0
            }
            (1, Some(byte)) => {
                counter.write_latch_high(byte);
                0
            }
            (2, Some(_)) => {
                counter.go(ctx);
                0
            }
            (3, Some(_)) => {
                counter.latch(ctx);
                0
            }
            (0, None) => (counter.output_latch & 0xFF) as u8,
            (1, None) => ((counter.output_latch >> 8) & 0xFF) as u8,
            _ => 0,
        }
    }
}

impl MmioRegion for Ioc {
    fn name(&self) -> &'static str {
        "IOC"
    }

    fn size(&self) -> u32 {
        128
    }

    fn read(&mut self, offset: u32, ctx: &mut SystemContext) -> u32 {
        (match offset {
            0x00 => self.read_ctrl(),
            0x04 => self.read_kart_rx(),
            0x10 => (self.irq_status.load(Ordering::Relaxed) as u8) | 0x80,
            0x14 => {
                let status = self.irq_status.load(Ordering::Relaxed);
                let mask = self.irq_mask.load(Ordering::Relaxed);
                (status & !mask) as u8
            }
            0x18 => (self.irq_mask.load(Ordering::Relaxed) & 0xFF) as u8,
            0x20 => ((self.irq_status.load(Ordering::Relaxed) >> 8) & 0xFF) as u8,
            0x24 => {
                let status = self.irq_status.load(Ordering::Relaxed);
                let mask = self.irq_mask.load(Ordering::Relaxed);
                (((status & !mask) >> 8) & 0xFF) as u8
            }
            0x28 => ((self.irq_mask.load(Ordering::Relaxed) >> 8) & 0xFF) as u8,
            0x30 => self.firq_status_live(),
            0x34 => self.firq_status_live() & !self.firq_mask.load(Ordering::Relaxed),
            0x38 => self.firq_mask.load(Ordering::Relaxed),
            0x40..=0x7F => self.counter_register(offset, ctx, None),
            _ => 0,
        }) as u32
    }

    fn write(&mut self, offset: u32, value: u32, ctx: &mut SystemContext) {
        let byte = (value & 0xFF) as u8;
        match offset {
            0x00 => self.write_ctrl(byte),
            0x04 => self.write_kart_tx(byte),
            0x14 => self.clear_latched_irqs(byte),
            0x18 => self
                .irq_mask
                .store((self.irq_mask.load(Ordering::Relaxed) & 0xFF00) | byte as u16, Ordering::Relaxed),
            0x28 => self.irq_mask.store(
                (self.irq_mask.load(Ordering::Relaxed) & 0x00FF) | ((byte as u16) << 8),
                Ordering::Relaxed,
            ),
            0x38 => self.firq_mask.store(byte, Ordering::Relaxed),
            0x40..=0x7F => {
                self.counter_register(offset, ctx, Some(byte));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raising_an_unmasked_irq_makes_it_pending() {
        let (mut ctx, _rx) = SystemContext::new(8_000_000, 1);
        let ioc = Ioc::new(&mut ctx);
        ioc.borrow().raise_irq(5);
        assert_ne!(ioc.borrow().irq_status.load(Ordering::Relaxed) & (1 << 5), 0);
        assert!(ioc.borrow().irq_pending());
    }

    #[test]
    fn masking_every_status_bit_including_the_forced_one_clears_the_line() {
        let (mut ctx, _rx) = SystemContext::new(8_000_000, 1);
        let ioc = Ioc::new(&mut ctx);
        assert!(ioc.borrow().irq_pending(), "POR and the forced bit should be pending out of reset");
        // bit 7 is force-set in the aggregation formula regardless of irq_status, so it must be
        // masked too for the CPU-visible line to actually clear.
        ioc.borrow_mut().write(0x18, 0xFF, &mut ctx);
        ioc.borrow_mut().write(0x28, 0xFF, &mut ctx);
        assert!(!ioc.borrow().irq_pending());
    }

    #[test]
    fn timer0_go_fires_once_per_period_and_can_be_cleared_and_refired() {
        let (mut ctx, _rx) = SystemContext::new(25_000_000, 9);
        let ioc = Ioc::new(&mut ctx);

        // input latch = 1000, count frequency 2 MHz => ticks_per_count = master/2e6 = 50.
        ioc.borrow_mut().write(0x40, 1000 & 0xFF, &mut ctx);
        ioc.borrow_mut().write(0x44, (1000 >> 8) & 0xFF, &mut ctx);
        ioc.borrow_mut().write(0x48, 0, &mut ctx);

        ctx.increment_cpu_clock(50_000 - 1);
        assert_eq!(ioc.borrow().irq_status.load(Ordering::Relaxed) & (1 << IRQ_TIMER0), 0);

        ctx.increment_cpu_clock(1);
        assert_ne!(ioc.borrow().irq_status.load(Ordering::Relaxed) & (1 << IRQ_TIMER0), 0);

        ioc.borrow().clear_latched_irqs(0xFF);
        assert_eq!(ioc.borrow().irq_status.load(Ordering::Relaxed) & (1 << IRQ_TIMER0), 0);

        ctx.increment_cpu_clock(50_000);
        assert_ne!(ioc.borrow().irq_status.load(Ordering::Relaxed) & (1 << IRQ_TIMER0), 0);
    }

    #[test]
    fn kart_handshake_completes_without_repeating_rak2() {
        let keyboard = AcornKeyboardController::new();
        assert_eq!(keyboard.receive_kart_byte(HRST), Some(RAK1));
        assert_eq!(keyboard.receive_kart_byte(RAK1), Some(RAK2));
        assert_eq!(keyboard.receive_kart_byte(RAK2), None);
        assert_eq!(keyboard.state.get(), KartState::Initialised);
    }

    #[test]
    fn kart_protocol_violation_resets_and_resends_hrst() {
        let keyboard = AcornKeyboardController::new();
        assert_eq!(keyboard.receive_kart_byte(HRST), Some(RAK1));
        // Wrong byte for the ReceivedHrst state.
        assert_eq!(keyboard.receive_kart_byte(0x00), Some(HRST));
        assert_eq!(keyboard.state.get(), KartState::PreReset);
    }

    #[test]
    fn kart_round_trip_through_ioc_delivers_bytes_end_to_end() {
        let (mut ctx, _rx) = SystemContext::new(100_000_000, 3);
        let ioc = Ioc::new(&mut ctx);
        let keyboard = AcornKeyboardController::new();
        *ioc.borrow().keyboard.borrow_mut() = Some(Rc::clone(&keyboard));

        // Small input latch so the KART counter fires quickly relative to the test's clock budget.
        ioc.borrow_mut().write(0x70, 1, &mut ctx);
        ioc.borrow_mut().write(0x74, 0, &mut ctx);
        ioc.borrow_mut().write(0x78, 0, &mut ctx);

        ioc.borrow_mut().write(0x04, HRST as u32, &mut ctx);

        let ticks_per_count = ctx.master_frequency() / COUNT_FREQUENCY_HZ;
        let period = ticks_per_count * KART_SCHEDULE_FACTOR;
        ctx.increment_cpu_clock(period);

        assert_ne!(ioc.borrow().irq_status.load(Ordering::Relaxed) & (1 << IRQ_KART_RX), 0);
        assert_eq!(ioc.borrow_mut().read(0x04, &mut ctx), RAK1 as u32);
    }
}
