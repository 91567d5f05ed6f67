//! The shared clock, task scheduler and host-message channel that every hardware component is
//! built against. One `SystemContext` exists per running emulated machine.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

/// A pending callback: fires once `at` master-clock ticks have elapsed. Held behind `Rc<RefCell<_>>`
/// rather than a bare `fn` pointer so a device's counter can capture the device itself (its IRQ
/// lines, its reload latch) instead of threading an opaque integer token back through a free
/// function and hoping it recovers the right sub-object.
type GuestTask = Rc<RefCell<dyn FnMut(&mut SystemContext)>>;

struct TaskSlot {
    at: u64,
    callback: GuestTask,
}

/// A handle into the task arena, held by the component that scheduled the task (a counter, say)
/// rather than the task record itself being passed around by reference. Mirrors the source's
/// intrusive pointer linkage without the lifetime hazards of raw pointers across components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(usize);

impl TaskHandle {
    /// A throwaway handle for fields that must hold *some* `TaskHandle` before the real one is
    /// registered (e.g. a counter built in two phases so its fire closure can capture the struct
    /// that owns it). Using this handle with `schedule`/`cancel` before it is overwritten panics.
    pub(crate) fn placeholder() -> Self {
        TaskHandle(usize::MAX)
    }
}

/// An event a guest device wants relayed to the host (e.g. "a key LED changed"). Opaque payload:
/// the host interprets `event_id`/`data1`/`data2` according to its own catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestEvent {
    pub event_id: u32,
    pub data1: u32,
    pub data2: u32,
}

const FUZZ_WORDS: usize = 64;

/// Minimum master-clock frequency, in Hz: real MEMC-era hardware ran the master clock well above
/// the CPU clock so that integral tick counts could represent sub-CPU-cycle timer intervals.
const MIN_MASTER_FREQUENCY: u64 = 100_000_000;

fn xorshift32(state: &mut u32) -> u32 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *state = x;
    x
}

/// Owns the master clock, the task queue, the host-event FIFO, and the pseudo-random "fuzz"
/// source consulted when the guest reads an unmapped I/O address.
pub struct SystemContext {
    master_clock: u64,
    master_frequency: u64,
    cpu_frequency: u64,
    cpu_clock_shift: u32,
    tasks: Vec<TaskSlot>,
    /// Arena indices of scheduled tasks, sorted ascending by `at`.
    queue: Vec<usize>,
    fuzz: [u32; FUZZ_WORDS],
    fuzz_index: usize,
    host_tx: SyncSender<GuestEvent>,
}

impl SystemContext {
    /// Build a new context for the given CPU frequency, choosing `cpu_clock_shift` as the
    /// smallest value making `master_frequency >= max(100 MHz, 4 * cpu_frequency)`. `fuzz_seed`
    /// seeds the xorshift generator that fills the 64-word fuzz buffer once, up front; the buffer
    /// is never regenerated during the session. Returns the context and the receiving end of the
    /// host-event FIFO (the host-input thread's side).
    pub fn new(cpu_frequency: u64, fuzz_seed: u32) -> (SystemContext, Receiver<GuestEvent>) {
        let mut cpu_clock_shift = 0u32;
        while (cpu_frequency << cpu_clock_shift) < MIN_MASTER_FREQUENCY.max(4 * cpu_frequency) {
            cpu_clock_shift += 1;
        }
        let master_frequency = cpu_frequency << cpu_clock_shift;

        let mut seed = fuzz_seed | 1;
        let mut fuzz = [0u32; FUZZ_WORDS];
        for slot in fuzz.iter_mut() {
            *slot = xorshift32(&mut seed);
        }

        let (host_tx, host_rx) = sync_channel(256);

        (
            SystemContext {
                master_clock: 0,
                master_frequency,
                cpu_frequency,
                cpu_clock_shift,
                tasks: Vec::new(),
                queue: Vec::new(),
                fuzz,
                fuzz_index: 0,
                host_tx,
            },
            host_rx,
        )
    }

    pub fn master_clock(&self) -> u64 {
        self.master_clock
    }

    pub fn master_frequency(&self) -> u64 {
        self.master_frequency
    }

    pub fn cpu_frequency(&self) -> u64 {
        self.cpu_frequency
    }

    pub fn cpu_clock_shift(&self) -> u32 {
        self.cpu_clock_shift
    }

    /// Allocate a new, initially unscheduled task slot bound to `callback`. The returned handle
    /// is kept by the owner (a counter, typically) for the lifetime of its device.
    pub fn register_task(&mut self, callback: impl FnMut(&mut SystemContext) + 'static) -> TaskHandle {
        self.tasks.push(TaskSlot { at: u64::MAX, callback: Rc::new(RefCell::new(callback)) });
        TaskHandle(self.tasks.len() - 1)
    }

    /// Schedule (or re-schedule) `handle` to fire at master-clock tick `at`. If already
    /// scheduled, it is moved to its new position; the insertion is a linear scan, matching the
    /// source's intrusive sorted list.
    pub fn schedule(&mut self, handle: TaskHandle, at: u64) {
        let idx = handle.0;
        self.tasks[idx].at = at;
        self.queue.retain(|&i| i != idx);
        let pos = self.queue.partition_point(|&i| self.tasks[i].at <= at);
        self.queue.insert(pos, idx);
    }

    pub fn cancel(&mut self, handle: TaskHandle) {
        self.queue.retain(|&i| i != handle.0);
    }

    /// Advance the master clock by `cpu_cycles` CPU cycles (i.e. `cpu_cycles << cpu_clock_shift`
    /// master ticks) and drain every task whose `at` has now elapsed. A callback may re-schedule
    /// its own task via [`SystemContext::schedule`]; this is tolerated since the task is fully
    /// popped from the queue before the callback runs, and the callback's `Rc` is cloned out so
    /// no borrow of `self` is held across the call.
    pub fn increment_cpu_clock(&mut self, cpu_cycles: u64) {
        self.master_clock += cpu_cycles << self.cpu_clock_shift;

        loop {
            let due = match self.queue.first() {
                Some(&idx) if self.tasks[idx].at <= self.master_clock => idx,
                _ => break,
            };
            self.queue.remove(0);
            let callback = Rc::clone(&self.tasks[due].callback);
            let mut guard = callback.borrow_mut();
            (&mut *guard)(self);
        }
    }

    /// The next pseudo-random 32-bit word from the 64-entry fuzz buffer, simulating the floating
    /// value of an undriven bus line.
    pub fn get_fuzz(&mut self) -> u32 {
        let word = self.fuzz[self.fuzz_index & (FUZZ_WORDS - 1)];
        self.fuzz_index = self.fuzz_index.wrapping_add(1);
        word
    }

    /// Non-blocking enqueue to the host FIFO. Returns `false` (without waiting) if the channel's
    /// bound is full.
    pub fn post_message_to_host(&self, event_id: u32, data1: u32, data2: u32) -> bool {
        self.host_tx.try_send(GuestEvent { event_id, data1, data2 }).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn clock_shift_keeps_master_at_least_4x_cpu_and_100mhz() {
        let (ctx, _rx) = SystemContext::new(8_000_000, 1);
        assert!(ctx.master_frequency() >= 100_000_000);
        assert!(ctx.master_frequency() >= 4 * ctx.cpu_frequency());
    }

    #[test]
    fn fuzz_buffer_wraps_after_64_reads_without_regenerating() {
        let (mut ctx, _rx) = SystemContext::new(8_000_000, 42);
        let first_round: Vec<u32> = (0..64).map(|_| ctx.get_fuzz()).collect();
        let second_round: Vec<u32> = (0..64).map(|_| ctx.get_fuzz()).collect();
        assert_eq!(first_round, second_round);
    }

    #[test]
    fn task_fires_exactly_once_at_scheduled_tick_and_can_reschedule() {
        let (mut ctx, _rx) = SystemContext::new(8_000_000, 7);
        let fire_count = Rc::new(Cell::new(0u32));
        let self_handle = Rc::new(Cell::new(None));

        let handle = {
            let fire_count = Rc::clone(&fire_count);
            let self_handle = Rc::clone(&self_handle);
            ctx.register_task(move |ctx| {
                fire_count.set(fire_count.get() + 1);
                let next = ctx.master_clock() + 100;
                ctx.schedule(self_handle.get().expect("handle set before first fire"), next);
            })
        };
        self_handle.set(Some(handle));
        ctx.schedule(handle, 100);

        ctx.increment_cpu_clock(0);
        assert_eq!(fire_count.get(), 0);

        ctx.increment_cpu_clock(100);
        assert_eq!(fire_count.get(), 1);

        ctx.increment_cpu_clock(100);
        assert_eq!(fire_count.get(), 2);
    }

    #[test]
    fn post_message_to_host_is_received_on_the_other_end() {
        let (ctx, rx) = SystemContext::new(8_000_000, 3);
        assert!(ctx.post_message_to_host(1, 2, 3));
        assert_eq!(rx.try_recv().unwrap(), GuestEvent { event_id: 1, data1: 2, data2: 3 });
    }
}
