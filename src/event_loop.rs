use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use log::trace;

use crate::{error::RtResult, value::Value};

/// Source of time for the event loop, in seconds.
pub trait Clock {
    fn now(&self) -> f64;
    fn sleep_until(&self, deadline: f64);
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn sleep_until(&self, deadline: f64) {
        if let Some(remaining) = sleep_duration(deadline - self.now()) {
            thread::sleep(remaining);
        }
    }
}

/// Seconds left until a deadline as a sleepable duration. Deadlines too far
/// out for `Duration` sleep for `Duration::MAX`.
fn sleep_duration(remaining: f64) -> Option<Duration> {
    if remaining > 0.0 {
        Some(Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

/// Clock that only moves when told to. Sleeping jumps straight to the deadline.
#[derive(Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn sleep_until(&self, deadline: f64) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}

type Callback = Box<dyn FnOnce() -> RtResult<()>>;

struct Timer {
    due: f64,
    seq: u64,
    callback: Callback,
}

pub struct EventLoop {
    clock: Rc<dyn Clock>,
    timers: RefCell<Vec<Timer>>,
    next_seq: Cell<u64>,
}

impl EventLoop {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: RefCell::new(Vec::new()),
            next_seq: Cell::new(0),
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Rc::new(SystemClock::new()))
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Queues `callback` to run `delay` seconds from now. Never blocks.
    pub fn schedule(&self, delay: f64, callback: impl FnOnce() -> RtResult<()> + 'static) {
        let delay = if delay.is_finite() && delay > 0.0 { delay } else { 0.0 };
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let due = self.clock.now() + delay;
        trace!("timer {} scheduled at {:.3}", seq, due);
        self.timers.borrow_mut().push(Timer {
            due,
            seq,
            callback: Box::new(callback),
        });
    }

    /// Runtime-level `wait(seconds, callback)`.
    pub fn wait(&self, seconds: f64, callback: Value) {
        self.schedule(seconds, move || callback.call(&[]).map(|_| ()));
    }

    fn next_timer(&self) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
            .map(|(index, _)| index)?;
        Some(timers.remove(index))
    }

    /// Fires timers in due order until none remain, including timers queued
    /// by earlier callbacks. Returns how many fired.
    pub fn run_until_idle(&self) -> RtResult<usize> {
        let mut fired = 0;
        while let Some(timer) = self.next_timer() {
            self.clock.sleep_until(timer.due);
            trace!("timer {} firing", timer.seq);
            (timer.callback)()?;
            fired += 1;
        }
        Ok(fired)
    }
}
