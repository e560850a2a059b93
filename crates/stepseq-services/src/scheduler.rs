//! Transport scheduler: walks the pattern on a timer thread
//!
//! Every tick re-reads the latest pattern snapshot, so edits and tempo
//! changes made while running are picked up on the next tick. The timer is
//! a wall-clock thread, not an audio clock: deadlines are accumulated so
//! jitter does not compound, but individual ticks can land late by whatever
//! the OS scheduler adds.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use stepseq_core::{swing_offset, tick_interval, Catalog, Pattern, PatternStore, Tick, Transport};
use tracing::{debug, info, trace, warn};

use crate::playback::{Playback, PlaybackError, Trigger};

enum Wake {
    Reschedule,
    Shutdown,
}

/// Longest the timer thread sleeps without re-checking tempo and swing, so
/// edits made straight on the store still retime the pending tick
const RETIME_SLICE: Duration = Duration::from_millis(10);

struct Clock {
    transport: Transport,
    /// When the next tick is due, swing included; `None` while stopped
    next_deadline: Option<Instant>,
    /// Straight (unswung) time of the next tick
    next_grid: Option<Instant>,
    /// Straight time of the tick that last fired
    last_grid: Option<Instant>,
    /// Tempo and swing the pending deadline was computed with
    bpm: u32,
    swing: f32,
}

impl Clock {
    fn new() -> Self {
        Self {
            transport: Transport::new(),
            next_deadline: None,
            next_grid: None,
            last_grid: None,
            bpm: 0,
            swing: 0.0,
        }
    }

    fn start_now(&mut self) {
        let now = Instant::now();
        self.next_grid = Some(now);
        self.next_deadline = Some(now);
        self.last_grid = None;
    }

    fn halt(&mut self) {
        self.next_deadline = None;
        self.next_grid = None;
        self.last_grid = None;
    }

    /// Place the next tick at `grid` plus the swing of the step it plays
    fn schedule(&mut self, grid: Instant, pattern: &Pattern) {
        let step = self.transport.current_step() % pattern.total_steps().max(1);
        self.next_grid = Some(grid);
        self.next_deadline = Some(grid + swing_offset(pattern.bpm(), pattern.swing(), step));
        self.bpm = pattern.bpm();
        self.swing = pattern.swing();
    }
}

/// State shared between the caller and the timer thread
struct Shared {
    store: Arc<PatternStore>,
    catalog: Mutex<Arc<Catalog>>,
    playback: Arc<dyn Playback>,
    clock: Mutex<Clock>,
}

impl Shared {
    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn catalog(&self) -> Arc<Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stop the transport. Returns false if it was not running.
    fn halt(&self) -> bool {
        let mut clock = self.clock();
        if !clock.transport.is_running() {
            return false;
        }
        clock.transport.stop();
        clock.halt();
        info!(step = clock.transport.current_step(), "Transport stopped");
        true
    }

    /// Move the pending tick when tempo or swing changed since it was
    /// scheduled. The new interval counts from the last tick; if that time
    /// has already passed the tick is due right away.
    fn retime(&self) {
        let mut clock = self.clock();
        let Some(last_grid) = clock.last_grid else {
            return;
        };
        if clock.next_deadline.is_none() {
            return;
        }
        let pattern = self.store.snapshot();
        if pattern.bpm() == clock.bpm && pattern.swing() == clock.swing {
            return;
        }

        debug!(
            from = clock.bpm,
            to = pattern.bpm(),
            swing = pattern.swing(),
            "Tempo changed, rescheduling"
        );
        let grid = last_grid + tick_interval(pattern.bpm());
        clock.schedule(grid, &pattern);
        let now = Instant::now();
        if clock.next_deadline.is_some_and(|d| d < now) {
            clock.next_deadline = Some(now);
        }
    }

    /// Fire the pending tick if it is due. Runs with the clock locked, so a
    /// concurrent stop either happens before (and the tick is skipped) or
    /// waits until the triggers are out.
    fn fire_due_tick(&self) {
        let mut clock = self.clock();
        let (Some(deadline), Some(grid)) = (clock.next_deadline, clock.next_grid) else {
            return;
        };
        let now = Instant::now();
        if now < deadline {
            return;
        }

        let pattern = self.store.snapshot();
        let Some(tick) = clock.transport.tick(&pattern) else {
            clock.halt();
            return;
        };

        let interval = tick_interval(pattern.bpm());
        let mut next = grid + interval;
        if next <= now {
            debug!(
                late_ms = now.duration_since(deadline).as_millis() as u64,
                "Transport fell behind, resynchronising"
            );
            next = now + interval;
        }
        clock.last_grid = Some(grid);
        clock.schedule(next, &pattern);

        self.trigger(&tick);
    }

    fn trigger(&self, tick: &Tick) {
        let catalog = self.catalog();
        trace!(step = tick.step, notes = tick.notes.len(), "Tick");

        for note in &tick.notes {
            let Some(entry) = catalog.get(&note.name) else {
                trace!(name = %note.name, "Note not in catalog, skipping");
                continue;
            };
            let trigger = Trigger {
                name: entry.name.clone(),
                file: entry.file.clone(),
                gain: note.gain,
                step: Some(tick.step),
            };
            if let Err(e) = self.playback.play(&trigger) {
                warn!(name = %note.name, step = tick.step, "Playback failed: {}", e);
            }
        }
    }
}

/// Drives a [`Transport`] over a shared [`PatternStore`]
pub struct Scheduler {
    shared: Arc<Shared>,
    wake_tx: Sender<Wake>,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the timer thread. The transport starts stopped at step 0.
    pub fn new(store: Arc<PatternStore>, catalog: Arc<Catalog>, playback: Arc<dyn Playback>) -> Self {
        let shared = Arc::new(Shared {
            store,
            catalog: Mutex::new(catalog),
            playback,
            clock: Mutex::new(Clock::new()),
        });

        let (wake_tx, wake_rx) = unbounded();
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("stepseq-transport".into())
            .spawn(move || run(&worker_shared, &wake_rx))
            .map_err(|e| warn!("Failed to spawn transport thread: {}", e))
            .ok();

        Self {
            shared,
            wake_tx,
            worker,
        }
    }

    fn wake(&self) {
        let _ = self.wake_tx.send(Wake::Reschedule);
    }

    /// Start playing from the current step; the first tick fires immediately
    pub fn play(&self) {
        {
            let mut clock = self.shared.clock();
            if clock.transport.is_running() {
                return;
            }
            clock.transport.play();
            clock.start_now();
            info!(step = clock.transport.current_step(), "Transport started");
        }
        self.wake();
    }

    /// Stop without rewinding. No tick fires after this returns.
    pub fn stop(&self) {
        if !self.shared.halt() {
            return;
        }
        self.shared.playback.stop_all();
        self.wake();
    }

    /// Stop, rewind to step 0 and clear the pattern back to its defaults
    pub fn reset(&self) {
        {
            let mut clock = self.shared.clock();
            clock.transport.reset();
            clock.halt();
            self.shared.store.reset();
            info!("Transport reset");
        }
        self.shared.playback.stop_all();
        self.wake();
    }

    /// Change tempo; a running transport moves its pending tick to the new
    /// interval counted from the last one
    pub fn set_bpm(&self, bpm: u32) -> Arc<Pattern> {
        let pattern = self.shared.store.set_bpm(bpm);
        self.wake();
        pattern
    }

    /// Change swing; takes effect on the pending tick like [`Self::set_bpm`]
    pub fn set_swing(&self, swing: f32) -> Arc<Pattern> {
        let pattern = self.shared.store.set_swing(swing);
        self.wake();
        pattern
    }

    pub fn is_running(&self) -> bool {
        self.shared.clock().transport.is_running()
    }

    /// Step the next tick will play
    pub fn current_step(&self) -> u32 {
        self.shared.clock().transport.current_step()
    }

    /// Copy of the transport state
    pub fn transport(&self) -> Transport {
        self.shared.clock().transport.clone()
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.shared.store
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.shared.catalog()
    }

    /// Swap the catalog; takes effect on the next tick
    pub fn set_catalog(&self, catalog: Arc<Catalog>) {
        *self.shared.catalog.lock().unwrap_or_else(PoisonError::into_inner) = catalog;
    }

    /// Sound one catalog entry right away. Returns false for unknown names.
    pub fn preview(&self, name: &str) -> Result<bool, PlaybackError> {
        let catalog = self.shared.catalog();
        let Some(entry) = catalog.get(name) else {
            return Ok(false);
        };
        let gain = self.shared.store.snapshot().lane(name).gain;
        self.shared.playback.play(&Trigger {
            name: entry.name.clone(),
            file: entry.file.clone(),
            gain,
            step: None,
        })?;
        Ok(true)
    }

    /// Stop playback and join the timer thread
    pub fn shutdown(&mut self) {
        self.stop();
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.wake_tx.send(Wake::Shutdown);
        if worker.join().is_err() {
            warn!("Transport thread panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: &Shared, wake_rx: &Receiver<Wake>) {
    debug!("Transport thread started");
    loop {
        shared.retime();
        let deadline = shared.clock().next_deadline;
        let wake = match deadline {
            Some(deadline) => wake_rx.recv_deadline(deadline.min(Instant::now() + RETIME_SLICE)),
            None => wake_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match wake {
            Ok(Wake::Reschedule) => continue,
            Ok(Wake::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                shared.retime();
                shared.fire_due_tick();
            }
        }
    }
    debug!("Transport thread exited");
}
