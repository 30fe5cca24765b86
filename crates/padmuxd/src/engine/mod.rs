//! The real-time worker.
//!
//! One thread owns every stage of the pipeline and runs it once per tick.
//! Other threads talk to it through [`EngineCommand`]s, read what it
//! publishes in [`Shared`] and subscribe to [`EngineEvent`]s.

mod cycle;
mod pacer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use padmux_control::KeySink;
use padmux_gamepad::{DeviceBackend, LogicalGamepad};
use padmux_workspace::Settings;

use crate::error::{Error, Result};
use crate::publish::{DeviceSummary, Shared};
use crate::virtual_pad::{LifecycleConfig, VirtualBackend};
use crate::{print_debug, print_info};

pub use cycle::Pipeline;
pub use pacer::Pacer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Target cycle rate in Hz.
    pub rate_hz: u32,
    /// How often devices are re-enumerated.
    pub refresh_interval: Duration,
    pub grace_cycles: u32,
    pub cooldown_cycles: u32,
    /// Remaining time below which the pacer busy-waits instead of sleeping.
    pub spin_threshold: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let lifecycle = LifecycleConfig::default();
        Self {
            rate_hz: 1000,
            refresh_interval: Duration::from_secs(2),
            grace_cycles: lifecycle.grace_cycles,
            cooldown_cycles: lifecycle.cooldown_cycles,
            spin_threshold: Duration::from_micros(1500),
        }
    }
}

impl EngineConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz.max(1)))
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            grace_cycles: self.grace_cycles,
            cooldown_cycles: self.cooldown_cycles,
        }
    }
}

/// Notifications for the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The tracked device set or an online flag changed.
    DevicesChanged,
    /// A device reappeared under a new instance id. Settings naming `from`
    /// now drive `to`.
    DeviceMigrated { from: Box<str>, to: Box<str> },
    Error {
        message: String,
        cause: Option<String>,
    },
    Warning {
        message: String,
        cause: Option<String>,
    },
}

impl EngineEvent {
    pub(crate) fn error(message: impl Into<String>, cause: Option<String>) -> Self {
        EngineEvent::Error {
            message: message.into(),
            cause,
        }
    }

    pub(crate) fn warning(message: impl Into<String>, cause: Option<String>) -> Self {
        EngineEvent::Warning {
            message: message.into(),
            cause,
        }
    }
}

/// Requests handled by the worker at the start of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Override a slot's vibration, optionally on one device only.
    TestRumble {
        slot: usize,
        device: Option<Box<str>>,
        left: u16,
        right: u16,
    },
    StopTestRumble {
        slot: usize,
    },
    /// Re-enumerate devices on the next cycle.
    RefreshDevices,
}

struct Inner {
    shared: Shared,
    running: AtomicBool,
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl Inner {
    fn broadcast(&self, event: &EngineEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

/// Handle to the running worker thread. Dropping it stops the worker.
pub struct Engine {
    inner: Arc<Inner>,
    commands: Sender<EngineCommand>,
    worker: Option<JoinHandle<()>>,
}

impl Engine {
    /// Start the worker.
    ///
    /// `factory` runs on the worker thread, so backends that must stay on
    /// the thread that created them need not be `Send`. Its error is
    /// returned here and nothing else runs.
    pub fn start<B, V, K, F>(config: EngineConfig, settings: Settings, factory: F) -> Result<Self>
    where
        B: DeviceBackend + 'static,
        V: VirtualBackend + 'static,
        K: KeySink + 'static,
        F: FnOnce() -> Result<(B, V, K)> + Send + 'static,
    {
        let inner = Arc::new(Inner {
            shared: Shared::new(settings),
            running: AtomicBool::new(true),
            subscribers: Mutex::new(Vec::new()),
        });
        let (commands, command_rx) = unbounded::<EngineCommand>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("padmux-engine".into())
            .spawn(move || {
                let (devices, virtuals, keys) = match factory() {
                    Ok(parts) => parts,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let mut pipeline = Pipeline::new(devices, virtuals, keys, &config);
                let _ = ready_tx.send(Ok(()));
                run(&worker_inner, &mut pipeline, &command_rx, &config);
            })
            .map_err(|e| Error::Startup(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                inner,
                commands,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(Error::Startup("worker exited before it was ready".into()))
            }
        }
    }

    /// Swap the settings snapshot read by the next cycle.
    pub fn update_settings(&self, settings: Settings) {
        self.inner.shared.settings.store(settings);
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.inner.shared.settings.load()
    }

    pub fn send(&self, command: EngineCommand) {
        let _ = self.commands.send(command);
    }

    /// Receive every event raised from now on.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn combined(&self, slot: usize) -> LogicalGamepad {
        self.inner.shared.combined(slot)
    }

    pub fn submitted(&self, slot: usize) -> Option<LogicalGamepad> {
        self.inner.shared.submitted(slot)
    }

    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.inner.shared.devices()
    }

    /// Measured cycle rate in Hz, updated once per second.
    pub fn frequency(&self) -> f64 {
        self.inner.shared.frequency()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Ask the worker to stop and wait until it has cleaned up.
    pub fn stop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<B, V, K>(
    inner: &Inner,
    pipeline: &mut Pipeline<B, V, K>,
    commands: &Receiver<EngineCommand>,
    config: &EngineConfig,
) where
    B: DeviceBackend,
    V: VirtualBackend,
    K: KeySink,
{
    print_info!("engine running at {} Hz", config.rate_hz);
    let mut pacer = Pacer::new(config.period(), config.spin_threshold, Instant::now());
    while inner.running.load(Ordering::Acquire) {
        while let Ok(command) = commands.try_recv() {
            print_debug!("command: {command:?}");
            pipeline.command(command);
        }

        let settings = inner.shared.settings.load();
        pipeline.run_cycle(Instant::now(), &settings, &inner.shared);
        for event in pipeline.take_events() {
            inner.broadcast(&event);
        }

        if let Some(hz) = pacer.wait() {
            inner.shared.publish_frequency(hz);
        }
    }

    pipeline.shutdown();
    for event in pipeline.take_events() {
        inner.broadcast(&event);
    }
    print_info!("engine stopped");
}
