//! Background monitor loop.
//!
//! Spawns a thread that owns the [`Pipeline`], ticks it at the sampling rate,
//! serves operator commands between ticks and persists state when something
//! worth keeping changed. Readers use the [`SharedView`] and the outbound
//! subscriber and never touch the pipeline directly.
//!
//! Each `Monitor` spawns exactly one thread, which is shut down and joined
//! when the `Monitor` is dropped. State is saved one last time on the way out.
use crossbeam_channel as xch;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use kegmon_config::save_state;

use crate::error::KegmonError;
use crate::outbound::OutboundMessage;
use crate::pipeline::{Command, CommandReply, Pipeline};
use crate::shared::SharedView;

type Reply = xch::Sender<Result<CommandReply, KegmonError>>;

pub struct Monitor {
    commands: xch::Sender<(Command, Reply)>,
    view: SharedView,
    outbound: xch::Receiver<OutboundMessage>,
    ticks: Arc<AtomicU64>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Monitor {
    /// Run `pipeline` at `hz` on a dedicated thread. With `state_path`, state is
    /// written there whenever it changes and at shutdown.
    pub fn spawn(pipeline: Pipeline, hz: u32, state_path: Option<PathBuf>) -> Self {
        let (cmd_tx, cmd_rx) = xch::unbounded::<(Command, Reply)>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = ticks.clone();
        let view = pipeline.view();
        let outbound = pipeline.outbound().subscriber();
        let period = Duration::from_micros(crate::util::period_us(hz));

        let join_handle = std::thread::spawn(move || {
            let mut pipeline = pipeline;
            let clock = pipeline.clock();
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("monitor thread received shutdown signal");
                    break;
                }
                let started = clock.now();

                for (cmd, reply) in cmd_rx.try_iter() {
                    let result = pipeline.apply(cmd);
                    if let Err(e) = &result {
                        tracing::warn!(error = %e, "command rejected");
                    }
                    // Requester may have timed out and gone away.
                    let _ = reply.send(result);
                }

                pipeline.tick();
                ticks_clone.fetch_add(1, Ordering::Relaxed);

                if pipeline.take_dirty()
                    && let Some(path) = &state_path
                {
                    persist(&pipeline, path);
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                let elapsed = clock.now().saturating_duration_since(started);
                clock.sleep(period.saturating_sub(elapsed));
            }
            if let Some(path) = &state_path {
                persist(&pipeline, path);
            }
            tracing::trace!("monitor thread exiting cleanly");
        });

        Self {
            commands: cmd_tx,
            view,
            outbound,
            ticks,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Send a command and wait for the loop to handle it (at most one tick later).
    pub fn request(&self, cmd: Command, timeout: Duration) -> Result<CommandReply, KegmonError> {
        let (tx, rx) = xch::bounded(1);
        self.commands
            .send((cmd, tx))
            .map_err(|_| KegmonError::Stopped)?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(xch::RecvTimeoutError::Timeout) => Err(KegmonError::Timeout),
            Err(xch::RecvTimeoutError::Disconnected) => Err(KegmonError::Stopped),
        }
    }

    pub fn view(&self) -> &SharedView {
        &self.view
    }

    /// Receiving end of the outbound queue.
    pub fn outbound(&self) -> &xch::Receiver<OutboundMessage> {
        &self.outbound
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

fn persist(pipeline: &Pipeline, path: &Path) {
    match save_state(path, &pipeline.persisted_state()) {
        Ok(()) => tracing::trace!(path = %path.display(), "state saved"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to save state"),
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // The thread exits after the current tick, bounded by the sensor timeout.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("monitor thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(?e, "monitor thread panicked during shutdown");
                }
            }
        }
    }
}
