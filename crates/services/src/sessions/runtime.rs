use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use super::controller::{SaveOutcome, SessionController, SessionPhase};
use crate::config::EngineConfig;

const TIMER_PERIOD: Duration = Duration::from_secs(1);

/// Background tasks attached to a mounted controller: interval auto-save,
/// debounced change save and, in exam mode, the countdown.
///
/// Dropping the runtime cancels the tasks without a final save; call
/// [`Self::shutdown`] to flush.
pub struct SessionRuntime {
    controller: SessionController,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionRuntime {
    /// Spawn the tasks on the current tokio runtime. Call after `mount`.
    pub async fn start(controller: SessionController, config: &EngineConfig) -> Self {
        let mut tasks = vec![
            tokio::spawn(interval_save(controller.clone(), config.autosave_interval())),
            // subscribe before spawning so edits made before the task first
            // runs still count as changes
            tokio::spawn(debounced_save(
                controller.clone(),
                controller.subscribe(),
                config.change_debounce(),
            )),
        ];
        if controller.exam_mode().await {
            tasks.push(tokio::spawn(exam_timer(controller.clone())));
        }
        Self { controller, tasks }
    }

    #[must_use]
    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Cancel the background tasks, then make the final best-effort save.
    pub async fn shutdown(mut self) -> SaveOutcome {
        for task in std::mem::take(&mut self.tasks) {
            task.abort();
            // a cancelled task reports JoinError::Cancelled; nothing to surface
            let _ = task.await;
        }
        self.controller.unmount().await
    }
}

impl Drop for SessionRuntime {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn interval_save(controller: SessionController, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        if controller.phase().await == SessionPhase::Active {
            debug!("interval auto-save");
            controller.save_now().await;
        }
    }
}

async fn debounced_save(
    controller: SessionController,
    mut changes: watch::Receiver<u64>,
    quiet: Duration,
) {
    loop {
        if changes.changed().await.is_err() {
            return;
        }
        // restart the quiet period on every further change
        loop {
            tokio::select! {
                () = time::sleep(quiet) => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
        debug!("change auto-save");
        controller.save_now().await;
    }
}

async fn exam_timer(controller: SessionController) {
    let mut interval = time::interval(TIMER_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        // outside Active (complete, restarting) the tick is refused; keep
        // waiting so a restarted exam gets its countdown back
        let _ = controller.tick().await;
    }
}
