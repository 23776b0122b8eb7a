//! A spinner shown while a turn is being processed.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::render::Console;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Handle to a running thinking indicator.
///
/// The task ends when [`ThinkingIndicator::stop`] is called, when the handle
/// is dropped, or when the cancellation token fires, whichever happens first.
/// It erases its frame on the way out.
pub struct ThinkingIndicator {
    stop: oneshot::Sender<()>,
    task: JoinHandle<usize>,
}

impl ThinkingIndicator {
    /// Start drawing a frame every `tick`.
    pub fn start(console: Console, tick: Duration, cancel: CancellationToken) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut frames = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        console.print_thinking_frame(FRAMES[frames % FRAMES.len()]);
                        frames += 1;
                    }
                }
            }
            console.clear_thinking();
            frames
        });
        Self { stop, task }
    }

    /// Stop the indicator and wait for it to erase itself.
    ///
    /// Returns the number of frames drawn.
    pub async fn stop(self) -> usize {
        let _ = self.stop.send(());
        self.task.await.unwrap_or_default()
    }
}
