/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Control panel: async intent queue between background workers and the
//! synchronous `Browser`.
//!
//! Workers never touch shell state. They submit [`QueuedIntent`]s, and the
//! frame loop drains them with [`ControlPanel::drain_pending`] and applies
//! each through `Browser::apply_intent`.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::shell::ShellIntent;

/// Capacity of the intent channel; limits flooding from async producers.
const INTENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct QueuedIntent {
    pub intent: ShellIntent,
    pub queued_at: Instant,
    pub source: IntentSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntentSource {
    /// Keyboard, media keys, menus.
    LocalUi,
    /// Periodic audio probe.
    AudioProbe,
    /// Scheduled or externally requested maintenance such as clear-data.
    Maintenance,
}

pub struct ControlPanel {
    intent_tx: mpsc::Sender<QueuedIntent>,
    intent_rx: mpsc::Receiver<QueuedIntent>,
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl ControlPanel {
    pub fn new() -> Self {
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_CHANNEL_CAPACITY);
        Self {
            intent_tx,
            intent_rx,
            cancel: CancellationToken::new(),
            workers: JoinSet::new(),
        }
    }

    /// Queue an intent without blocking. Returns false when the queue is full
    /// or closed.
    pub fn submit(&self, intent: ShellIntent, source: IntentSource) -> bool {
        let queued = QueuedIntent {
            intent,
            queued_at: Instant::now(),
            source,
        };
        match self.intent_tx.try_send(queued) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("control_panel: intent from {source:?} dropped ({e})");
                false
            },
        }
    }

    /// Everything queued so far, oldest first. Non-blocking.
    pub fn drain_pending(&mut self) -> Vec<QueuedIntent> {
        let mut intents = Vec::new();
        while let Ok(queued) = self.intent_rx.try_recv() {
            intents.push(queued);
        }
        intents
    }

    /// Spawn the ticker that asks the shell to probe every session for audio.
    /// Must be called from within a tokio runtime.
    pub fn spawn_audio_probe(&mut self, interval: Duration) {
        let cancel = self.cancel.clone();
        let tx = self.intent_tx.clone();
        self.workers.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("control_panel: audio probe cancelled");
                }
                _ = audio_probe_worker(tx, interval) => {}
            }
        });
        log::debug!("control_panel: audio probe spawned every {interval:?}");
    }

    /// Cancel every worker and wait for all of them to finish.
    pub async fn shutdown(&mut self) {
        log::debug!(
            "control_panel: shutdown requested, cancelling {} workers",
            self.workers.len()
        );
        self.cancel.cancel();
        while self.workers.join_next().await.is_some() {}
        log::debug!("control_panel: all workers joined");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self::new()
    }
}

async fn audio_probe_worker(tx: mpsc::Sender<QueuedIntent>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let queued = QueuedIntent {
            intent: ShellIntent::ProbeAudio,
            queued_at: Instant::now(),
            source: IntentSource::AudioProbe,
        };
        match tx.try_send(queued) {
            Ok(()) => {},
            // The frame loop is behind; a skipped probe is picked up next tick.
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::trace!("control_panel: audio probe skipped, queue full");
            },
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::media::MediaCommand;

    #[tokio::test]
    async fn drain_pending_returns_empty_when_no_intents() {
        let mut panel = ControlPanel::new();
        assert!(panel.drain_pending().is_empty());
    }

    #[tokio::test]
    async fn submitted_intents_drain_in_order() {
        let mut panel = ControlPanel::new();
        assert!(panel.submit(ShellIntent::Media(MediaCommand::Pause), IntentSource::LocalUi));
        assert!(panel.submit(ShellIntent::ProbeAudio, IntentSource::AudioProbe));

        let drained = panel.drain_pending();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].intent, ShellIntent::Media(MediaCommand::Pause));
        assert_eq!(drained[0].source, IntentSource::LocalUi);
        assert_eq!(drained[1].intent, ShellIntent::ProbeAudio);
    }

    #[tokio::test]
    async fn full_queue_rejects_submissions() {
        let panel = ControlPanel::new();
        for _ in 0..INTENT_CHANNEL_CAPACITY {
            assert!(panel.submit(ShellIntent::ProbeAudio, IntentSource::AudioProbe));
        }
        assert!(!panel.submit(ShellIntent::ProbeAudio, IntentSource::AudioProbe));
    }

    #[tokio::test]
    async fn audio_probe_emits_periodically() {
        let mut panel = ControlPanel::new();
        panel.spawn_audio_probe(Duration::from_millis(10));
        assert_eq!(panel.worker_count(), 1);

        let received = tokio::time::timeout(Duration::from_secs(2), panel.intent_rx.recv())
            .await
            .expect("audio probe should emit an intent")
            .expect("channel should remain open");
        assert_eq!(received.intent, ShellIntent::ProbeAudio);
        assert_eq!(received.source, IntentSource::AudioProbe);

        panel.shutdown().await;
        assert_eq!(panel.worker_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_completes_with_no_workers() {
        let mut panel = ControlPanel::new();
        panel.shutdown().await;
        assert_eq!(panel.worker_count(), 0);
    }
}
