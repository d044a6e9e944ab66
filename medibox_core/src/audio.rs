//! Single-slot gate in front of the audio renderer.
//!
//! At most one playback is in flight process-wide. A request that arrives
//! while the slot is taken is dropped, not queued; that is a normal outcome.

use medibox_traits::{AudioCue, AudioSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Where the playback call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Short-lived thread per playback; `play` returns immediately.
    #[default]
    Background,
    /// Play on the caller's thread. Deterministic, used by tests and one-shot
    /// CLI commands.
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Handed to a background playback thread.
    Dispatched,
    /// Inline playback finished and the renderer reported success.
    Played,
    /// Inline playback finished and the renderer reported failure, or the
    /// playback thread could not be started.
    Failed,
    /// Slot was busy.
    Dropped,
}

/// Held while a playback runs; frees the slot on drop, including on panic.
struct SlotPermit(Arc<AtomicBool>);

impl SlotPermit {
    fn try_acquire(slot: &Arc<AtomicBool>) -> Option<Self> {
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(slot)))
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AudioGate {
    sink: Arc<dyn AudioSink + Send + Sync>,
    busy: Arc<AtomicBool>,
    mode: PlaybackMode,
}

impl std::fmt::Debug for AudioGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGate")
            .field("busy", &self.is_busy())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl AudioGate {
    pub fn new(sink: Arc<dyn AudioSink + Send + Sync>, mode: PlaybackMode) -> Self {
        Self {
            sink,
            busy: Arc::new(AtomicBool::new(false)),
            mode,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn play(&self, cue: AudioCue) -> PlayOutcome {
        let Some(permit) = SlotPermit::try_acquire(&self.busy) else {
            tracing::trace!(cue = cue.key(), "audio busy, cue dropped");
            return PlayOutcome::Dropped;
        };
        match self.mode {
            PlaybackMode::Inline => play_with(&*self.sink, cue, permit),
            PlaybackMode::Background => {
                let sink = Arc::clone(&self.sink);
                let spawned = std::thread::Builder::new()
                    .name("audio".into())
                    .spawn(move || {
                        play_with(&*sink, cue, permit);
                    });
                match spawned {
                    Ok(_) => PlayOutcome::Dispatched,
                    Err(e) => {
                        tracing::warn!(cue = cue.key(), error = %e, "audio thread spawn failed");
                        PlayOutcome::Failed
                    }
                }
            }
        }
    }

    /// Poll until the slot is free or `timeout` passes. Returns whether the
    /// slot is free.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

fn play_with(sink: &(dyn AudioSink + Send + Sync), cue: AudioCue, _permit: SlotPermit) -> PlayOutcome {
    let category = cue.category().as_str();
    if sink.play_alert(category, cue.key()) {
        tracing::debug!(category, cue = cue.key(), "audio played");
        PlayOutcome::Played
    } else {
        tracing::warn!(category, cue = cue.key(), "audio playback failed");
        PlayOutcome::Failed
    }
}
