//! Progress stage mapping and tracking for a single conversion.
//!
//! Adapters report raw completion fractions in `[0, 1]`; the tracker maps
//! them onto a small set of named stages with fixed display percentages,
//! estimates time remaining, and schedules the UI auto-hide after the run
//! finishes. All time handling goes through explicit `Instant`s so tests
//! can drive the clock instead of sleeping.
//!
//! Why fixed display percentages? Raw adapter fractions are jumpy (a trace
//! pass may jump from 0.3 to 0.9 in one step) and differ per backend. Fixed
//! stage percentages give every conversion the same visual rhythm, and the
//! monotonic clamp guarantees the displayed number never moves backwards
//! within one attempt.

use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Grace period before a successful conversion's progress UI hides.
pub const HIDE_AFTER_SUCCESS: Duration = Duration::from_secs(2);
/// Grace period before a failed conversion's progress UI hides.
pub const HIDE_AFTER_ERROR: Duration = Duration::from_secs(3);

/// Discrete progress stages with fixed display percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressStage {
    Initializing,
    LoadingLibraries,
    Validating,
    Processing,
    Converting,
    Optimizing,
    Finalizing,
    Complete,
}

impl ProgressStage {
    /// Displayed percentage for this stage.
    pub fn percent(self) -> u8 {
        match self {
            ProgressStage::Initializing => 5,
            ProgressStage::LoadingLibraries => 20,
            ProgressStage::Validating => 30,
            ProgressStage::Processing => 50,
            ProgressStage::Converting => 70,
            ProgressStage::Optimizing => 85,
            ProgressStage::Finalizing => 95,
            ProgressStage::Complete => 100,
        }
    }

    /// Human-readable status line for this stage.
    pub fn label(self) -> &'static str {
        match self {
            ProgressStage::Initializing => "Initializing...",
            ProgressStage::LoadingLibraries => "Loading processing libraries...",
            ProgressStage::Validating => "Validating file...",
            ProgressStage::Processing => "Processing image data...",
            ProgressStage::Converting => "Converting to target format...",
            ProgressStage::Optimizing => "Optimizing output...",
            ProgressStage::Finalizing => "Preparing download...",
            ProgressStage::Complete => "Conversion complete!",
        }
    }
}

/// Map a raw adapter fraction onto a stage.
///
/// Note the first two windows: fractions up to 0.1 map to `Validating`
/// (displayed 30) while fractions up to 0.3 map to `LoadingLibraries`
/// (displayed 20). This ordering is intentional, kept for behavioral
/// parity with the long-shipped progress UI; the monotonic clamp in
/// [`ProgressTracker`] means the display holds at 30 through the
/// `LoadingLibraries` window rather than stepping backwards.
pub fn stage_for_fraction(p: f64) -> ProgressStage {
    if p >= 1.0 {
        ProgressStage::Complete
    } else if p <= 0.1 {
        ProgressStage::Validating
    } else if p <= 0.3 {
        ProgressStage::LoadingLibraries
    } else if p <= 0.5 {
        ProgressStage::Processing
    } else if p <= 0.7 {
        ProgressStage::Converting
    } else if p <= 0.9 {
        ProgressStage::Optimizing
    } else {
        ProgressStage::Finalizing
    }
}

/// Default whole-conversion estimate when no progress has been made yet,
/// bucketed by input size.
fn initial_estimate_secs(input_size: u64) -> u64 {
    const MB: u64 = 1024 * 1024;
    if input_size < MB {
        3
    } else if input_size < 5 * MB {
        5
    } else if input_size < 10 * MB {
        8
    } else if input_size < 20 * MB {
        12
    } else {
        15
    }
}

/// Point-in-time view of a conversion's progress, for UIs to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    /// Displayed percentage, 0–100, monotonically non-decreasing within
    /// one adapter attempt.
    pub progress: u8,
    /// Current stage label, or the failure message once the conversion
    /// has errored.
    pub stage_label: String,
    /// Whole seconds remaining, absent once complete.
    pub estimated_seconds_remaining: Option<u64>,
    pub is_visible: bool,
    pub has_error: bool,
}

#[derive(Debug)]
struct Inner {
    started_at: Instant,
    input_size: u64,
    stage: ProgressStage,
    /// Monotonic floor for the displayed percentage within this attempt.
    display_floor: u8,
    finished: bool,
    has_error: bool,
    /// Displayed in place of the stage label after a failure.
    error_message: Option<String>,
    /// When set, the UI hides once the clock passes this instant.
    hide_at: Option<Instant>,
}

/// Progress state for one in-flight conversion.
///
/// One tracker per conversion call; the orchestrator resets it at start
/// and the route/CLI layers poll [`ProgressTracker::snapshot_at`].
/// Interior mutability lets adapters report through a shared `&self`.
#[derive(Debug)]
pub struct ProgressTracker {
    inner: Mutex<Inner>,
}

impl ProgressTracker {
    /// Create a tracker for an input of `input_size` bytes, started now.
    pub fn start(input_size: u64) -> Self {
        Self::start_at(input_size, Instant::now())
    }

    /// Clock-injectable constructor for tests.
    pub fn start_at(input_size: u64, now: Instant) -> Self {
        Self {
            inner: Mutex::new(Inner {
                started_at: now,
                input_size,
                stage: ProgressStage::Initializing,
                display_floor: ProgressStage::Initializing.percent(),
                finished: false,
                has_error: false,
                error_message: None,
                hide_at: None,
            }),
        }
    }

    /// Record a raw completion fraction from the running adapter.
    pub fn report_fraction(&self, p: f64) {
        let mut inner = self.lock();
        if inner.finished {
            return;
        }
        let stage = stage_for_fraction(p.clamp(0.0, 1.0));
        inner.stage = stage;
        inner.display_floor = inner.display_floor.max(stage.percent());
    }

    /// Reset the stage and monotonic clamp for the next fallback
    /// candidate. The start time is kept so the ETA reflects total
    /// elapsed work, not just the current attempt.
    pub fn restart_attempt(&self) {
        let mut inner = self.lock();
        if inner.finished {
            return;
        }
        inner.stage = ProgressStage::Initializing;
        inner.display_floor = ProgressStage::Initializing.percent();
    }

    /// Mark the conversion successful and schedule the auto-hide.
    pub fn complete(&self) {
        self.complete_at(Instant::now());
    }

    pub fn complete_at(&self, now: Instant) {
        let mut inner = self.lock();
        inner.stage = ProgressStage::Complete;
        inner.display_floor = 100;
        inner.finished = true;
        inner.has_error = false;
        inner.hide_at = Some(now + HIDE_AFTER_SUCCESS);
    }

    /// Mark the conversion failed and schedule the (longer) auto-hide.
    /// The message replaces the stage label for the remaining visible
    /// window so a polling UI never shows a stale in-progress stage.
    pub fn fail(&self, message: impl Into<String>) {
        self.fail_at(message, Instant::now());
    }

    pub fn fail_at(&self, message: impl Into<String>, now: Instant) {
        let mut inner = self.lock();
        inner.finished = true;
        inner.has_error = true;
        let message = message.into();
        inner.error_message = Some(if message.is_empty() {
            "Conversion failed".into()
        } else {
            message
        });
        inner.hide_at = Some(now + HIDE_AFTER_ERROR);
    }

    /// Current state as of now.
    pub fn snapshot(&self) -> ProgressState {
        self.snapshot_at(Instant::now())
    }

    /// Current state as of an explicit instant.
    pub fn snapshot_at(&self, now: Instant) -> ProgressState {
        let inner = self.lock();
        let progress = inner.display_floor;
        let is_visible = match inner.hide_at {
            Some(hide_at) => now < hide_at,
            None => true,
        };
        let estimated_seconds_remaining = if inner.finished {
            None
        } else if progress <= ProgressStage::Initializing.percent() {
            Some(initial_estimate_secs(inner.input_size))
        } else {
            // elapsed * (100 - progress) / progress
            let elapsed = now.saturating_duration_since(inner.started_at).as_secs_f64();
            let p = f64::from(progress);
            Some((elapsed * (100.0 - p) / p).ceil() as u64)
        };
        let stage_label = match (&inner.error_message, inner.has_error) {
            (Some(message), true) => message.clone(),
            _ => inner.stage.label().to_owned(),
        };
        ProgressState {
            progress,
            stage_label,
            estimated_seconds_remaining,
            is_visible,
            has_error: inner.has_error,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
