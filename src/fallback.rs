//! Sequential fallback over a descriptor's adapter candidates.
//!
//! Candidates run strictly one at a time, in registration order; the
//! first success wins. A candidate that cannot even be constructed
//! (`AdapterUnavailable`) counts as a failed attempt exactly like a
//! runtime failure. Intermediate failures are logged and swallowed; only
//! the last candidate's error reaches the caller.

use crate::adapters::{LazyAdapter, ProgressFn};
use crate::error::ConvertError;
use crate::options::ConversionOptions;
use crate::progress::ProgressTracker;
use std::sync::Arc;
use tracing::{debug, warn};

/// The winning result plus how it was reached.
#[derive(Debug)]
pub struct FallbackOutcome {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    /// Winning adapter's name.
    pub method: &'static str,
    /// Candidates that failed before the winner.
    pub failed_attempts: u32,
}

/// Run candidates in order until one succeeds.
pub async fn run(
    candidates: &[LazyAdapter],
    input: &[u8],
    options: &ConversionOptions,
    tracker: &Arc<ProgressTracker>,
) -> Result<FallbackOutcome, ConvertError> {
    debug_assert!(!candidates.is_empty(), "registry validation admits no empty plans");
    let mut last_err = ConvertError::Internal("no adapter candidates".into());

    for (attempt, candidate) in candidates.iter().enumerate() {
        if attempt > 0 {
            tracker.restart_attempt();
        }
        debug!(adapter = candidate.name(), attempt, "trying conversion candidate");

        let adapter = match candidate.get() {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!(adapter = candidate.name(), error = %err, "candidate unavailable");
                last_err = err;
                continue;
            }
        };

        let progress: ProgressFn = {
            let tracker = tracker.clone();
            Arc::new(move |p| tracker.report_fraction(p))
        };
        match adapter.convert(input, options, &progress).await {
            Ok(converted) => {
                return Ok(FallbackOutcome {
                    data: converted.data,
                    mime_type: converted.mime_type,
                    method: adapter.name(),
                    failed_attempts: attempt as u32,
                });
            }
            Err(err) if err.allows_fallback() => {
                warn!(adapter = candidate.name(), error = %err, "candidate failed");
                last_err = err;
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Adapter, Converted};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAdapter {
        name: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Adapter for FixedAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn convert(
            &self,
            _input: &[u8],
            _options: &ConversionOptions,
            _progress: &ProgressFn,
        ) -> Result<Converted, ConvertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ConvertError::ConversionFailed {
                    message: format!("{} always fails", self.name),
                })
            } else {
                Ok(Converted {
                    data: b"ok".to_vec(),
                    mime_type: "image/svg+xml",
                })
            }
        }
    }

    fn candidate(
        name: &'static str,
        fail: bool,
        calls: &Arc<AtomicUsize>,
    ) -> LazyAdapter {
        let calls = calls.clone();
        LazyAdapter::new(name, move || {
            Ok(Arc::new(FixedAdapter {
                name,
                fail,
                calls: calls.clone(),
            }) as Arc<dyn Adapter>)
        })
    }

    #[tokio::test]
    async fn second_candidate_wins_after_first_fails() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let candidates = vec![
            candidate("primary", true, &calls_a),
            candidate("backup", false, &calls_b),
        ];
        let tracker = Arc::new(ProgressTracker::start(2));

        let outcome = run(
            &candidates,
            b"in",
            &ConversionOptions::default(),
            &tracker,
        )
        .await
        .expect("fallback succeeds");

        assert_eq!(outcome.method, "backup");
        assert_eq!(outcome.failed_attempts, 1);
        assert_eq!(outcome.data, b"ok");
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_success_skips_later_candidates() {
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let candidates = vec![
            candidate("primary", false, &calls_a),
            candidate("backup", false, &calls_b),
        ];
        let tracker = Arc::new(ProgressTracker::start(2));

        let outcome = run(&candidates, b"in", &ConversionOptions::default(), &tracker)
            .await
            .expect("succeeds");
        assert_eq!(outcome.method, "primary");
        assert_eq!(outcome.failed_attempts, 0);
        assert_eq!(calls_b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn last_candidate_error_is_surfaced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let candidates = vec![
            candidate("first", true, &calls),
            candidate("second", true, &calls),
        ];
        let tracker = Arc::new(ProgressTracker::start(2));

        let err = run(&candidates, b"in", &ConversionOptions::default(), &tracker)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("second always fails"), "{err}");
    }

    #[tokio::test]
    async fn unavailable_candidate_advances_plan() {
        let calls = Arc::new(AtomicUsize::new(0));
        let candidates = vec![
            LazyAdapter::new("broken", || {
                Err(ConvertError::AdapterUnavailable {
                    adapter: "broken",
                    reason: "no native library".into(),
                })
            }),
            candidate("backup", false, &calls),
        ];
        let tracker = Arc::new(ProgressTracker::start(2));

        let outcome = run(&candidates, b"in", &ConversionOptions::default(), &tracker)
            .await
            .expect("backup wins");
        assert_eq!(outcome.method, "backup");
        assert_eq!(outcome.failed_attempts, 1);
    }

    #[tokio::test]
    async fn attempt_switch_resets_progress_display() {
        struct Reporting;

        #[async_trait]
        impl Adapter for Reporting {
            fn name(&self) -> &'static str {
                "reporting"
            }
            async fn convert(
                &self,
                _input: &[u8],
                _options: &ConversionOptions,
                progress: &ProgressFn,
            ) -> Result<Converted, ConvertError> {
                progress(0.8);
                Err(ConvertError::ConversionFailed {
                    message: "late failure".into(),
                })
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let candidates = vec![
            LazyAdapter::new("reporting", || Ok(Arc::new(Reporting) as Arc<dyn Adapter>)),
            candidate("backup", true, &calls),
        ];
        let tracker = Arc::new(ProgressTracker::start(2));

        let _ = run(&candidates, b"in", &ConversionOptions::default(), &tracker).await;
        // The backup attempt restarted the display from Initializing; the
        // failed run's 85% must not leak through.
        let snap = tracker.snapshot();
        assert_eq!(snap.progress, 5);
    }
}
