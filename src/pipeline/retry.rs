use crate::backend::{GenerationError, RewriteBackend};
use crate::validate::validate_rewrite;

/// What happened to one rewrite attempt. Backend failures consume an
/// attempt slot exactly like a rejected candidate; quota failures are kept
/// apart so callers can surface them distinctly.
#[derive(Clone, Debug)]
pub enum AttemptVerdict {
    Accepted,
    Rejected(String),
    Failed(String),
    QuotaExhausted(String),
}

#[derive(Clone, Debug)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: usize,
    pub output: Option<String>,
    pub verdict: AttemptVerdict,
}

/// Result of one unit's retry loop. `final_inner` is the accepted candidate
/// or, after exhaustion, the unit's original content unchanged.
#[derive(Clone, Debug)]
pub struct UnitOutcome {
    pub final_inner: String,
    pub accepted: bool,
    pub attempts: Vec<AttemptRecord>,
}

impl UnitOutcome {
    pub fn hit_quota(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(a.verdict, AttemptVerdict::QuotaExhausted(_)))
    }
}

/// Bounded retry loop for one unit: call the backend, validate, accept or
/// retry; revert to the original content when every attempt fails. Pure
/// apart from the backend call; the attempt history carries everything the
/// caller needs to log, so nothing is reported from here.
pub fn rewrite_with_retry(
    backend: &dyn RewriteBackend,
    prompt: &str,
    original_inner: &str,
    max_attempts: usize,
) -> UnitOutcome {
    let max_attempts = max_attempts.max(1);
    let mut attempts: Vec<AttemptRecord> = Vec::new();

    for attempt in 1..=max_attempts {
        match backend.rewrite(prompt) {
            Ok(candidate) => match validate_rewrite(original_inner, &candidate) {
                Ok(()) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        output: Some(candidate.clone()),
                        verdict: AttemptVerdict::Accepted,
                    });
                    return UnitOutcome {
                        final_inner: candidate,
                        accepted: true,
                        attempts,
                    };
                }
                Err(reason) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        output: Some(candidate),
                        verdict: AttemptVerdict::Rejected(format!("{reason:#}")),
                    });
                }
            },
            Err(GenerationError::Quota(msg)) => {
                attempts.push(AttemptRecord {
                    attempt,
                    output: None,
                    verdict: AttemptVerdict::QuotaExhausted(msg),
                });
            }
            Err(GenerationError::Backend(msg)) => {
                attempts.push(AttemptRecord {
                    attempt,
                    output: None,
                    verdict: AttemptVerdict::Failed(msg),
                });
            }
        }
    }

    UnitOutcome {
        final_inner: original_inner.to_string(),
        accepted: false,
        attempts,
    }
}
