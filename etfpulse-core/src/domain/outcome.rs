//! Terminal result of one item's attempt sequence.

/// Either the payload from the first successful attempt, or the last error
/// message once the attempt budget ran out (or the run was cancelled).
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Success { payload: T, attempts: u32 },
    Failure { message: String, attempts: u32 },
}

impl<T> FetchOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    /// Number of fetch invocations that produced this outcome.
    pub fn attempts(&self) -> u32 {
        match self {
            FetchOutcome::Success { attempts, .. } | FetchOutcome::Failure { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Success { payload, attempts } => FetchOutcome::Success {
                payload: f(payload),
                attempts,
            },
            FetchOutcome::Failure { message, attempts } => {
                FetchOutcome::Failure { message, attempts }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_reported_for_both_variants() {
        let ok: FetchOutcome<u8> = FetchOutcome::Success { payload: 1, attempts: 2 };
        let err: FetchOutcome<u8> = FetchOutcome::Failure {
            message: "boom".into(),
            attempts: 3,
        };
        assert!(ok.is_success());
        assert!(!err.is_success());
        assert_eq!(ok.attempts(), 2);
        assert_eq!(err.attempts(), 3);
    }

    #[test]
    fn map_keeps_attempt_count() {
        let ok: FetchOutcome<u8> = FetchOutcome::Success { payload: 4, attempts: 1 };
        assert_eq!(
            ok.map(|v| v * 2),
            FetchOutcome::Success { payload: 8, attempts: 1 }
        );
    }
}
