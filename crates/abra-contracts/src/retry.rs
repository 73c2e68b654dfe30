use std::time::Duration;

use crate::error::AbraError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// `attempt` is 1-based: the first send is attempt 1.
    Attempting { attempt: u32 },
    Exhausted { attempts: u32 },
}

#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep for `delay`, then send again as attempt `attempt`.
    Retry { attempt: u32, delay: Duration },
    /// Surface this error to the caller.
    Fail(AbraError),
}

/// Drives one `prompt` call through its attempts.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting { attempt: 1 },
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Decides what to do after an exchange failed with `err`. Non-retryable
    /// errors pass straight through without touching the state.
    pub fn on_failure(&mut self, err: AbraError) -> RetryDecision {
        if !err.is_retryable() {
            return RetryDecision::Fail(err);
        }
        match self.state {
            RetryState::Attempting { attempt } if attempt <= self.policy.max_retries => {
                let next = attempt + 1;
                self.state = RetryState::Attempting { attempt: next };
                RetryDecision::Retry {
                    attempt: next,
                    delay: self.policy.backoff,
                }
            }
            RetryState::Attempting { attempt } => {
                self.state = RetryState::Exhausted { attempts: attempt };
                RetryDecision::Fail(AbraError::RetriesExhausted { attempts: attempt })
            }
            RetryState::Exhausted { attempts } => {
                RetryDecision::Fail(AbraError::RetriesExhausted { attempts })
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = RetryState::Attempting { attempt: 1 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn default_policy_retries_three_times() {
        let mut controller = RetryController::new(RetryPolicy::default());
        let mut retries = 0;
        loop {
            match controller.on_failure(AbraError::NoTerminalResponse) {
                RetryDecision::Retry { delay, .. } => {
                    assert_eq!(delay, Duration::from_secs(3));
                    retries += 1;
                }
                RetryDecision::Fail(err) => {
                    assert!(matches!(err, AbraError::RetriesExhausted { attempts: 4 }));
                    break;
                }
            }
        }
        assert_eq!(retries, 3);
        assert_eq!(controller.state(), RetryState::Exhausted { attempts: 4 });
    }

    #[test]
    fn retry_numbers_attempts_from_two() {
        let mut controller = RetryController::new(policy(2));
        match controller.on_failure(AbraError::stream_start("boom")) {
            RetryDecision::Retry { attempt, delay } => {
                assert_eq!(attempt, 2);
                assert_eq!(delay, Duration::from_millis(5));
            }
            RetryDecision::Fail(err) => panic!("unexpected failure: {err}"),
        }
    }

    #[test]
    fn zero_ceiling_fails_on_first_error() {
        let mut controller = RetryController::new(policy(0));
        assert!(matches!(
            controller.on_failure(AbraError::NoTerminalResponse),
            RetryDecision::Fail(AbraError::RetriesExhausted { attempts: 1 })
        ));
    }

    #[test]
    fn fatal_errors_pass_through() {
        let mut controller = RetryController::new(policy(3));
        assert!(matches!(
            controller.on_failure(AbraError::region_blocked()),
            RetryDecision::Fail(AbraError::RegionBlocked { .. })
        ));
        assert_eq!(controller.state(), RetryState::Attempting { attempt: 1 });
    }

    #[test]
    fn exhausted_stays_exhausted_until_reset() {
        let mut controller = RetryController::new(policy(0));
        let _ = controller.on_failure(AbraError::NoTerminalResponse);
        assert!(matches!(
            controller.on_failure(AbraError::NoTerminalResponse),
            RetryDecision::Fail(AbraError::RetriesExhausted { attempts: 1 })
        ));
        controller.reset();
        assert_eq!(controller.state(), RetryState::Attempting { attempt: 1 });
    }
}
