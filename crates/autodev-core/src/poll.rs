//! Bounded CI polling to a terminal aggregate.
//!
//! The only operation in the system that blocks for externally meaningful
//! time. Fully sequential: query, aggregate, sleep, repeat, until a
//! terminal state or the poll budget runs out. A cancellation token lets a
//! host process abort mid-sleep.

use tokio_util::sync::CancellationToken;

use crate::config::PollConfig;
use crate::domain::{aggregate_checks, AutodevError, CheckRun, CiState, Result};
use crate::forge::ForgeApi;

/// Outcome of one polling session for one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiPollOutcome {
    /// `Pending` here means the budget was exhausted without a terminal
    /// result: a timeout, distinct from a CI failure.
    pub state: CiState,

    /// The check runs behind the final aggregate; feeds retry feedback.
    pub runs: Vec<CheckRun>,

    pub polls_used: u32,
}

/// Re-query check status for `sha` until it aggregates to a terminal state
/// or `config.max_polls` queries have been spent.
pub async fn await_terminal<F: ForgeApi>(
    forge: &F,
    sha: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<CiPollOutcome> {
    let mut last_runs = Vec::new();

    for poll in 1..=config.max_polls {
        let runs = forge.get_check_status(sha).await?;
        let state = aggregate_checks(&runs);
        tracing::debug!(event = "ci.polled", sha = %sha, poll, state = ?state);

        if state != CiState::Pending {
            return Ok(CiPollOutcome {
                state,
                runs,
                polls_used: poll,
            });
        }
        last_runs = runs;

        if poll < config.max_polls {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AutodevError::Cancelled),
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
    }

    Ok(CiPollOutcome {
        state: CiState::Pending,
        runs: last_runs,
        polls_used: config.max_polls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckConclusion, CheckRun};
    use crate::fakes::FakeForge;
    use std::time::Duration;

    fn fast_config(max_polls: u32) -> PollConfig {
        PollConfig {
            max_polls,
            interval: Duration::from_secs(20),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_on_first_terminal_poll() {
        let forge = FakeForge::new();
        forge.script_checks(
            "sha-1",
            vec![vec![CheckRun::completed("tests", CheckConclusion::Success)]],
        );

        let outcome = await_terminal(
            &forge,
            "sha-1",
            &fast_config(30),
            &CancellationToken::new(),
        )
        .await
        .expect("poll");

        assert_eq!(outcome.state, CiState::Success);
        assert_eq!(outcome.polls_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_failure() {
        let forge = FakeForge::new();
        forge.script_checks(
            "sha-1",
            vec![
                vec![CheckRun::running("tests")],
                vec![CheckRun::running("tests")],
                vec![CheckRun::completed("tests", CheckConclusion::Failure)],
            ],
        );

        let outcome = await_terminal(
            &forge,
            "sha-1",
            &fast_config(30),
            &CancellationToken::new(),
        )
        .await
        .expect("poll");

        assert_eq!(outcome.state, CiState::Failure);
        assert_eq!(outcome.polls_used, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_is_pending() {
        let forge = FakeForge::new();
        // No script at all: the fake reports zero check runs forever.
        let outcome = await_terminal(
            &forge,
            "sha-1",
            &fast_config(30),
            &CancellationToken::new(),
        )
        .await
        .expect("poll");

        assert_eq!(outcome.state, CiState::Pending);
        assert_eq!(outcome.polls_used, 30);
        assert_eq!(forge.check_queries("sha-1"), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_mid_sleep() {
        let forge = FakeForge::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = await_terminal(&forge, "sha-1", &fast_config(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AutodevError::Cancelled));
        // The first query happened; the abort hit before the second.
        assert_eq!(forge.check_queries("sha-1"), 1);
    }
}
