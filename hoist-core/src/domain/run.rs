//! Pipeline run domain types
//!
//! A run is a linear state machine:
//!
//! ```text
//! Triggered -> Installing -> Testing -> Building -> Publishing -> Deploying -> Succeeded
//! ```
//!
//! with an absorbing `Failed` state reachable from every non-terminal state.
//! Entering `Failed` halts the run: the failing step is recorded as failed and
//! every step after it as skipped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FailureKind, PipelineError};

/// State of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Triggered,
    Installing,
    Testing,
    Building,
    Publishing,
    Deploying,
    Succeeded,
    Failed,
}

impl RunState {
    /// Whether the run has stopped for good
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// The state a run moves to when the current one completes successfully
    pub fn successor(self) -> Option<RunState> {
        match self {
            RunState::Triggered => Some(RunState::Installing),
            RunState::Installing => Some(RunState::Testing),
            RunState::Testing => Some(RunState::Building),
            RunState::Building => Some(RunState::Publishing),
            RunState::Publishing => Some(RunState::Deploying),
            RunState::Deploying => Some(RunState::Succeeded),
            RunState::Succeeded | RunState::Failed => None,
        }
    }

    /// The step executed while in this state
    pub fn step(self) -> Option<StepName> {
        match self {
            RunState::Installing => Some(StepName::Install),
            RunState::Testing => Some(StepName::Test),
            RunState::Building => Some(StepName::Build),
            RunState::Publishing => Some(StepName::Publish),
            RunState::Deploying => Some(StepName::Deploy),
            RunState::Triggered | RunState::Succeeded | RunState::Failed => None,
        }
    }

    /// Checks whether `to` is a legal next state
    pub fn can_transition_to(self, to: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == RunState::Failed || self.successor() == Some(to)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Triggered => "Triggered",
            RunState::Installing => "Installing",
            RunState::Testing => "Testing",
            RunState::Building => "Building",
            RunState::Publishing => "Publishing",
            RunState::Deploying => "Deploying",
            RunState::Succeeded => "Succeeded",
            RunState::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Named pipeline steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepName {
    Install,
    Test,
    Build,
    Publish,
    Deploy,
}

impl StepName {
    pub const ALL: [StepName; 5] = [
        StepName::Install,
        StepName::Test,
        StepName::Build,
        StepName::Publish,
        StepName::Deploy,
    ];

    /// The run state this step executes in
    pub fn state(self) -> RunState {
        match self {
            StepName::Install => RunState::Installing,
            StepName::Test => RunState::Testing,
            StepName::Build => RunState::Building,
            StepName::Publish => RunState::Publishing,
            StepName::Deploy => RunState::Deploying,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepName::Install => "install",
            StepName::Test => "test",
            StepName::Build => "build",
            StepName::Publish => "publish",
            StepName::Deploy => "deploy",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Record of a finished (or skipped) step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: StepName,
    pub status: StepStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The event that started a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Commit the run builds
    pub commit: String,

    /// Branch the commit was pushed to
    pub branch: String,

    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl Trigger {
    pub fn push(commit: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            branch: branch.into(),
            received_at: chrono::Utc::now(),
        }
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,

    /// Step that was executing (or about to execute) when the run failed
    pub step: Option<StepName>,

    pub message: String,
}

impl FailureReason {
    pub fn from_error(step: Option<StepName>, err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            step,
            message: err.to_string(),
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid run transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: RunState,
}

/// One end-to-end execution of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub trigger: Trigger,
    pub state: RunState,
    /// Terminal records, in step order
    pub steps: Vec<StepRecord>,
    pub failure: Option<FailureReason>,
    /// Immutable image reference, once published
    pub image: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip)]
    step_started_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PipelineRun {
    /// Creates a run in the `Triggered` state
    pub fn new(trigger: Trigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            state: RunState::Triggered,
            steps: Vec::new(),
            failure: None,
            image: None,
            created_at: chrono::Utc::now(),
            finished_at: None,
            step_started_at: None,
        }
    }

    /// Moves to the next state in the chain
    ///
    /// Leaving a step state records that step as succeeded. Returns the new
    /// state.
    pub fn advance(&mut self) -> Result<RunState, InvalidTransition> {
        let next = self.state.successor().ok_or(InvalidTransition {
            from: self.state,
            to: self.state,
        })?;

        let now = chrono::Utc::now();
        if let Some(step) = self.state.step() {
            self.steps.push(StepRecord {
                name: step,
                status: StepStatus::Succeeded,
                started_at: self.step_started_at.take(),
                finished_at: Some(now),
            });
        }

        self.state = next;
        if next.step().is_some() {
            self.step_started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }

        Ok(next)
    }

    /// Moves to `Failed`
    ///
    /// The step in progress (if any) is recorded as failed and every later
    /// step as skipped.
    pub fn fail(&mut self, reason: FailureReason) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(RunState::Failed) {
            return Err(InvalidTransition {
                from: self.state,
                to: RunState::Failed,
            });
        }

        let now = chrono::Utc::now();
        let current = self.state.step();
        if let Some(step) = current {
            self.steps.push(StepRecord {
                name: step,
                status: StepStatus::Failed,
                started_at: self.step_started_at.take(),
                finished_at: Some(now),
            });
        }

        let first_skipped = self.steps.len();
        for step in StepName::ALL.into_iter().skip(first_skipped) {
            self.steps.push(StepRecord {
                name: step,
                status: StepStatus::Skipped,
                started_at: None,
                finished_at: None,
            });
        }

        self.state = RunState::Failed;
        self.failure = Some(reason);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Shorthand for failing with an error raised by the current step
    pub fn fail_with(&mut self, err: &PipelineError) -> Result<(), InvalidTransition> {
        let reason = FailureReason::from_error(self.state.step(), err);
        self.fail(reason)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn step_status(&self, name: StepName) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.name == name).map(|s| s.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> PipelineRun {
        PipelineRun::new(Trigger::push("abc123", "main"))
    }

    #[test]
    fn test_new_run_is_triggered() {
        let run = run();
        assert_eq!(run.state, RunState::Triggered);
        assert!(run.steps.is_empty());
        assert!(!run.is_terminal());
    }

    #[test]
    fn test_full_chain_reaches_succeeded() {
        let mut run = run();
        let mut visited = vec![run.state];
        while !run.is_terminal() {
            visited.push(run.advance().unwrap());
        }

        assert_eq!(
            visited,
            vec![
                RunState::Triggered,
                RunState::Installing,
                RunState::Testing,
                RunState::Building,
                RunState::Publishing,
                RunState::Deploying,
                RunState::Succeeded,
            ]
        );
        assert_eq!(run.steps.len(), 5);
        assert!(run.steps.iter().all(|s| s.status == StepStatus::Succeeded));
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut run = run();
        while !run.is_terminal() {
            run.advance().unwrap();
        }
        assert!(run.advance().is_err());
        assert!(
            run.fail_with(&PipelineError::Connect("late".to_string()))
                .is_err()
        );
        assert_eq!(run.state, RunState::Succeeded);
    }

    #[test]
    fn test_failure_skips_remaining_steps() {
        let mut run = run();
        run.advance().unwrap(); // Installing
        run.advance().unwrap(); // Testing

        let err = PipelineError::Build {
            step: StepName::Test,
            message: "npm test exited with 1".to_string(),
        };
        run.fail_with(&err).unwrap();

        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.step_status(StepName::Install), Some(StepStatus::Succeeded));
        assert_eq!(run.step_status(StepName::Test), Some(StepStatus::Failed));
        assert_eq!(run.step_status(StepName::Build), Some(StepStatus::Skipped));
        assert_eq!(run.step_status(StepName::Publish), Some(StepStatus::Skipped));
        assert_eq!(run.step_status(StepName::Deploy), Some(StepStatus::Skipped));

        let failure = run.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Build);
        assert_eq!(failure.step, Some(StepName::Test));
    }

    #[test]
    fn test_failure_before_first_step_skips_everything() {
        let mut run = run();
        run.fail_with(&PipelineError::Cancelled(StepName::Install))
            .unwrap();

        assert_eq!(run.steps.len(), 5);
        assert!(run.steps.iter().all(|s| s.status == StepStatus::Skipped));
        assert_eq!(run.failure.unwrap().kind, FailureKind::Cancelled);
    }

    #[test]
    fn test_can_transition_to() {
        assert!(RunState::Triggered.can_transition_to(RunState::Installing));
        assert!(RunState::Building.can_transition_to(RunState::Failed));
        assert!(!RunState::Triggered.can_transition_to(RunState::Building));
        assert!(!RunState::Deploying.can_transition_to(RunState::Installing));
        assert!(!RunState::Failed.can_transition_to(RunState::Failed));
    }

    #[test]
    fn test_step_state_mapping_is_consistent() {
        for step in StepName::ALL {
            assert_eq!(step.state().step(), Some(step));
        }
    }
}
