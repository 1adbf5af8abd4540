//! Transition table and interpreter for the application lifecycle.
//!
//! ```text
//!                    askApplicantForInfo
//!   pending ───────────────────────────────▶ waitingForApplicant
//!     ▲ │ ◀─────────────────────────────────       │
//!     │ │        cancelWaitingForApplicant         │ reject
//!     │ │ accept                                   ▼
//!     │ └──────────▶ accepted ──── reject ────▶ rejected
//!     │                 ▲                          │
//!     │                 └──────── accept ──────────┘
//!     └──── applicantUpdatedInfo (from any state)
//! ```
//!
//! Every legal move is a row in [`TRANSITIONS`]. A request is resolved by
//! looking up the row for `(current state, event)` and checking its guards;
//! the state is only written once both succeed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::ApplicationState;
use ApplicationState::{Accepted, Pending, Rejected, WaitingForApplicant};

/// Events a caller may request against an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplicationEvent {
    Reject,
    Accept,
    AskApplicantForInfo,
    CancelWaitingForApplicant,
    ApplicantUpdatedInfo,
}

impl ApplicationEvent {
    pub const ALL: [ApplicationEvent; 5] = [
        ApplicationEvent::Reject,
        ApplicationEvent::Accept,
        ApplicationEvent::AskApplicantForInfo,
        ApplicationEvent::CancelWaitingForApplicant,
        ApplicationEvent::ApplicantUpdatedInfo,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ApplicationEvent::Reject => "reject",
            ApplicationEvent::Accept => "accept",
            ApplicationEvent::AskApplicantForInfo => "askApplicantForInfo",
            ApplicationEvent::CancelWaitingForApplicant => "cancelWaitingForApplicant",
            ApplicationEvent::ApplicantUpdatedInfo => "applicantUpdatedInfo",
        }
    }
}

impl fmt::Display for ApplicationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event '{0}'")]
pub struct UnknownEvent(pub String);

impl FromStr for ApplicationEvent {
    type Err = UnknownEvent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ApplicationEvent::ALL
            .into_iter()
            .find(|event| event.name() == value.trim())
            .ok_or_else(|| UnknownEvent(value.to_string()))
    }
}

/// Preconditions a transition may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Guard {
    /// The applicant has no outstanding charges.
    Paid,
    /// The applicant's user is not already a member.
    NotAMember,
}

impl Guard {
    pub const fn name(self) -> &'static str {
        match self {
            Guard::Paid => "isPaid",
            Guard::NotAMember => "notAMember",
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Side effect run after the state write of a transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PostAction {
    AcceptMembership,
    RejectMembership,
}

impl PostAction {
    pub const fn name(self) -> &'static str {
        match self {
            PostAction::AcceptMembership => "acceptMembership",
            PostAction::RejectMembership => "rejectMembership",
        }
    }
}

impl fmt::Display for PostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the transition table.
#[derive(Debug, PartialEq, Eq)]
pub struct Transition {
    pub event: ApplicationEvent,
    pub from: &'static [ApplicationState],
    pub guards: &'static [Guard],
    pub to: ApplicationState,
    pub after: Option<PostAction>,
}

impl Transition {
    pub fn permits(&self, state: ApplicationState) -> bool {
        self.from.contains(&state)
    }
}

pub static TRANSITIONS: [Transition; 5] = [
    Transition {
        event: ApplicationEvent::Reject,
        from: &[Pending, WaitingForApplicant, Accepted],
        guards: &[],
        to: Rejected,
        after: Some(PostAction::RejectMembership),
    },
    // `rejected` is a source so a mistaken rejection can be corrected.
    Transition {
        event: ApplicationEvent::Accept,
        from: &[Pending, Rejected],
        guards: &[Guard::Paid, Guard::NotAMember],
        to: Accepted,
        after: Some(PostAction::AcceptMembership),
    },
    Transition {
        event: ApplicationEvent::AskApplicantForInfo,
        from: &[Pending, Rejected],
        guards: &[Guard::NotAMember],
        to: WaitingForApplicant,
        after: None,
    },
    Transition {
        event: ApplicationEvent::CancelWaitingForApplicant,
        from: &[WaitingForApplicant],
        guards: &[],
        to: Pending,
        after: None,
    },
    Transition {
        event: ApplicationEvent::ApplicantUpdatedInfo,
        from: &[Accepted, Rejected, WaitingForApplicant, Pending],
        guards: &[Guard::NotAMember],
        to: Pending,
        after: None,
    },
];

/// Row for `(state, event)`, if the event is listed for that state.
pub fn transition_for(
    state: ApplicationState,
    event: ApplicationEvent,
) -> Option<&'static Transition> {
    TRANSITIONS
        .iter()
        .find(|transition| transition.event == event && transition.permits(state))
}

/// Events listed for `state`, without evaluating guards.
pub fn permitted_events(state: ApplicationState) -> Vec<ApplicationEvent> {
    TRANSITIONS
        .iter()
        .filter(|transition| transition.permits(state))
        .map(|transition| transition.event)
        .collect()
}

/// Guard answers captured for one transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub paid: bool,
    pub member: bool,
}

impl GuardSnapshot {
    pub fn holds(&self, guard: Guard) -> bool {
        match guard {
            Guard::Paid => self.paid,
            Guard::NotAMember => !self.member,
        }
    }
}

/// Raised when an event is not listed for the current state or a guard fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRejected {
    pub event: ApplicationEvent,
    pub state: ApplicationState,
    pub failed_guard: Option<Guard>,
}

impl fmt::Display for TransitionRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failed_guard {
            Some(guard) => write!(
                f,
                "cannot {} application in state {}: guard {} failed",
                self.event, self.state, guard
            ),
            None => write!(
                f,
                "cannot {} application in state {}",
                self.event, self.state
            ),
        }
    }
}

impl std::error::Error for TransitionRejected {}

/// Resolve `event` from `state`, returning the row to execute.
pub fn fire(
    state: ApplicationState,
    event: ApplicationEvent,
    guards: &GuardSnapshot,
) -> Result<&'static Transition, TransitionRejected> {
    let transition = transition_for(state, event).ok_or(TransitionRejected {
        event,
        state,
        failed_guard: None,
    })?;

    if let Some(failed) = transition
        .guards
        .iter()
        .copied()
        .find(|guard| !guards.holds(*guard))
    {
        return Err(TransitionRejected {
            event,
            state,
            failed_guard: Some(failed),
        });
    }

    Ok(transition)
}

/// Audit entry appended to the application on every successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub event: ApplicationEvent,
    pub from: ApplicationState,
    pub to: ApplicationState,
    pub at: DateTime<Utc>,
}
