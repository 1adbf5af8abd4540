use crate::workflows::membership::domain::ApplicationState::{
    self, Accepted, Pending, Rejected, WaitingForApplicant,
};
use crate::workflows::membership::machine::{
    fire, permitted_events, transition_for, ApplicationEvent, Guard, GuardSnapshot, PostAction,
    TransitionRejected, TRANSITIONS,
};

const STATES: [ApplicationState; 4] = [Pending, WaitingForApplicant, Accepted, Rejected];

const APPLICANT: GuardSnapshot = GuardSnapshot {
    paid: true,
    member: false,
};

const MEMBER: GuardSnapshot = GuardSnapshot {
    paid: true,
    member: true,
};

#[test]
fn reject_is_legal_from_every_state_but_rejected() {
    for state in [Pending, WaitingForApplicant, Accepted] {
        let transition = fire(state, ApplicationEvent::Reject, &MEMBER).expect("reject allowed");
        assert_eq!(transition.to, Rejected);
        assert_eq!(transition.after, Some(PostAction::RejectMembership));
    }

    assert_eq!(
        fire(Rejected, ApplicationEvent::Reject, &APPLICANT),
        Err(TransitionRejected {
            event: ApplicationEvent::Reject,
            state: Rejected,
            failed_guard: None,
        })
    );
}

#[test]
fn accept_requires_payment_and_non_membership() {
    for paid in [true, false] {
        for member in [true, false] {
            let guards = GuardSnapshot { paid, member };
            let result = fire(Pending, ApplicationEvent::Accept, &guards);
            assert_eq!(result.is_ok(), paid && !member, "paid={paid} member={member}");
        }
    }
}

#[test]
fn accept_reports_first_failing_guard_in_table_order() {
    let unpaid_member = GuardSnapshot {
        paid: false,
        member: true,
    };

    let rejected = fire(Pending, ApplicationEvent::Accept, &unpaid_member).unwrap_err();
    assert_eq!(rejected.failed_guard, Some(Guard::Paid));

    let rejected = fire(Pending, ApplicationEvent::Accept, &MEMBER).unwrap_err();
    assert_eq!(rejected.failed_guard, Some(Guard::NotAMember));
}

#[test]
fn accept_can_correct_a_rejection_but_not_repeat() {
    let transition = fire(Rejected, ApplicationEvent::Accept, &APPLICANT).expect("correction");
    assert_eq!(transition.to, Accepted);

    let rejected = fire(Accepted, ApplicationEvent::Accept, &APPLICANT).unwrap_err();
    assert_eq!(rejected.failed_guard, None);
    assert_eq!(rejected.state, Accepted);

    assert!(fire(WaitingForApplicant, ApplicationEvent::Accept, &APPLICANT).is_err());
}

#[test]
fn members_are_never_asked_for_more_information() {
    for state in STATES {
        assert!(
            fire(state, ApplicationEvent::AskApplicantForInfo, &MEMBER).is_err(),
            "asked member in {state}"
        );
    }

    for state in [Pending, Rejected] {
        let transition =
            fire(state, ApplicationEvent::AskApplicantForInfo, &APPLICANT).expect("ask allowed");
        assert_eq!(transition.to, WaitingForApplicant);
        assert_eq!(transition.after, None);
    }
}

#[test]
fn cancel_waiting_only_leaves_waiting_state() {
    for state in STATES {
        let result = fire(state, ApplicationEvent::CancelWaitingForApplicant, &MEMBER);
        match state {
            WaitingForApplicant => assert_eq!(result.expect("cancel").to, Pending),
            _ => assert!(result.is_err(), "cancel allowed from {state}"),
        }
    }
}

#[test]
fn applicant_update_returns_any_state_to_pending() {
    for state in STATES {
        let transition = fire(state, ApplicationEvent::ApplicantUpdatedInfo, &APPLICANT)
            .expect("update from any state");
        assert_eq!(transition.to, Pending);
    }

    let rejected = fire(Accepted, ApplicationEvent::ApplicantUpdatedInfo, &MEMBER).unwrap_err();
    assert_eq!(rejected.failed_guard, Some(Guard::NotAMember));
}

#[test]
fn every_table_row_is_unique_per_state_and_event() {
    for state in STATES {
        for event in ApplicationEvent::ALL {
            let rows = TRANSITIONS
                .iter()
                .filter(|row| row.event == event && row.permits(state))
                .count();
            assert!(rows <= 1, "{event} from {state} has {rows} rows");
        }
    }
}

#[test]
fn permitted_events_follow_table_order() {
    assert_eq!(
        permitted_events(Pending),
        vec![
            ApplicationEvent::Reject,
            ApplicationEvent::Accept,
            ApplicationEvent::AskApplicantForInfo,
            ApplicationEvent::ApplicantUpdatedInfo,
        ]
    );
    assert_eq!(
        permitted_events(WaitingForApplicant),
        vec![
            ApplicationEvent::Reject,
            ApplicationEvent::CancelWaitingForApplicant,
            ApplicationEvent::ApplicantUpdatedInfo,
        ]
    );
    assert!(transition_for(Accepted, ApplicationEvent::AskApplicantForInfo).is_none());
}

#[test]
fn event_names_parse_and_unknown_names_fail() {
    let parsed: ApplicationEvent = "askApplicantForInfo".parse().expect("known event");
    assert_eq!(parsed, ApplicationEvent::AskApplicantForInfo);

    let error = "approve".parse::<ApplicationEvent>().unwrap_err();
    assert_eq!(error.to_string(), "unknown event 'approve'");
}

#[test]
fn rejection_message_names_event_state_and_guard() {
    let rejected = fire(Pending, ApplicationEvent::Accept, &MEMBER).unwrap_err();

    assert_eq!(
        rejected.to_string(),
        "cannot accept application in state pending: guard notAMember failed"
    );
}
