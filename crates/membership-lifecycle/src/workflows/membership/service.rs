use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::{
    ApplicationDraft, ApplicationId, ApplicationState, MembershipApplication, NewApplication,
    UploadedFile, UploadedFileId,
};
use super::effects::{self, EffectContext, SideEffectFailure};
use super::machine::{
    self, permitted_events, ApplicationEvent, GuardSnapshot, Transition, TransitionRejected,
    UnknownEvent,
};
use super::payment::{ChargesWaived, PaymentPolicy};
use super::repository::{
    ApplicationRecord, ApplicationRepository, ApplicationStatusView, CompanyRepository,
    RepositoryError, UploadedFileStore, UserRepository,
};
use super::validation::{ValidationContext, ValidationErrors, Validator, UPLOADED_FILES, USER};

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static FILE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("mapp-{id:06}"))
}

fn next_file_id() -> UploadedFileId {
    let id = FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    UploadedFileId(format!("file-{id:06}"))
}

/// External records the lifecycle reads and writes besides the application itself.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserRepository>,
    pub companies: Arc<dyn CompanyRepository>,
    pub files: Arc<dyn UploadedFileStore>,
}

/// Service composing the validator, the transition table, and the side effects.
pub struct MembershipApplicationService {
    applications: Arc<dyn ApplicationRepository>,
    collaborators: Collaborators,
    payments: Arc<dyn PaymentPolicy>,
    validator: Validator,
}

/// Result of a committed transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub event: ApplicationEvent,
    pub from: ApplicationState,
    pub to: ApplicationState,
    pub record: ApplicationRecord,
}

impl MembershipApplicationService {
    pub fn new(applications: Arc<dyn ApplicationRepository>, collaborators: Collaborators) -> Self {
        Self {
            applications,
            collaborators,
            payments: Arc::new(ChargesWaived),
            validator: Validator::default(),
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_payment_policy(mut self, payments: Arc<dyn PaymentPolicy>) -> Self {
        self.payments = payments;
        self
    }

    /// Validate and store a new application in the `pending` state.
    pub fn create(
        &self,
        request: NewApplication,
    ) -> Result<ApplicationRecord, MembershipServiceError> {
        let mut application =
            MembershipApplication::from_new(next_application_id(), &request, Utc::now());

        let mut errors = self.field_errors(&application, ValidationContext::Create);
        if self.collaborators.users.find_by_id(&request.user_id)?.is_none() {
            errors.add(USER, "must exist");
        }
        for id in application.unknown_file_references(&request.draft.uploaded_files) {
            errors.add(UPLOADED_FILES, format!("unknown file {id}"));
        }
        errors.into_result()?;

        application.apply_file_changes(&request.draft.uploaded_files, next_file_id);
        let stored = self.applications.insert(ApplicationRecord::new(application))?;

        info!(
            application_id = %stored.id(),
            user_id = %stored.application.user_id,
            files = stored.application.uploaded_files.len(),
            "membership application submitted"
        );
        Ok(stored)
    }

    /// Edit the applicant fields and files. The state is left untouched.
    pub fn update(
        &self,
        application_id: &ApplicationId,
        draft: ApplicationDraft,
    ) -> Result<ApplicationRecord, MembershipServiceError> {
        let mut record = self.get(application_id)?;
        let detached = self.stage_edits(&mut record, &draft)?;

        let stored = self.applications.update(record)?;
        self.purge_files(stored, detached)
    }

    /// Apply the applicant's edits and move the application back to `pending`
    /// in a single save.
    pub fn resubmit(
        &self,
        application_id: &ApplicationId,
        draft: ApplicationDraft,
    ) -> Result<TransitionOutcome, MembershipServiceError> {
        let mut record = self.get(application_id)?;
        let transition = self.resolve(&record, ApplicationEvent::ApplicantUpdatedInfo)?;
        let detached = self.stage_edits(&mut record, &draft)?;

        let mut outcome = self.execute(record, transition)?;
        outcome.record = self.purge_files(outcome.record, detached)?;
        Ok(outcome)
    }

    /// Fire `event` against the stored application.
    pub fn transition(
        &self,
        application_id: &ApplicationId,
        event: ApplicationEvent,
    ) -> Result<TransitionOutcome, MembershipServiceError> {
        let record = self.get(application_id)?;
        let transition = self.resolve(&record, event)?;
        self.execute(record, transition)
    }

    /// Fire an event given by name, as received from a transport.
    pub fn dispatch(
        &self,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome, MembershipServiceError> {
        let event = request.event_name.parse::<ApplicationEvent>()?;
        self.transition(&request.application_id, event)
    }

    pub fn invoke(&self, request: &TransitionRequest) -> TransitionResponse {
        TransitionResponse::from_result(&self.dispatch(request))
    }

    pub fn get(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, MembershipServiceError> {
        let record = self
            .applications
            .fetch(application_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    /// Events that would currently succeed, guards included.
    pub fn available_events(
        &self,
        record: &ApplicationRecord,
    ) -> Result<Vec<ApplicationEvent>, MembershipServiceError> {
        let guards = self.guard_snapshot(&record.application)?;
        Ok(permitted_events(record.application.state)
            .into_iter()
            .filter(|event| machine::fire(record.application.state, *event, &guards).is_ok())
            .collect())
    }

    pub fn status(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationStatusView, MembershipServiceError> {
        let record = self.get(application_id)?;
        let events = self.available_events(&record)?;
        Ok(record.status_view(events))
    }

    fn field_errors(
        &self,
        application: &MembershipApplication,
        context: ValidationContext,
    ) -> ValidationErrors {
        self.validator
            .validate(application, context)
            .err()
            .unwrap_or_default()
    }

    /// Copy `draft` onto the record and validate it, returning the files its
    /// delete commands detached.
    fn stage_edits(
        &self,
        record: &mut ApplicationRecord,
        draft: &ApplicationDraft,
    ) -> Result<Vec<UploadedFile>, MembershipServiceError> {
        record.application.assign_fields(draft);

        let mut errors = self.field_errors(&record.application, ValidationContext::Update);
        for id in record
            .application
            .unknown_file_references(&draft.uploaded_files)
        {
            errors.add(UPLOADED_FILES, format!("unknown file {id}"));
        }
        errors.into_result()?;

        Ok(record
            .application
            .apply_file_changes(&draft.uploaded_files, next_file_id))
    }

    /// Destroy files detached by an edit. Files that could not be destroyed
    /// are attached to `stored` again so their content is never orphaned.
    fn purge_files(
        &self,
        mut stored: ApplicationRecord,
        detached: Vec<UploadedFile>,
    ) -> Result<ApplicationRecord, MembershipServiceError> {
        let files = self.collaborators.files.as_ref();
        let Err((survivors, step, source)) = effects::destroy_files(files, detached) else {
            return Ok(stored);
        };

        error!(
            application_id = %stored.id(),
            step = %step,
            error = %source,
            "failed to purge detached uploaded file"
        );
        stored.application.uploaded_files.extend(survivors);
        if let Err(save_error) = self.applications.update(stored.clone()) {
            error!(
                application_id = %stored.id(),
                error = %save_error,
                "failed to reattach undestroyed uploaded files"
            );
        }
        Err(source.into())
    }

    fn guard_snapshot(
        &self,
        application: &MembershipApplication,
    ) -> Result<GuardSnapshot, RepositoryError> {
        let member = self
            .collaborators
            .users
            .find_by_id(&application.user_id)?
            .is_some_and(|user| user.is_member);
        let paid = self.payments.is_paid(application)?;
        Ok(GuardSnapshot { paid, member })
    }

    fn resolve(
        &self,
        record: &ApplicationRecord,
        event: ApplicationEvent,
    ) -> Result<&'static Transition, MembershipServiceError> {
        let guards = self.guard_snapshot(&record.application)?;
        machine::fire(record.application.state, event, &guards).map_err(|rejected| {
            warn!(
                application_id = %record.id(),
                event = %rejected.event,
                state = %rejected.state,
                guard = ?rejected.failed_guard.map(|guard| guard.name()),
                "transition rejected"
            );
            MembershipServiceError::from(rejected)
        })
    }

    /// Write the destination state, persist, then run the post-action.
    fn execute(
        &self,
        mut record: ApplicationRecord,
        transition: &'static Transition,
    ) -> Result<TransitionOutcome, MembershipServiceError> {
        let from = record.application.state;
        record.application.enter(transition, Utc::now());
        let mut stored = self.applications.update(record)?;

        if let Some(action) = transition.after {
            stored = effects::run(action, &self.effect_context(), stored)?;
        }

        info!(
            application_id = %stored.id(),
            event = %transition.event,
            from = %from,
            to = %transition.to,
            version = stored.version,
            "application transitioned"
        );

        Ok(TransitionOutcome {
            event: transition.event,
            from,
            to: transition.to,
            record: stored,
        })
    }

    fn effect_context(&self) -> EffectContext<'_> {
        EffectContext {
            applications: self.applications.as_ref(),
            users: self.collaborators.users.as_ref(),
            companies: self.collaborators.companies.as_ref(),
            files: self.collaborators.files.as_ref(),
        }
    }
}

/// Transition invocation as received from a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub application_id: ApplicationId,
    pub event_name: String,
}

/// `{ok: true, newState}` or `{ok: false, errorKind, detail}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<ApplicationState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TransitionResponse {
    pub fn from_result(result: &Result<TransitionOutcome, MembershipServiceError>) -> Self {
        match result {
            Ok(outcome) => Self {
                ok: true,
                new_state: Some(outcome.to),
                error_kind: None,
                detail: None,
            },
            Err(error) => Self {
                ok: false,
                new_state: None,
                error_kind: Some(error.kind()),
                detail: Some(error.public_detail()),
            },
        }
    }
}

/// Error raised by the membership application service.
#[derive(Debug, thiserror::Error)]
pub enum MembershipServiceError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    TransitionRejected(#[from] TransitionRejected),
    #[error(transparent)]
    SideEffectFailed(#[from] SideEffectFailure),
    #[error(transparent)]
    UnknownEvent(#[from] UnknownEvent),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl MembershipServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            MembershipServiceError::Validation(_) => "validationFailed",
            MembershipServiceError::TransitionRejected(_) => "transitionRejected",
            MembershipServiceError::SideEffectFailed(_) => "sideEffectFailed",
            MembershipServiceError::UnknownEvent(_) => "unknownEvent",
            MembershipServiceError::Repository(RepositoryError::NotFound) => "notFound",
            MembershipServiceError::Repository(
                RepositoryError::Conflict | RepositoryError::StaleVersion { .. },
            ) => "conflict",
            MembershipServiceError::Repository(RepositoryError::Unavailable(_)) => {
                "repositoryUnavailable"
            }
        }
    }

    /// Message safe to hand back to callers. Side-effect failures are reported
    /// generically; the full context is in the logs.
    pub fn public_detail(&self) -> String {
        match self {
            MembershipServiceError::SideEffectFailed(failure) => format!(
                "operation failed after application {} moved to {}; manual reconciliation required",
                failure.application_id, failure.state
            ),
            other => other.to_string(),
        }
    }
}
