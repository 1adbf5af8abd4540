use std::fmt;

use tracing::error;

use super::domain::{
    ApplicationId, ApplicationState, Company, MembershipApplication, NewCompany, UploadedFile,
    UploadedFileId,
};
use super::machine::PostAction;
use super::repository::{
    ApplicationRecord, ApplicationRepository, CompanyRepository, RepositoryError,
    UploadedFileStore, UserRepository,
};

/// Collaborators a post-action may write to.
#[derive(Clone, Copy)]
pub struct EffectContext<'a> {
    pub applications: &'a dyn ApplicationRepository,
    pub users: &'a dyn UserRepository,
    pub companies: &'a dyn CompanyRepository,
    pub files: &'a dyn UploadedFileStore,
}

/// Where inside a post-action a failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectStep {
    LoadUser,
    FlagMember,
    FindCompany,
    CreateCompany,
    LinkCompany,
    ClearFileContent(UploadedFileId),
    DeleteFile(UploadedFileId),
    SaveApplication,
}

impl fmt::Display for EffectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectStep::LoadUser => f.write_str("load user"),
            EffectStep::FlagMember => f.write_str("flag user as member"),
            EffectStep::FindCompany => f.write_str("find company"),
            EffectStep::CreateCompany => f.write_str("create company"),
            EffectStep::LinkCompany => f.write_str("link company"),
            EffectStep::ClearFileContent(id) => write!(f, "clear content of file {id}"),
            EffectStep::DeleteFile(id) => write!(f, "delete file {id}"),
            EffectStep::SaveApplication => f.write_str("save application"),
        }
    }
}

/// A post-action failed after the new state was already persisted.
///
/// The stored state and the related records may disagree; this needs manual
/// reconciliation rather than a retry, since the event may no longer be legal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{action} failed for application {application_id} in state {state} at step '{step}': {source}")]
pub struct SideEffectFailure {
    pub application_id: ApplicationId,
    pub action: PostAction,
    pub state: ApplicationState,
    pub step: EffectStep,
    pub source: RepositoryError,
}

impl SideEffectFailure {
    fn new(
        application: &MembershipApplication,
        action: PostAction,
        step: EffectStep,
        source: RepositoryError,
    ) -> Self {
        Self {
            application_id: application.id.clone(),
            action,
            state: application.state,
            step,
            source,
        }
    }
}

/// Run `action` against a freshly transitioned record, logging any failure.
pub fn run(
    action: PostAction,
    ctx: &EffectContext<'_>,
    record: ApplicationRecord,
) -> Result<ApplicationRecord, SideEffectFailure> {
    let result = match action {
        PostAction::AcceptMembership => accept_membership(ctx, record),
        PostAction::RejectMembership => reject_membership(ctx, record),
    };

    if let Err(failure) = &result {
        error!(
            application_id = %failure.application_id,
            action = %failure.action,
            state = %failure.state,
            step = %failure.step,
            error = %failure.source,
            "post-transition side effect failed; manual reconciliation required"
        );
    }

    result
}

/// Flag the applicant as a member, then find or create the company and link it.
///
/// The membership flag is not rolled back if a later step fails.
pub fn accept_membership(
    ctx: &EffectContext<'_>,
    mut record: ApplicationRecord,
) -> Result<ApplicationRecord, SideEffectFailure> {
    let action = PostAction::AcceptMembership;

    let mut user = ctx
        .users
        .find_by_id(&record.application.user_id)
        .and_then(|user| user.ok_or(RepositoryError::NotFound))
        .map_err(|source| {
            SideEffectFailure::new(&record.application, action, EffectStep::LoadUser, source)
        })?;
    user.is_member = true;
    ctx.users.save(&user).map_err(|source| {
        SideEffectFailure::new(&record.application, action, EffectStep::FlagMember, source)
    })?;

    let company = find_or_create_company(ctx.companies, &record.application)
        .map_err(|(step, source)| SideEffectFailure::new(&record.application, action, step, source))?;

    record.application.company_id = Some(company.id);
    ctx.applications.update(record.clone()).map_err(|source| {
        SideEffectFailure::new(&record.application, action, EffectStep::LinkCompany, source)
    })
}

fn find_or_create_company(
    companies: &dyn CompanyRepository,
    application: &MembershipApplication,
) -> Result<Company, (EffectStep, RepositoryError)> {
    let find = || {
        companies
            .find_by_number(&application.company_number)
            .map_err(|source| (EffectStep::FindCompany, source))
    };

    if let Some(existing) = find()? {
        return Ok(existing);
    }

    match companies.create(NewCompany {
        company_number: application.company_number.clone(),
        email: application.contact_email.clone(),
    }) {
        Ok(created) => Ok(created),
        // another acceptance created it between the lookup and the insert
        Err(RepositoryError::Conflict) => {
            find()?.ok_or((EffectStep::CreateCompany, RepositoryError::Conflict))
        }
        Err(source) => Err((EffectStep::CreateCompany, source)),
    }
}

/// Destroy every uploaded file (content first, then the record) and save.
///
/// On failure the record is re-saved listing only the files that survive,
/// so destroyed files never stay attached.
pub fn reject_membership(
    ctx: &EffectContext<'_>,
    mut record: ApplicationRecord,
) -> Result<ApplicationRecord, SideEffectFailure> {
    let action = PostAction::RejectMembership;

    let attached = std::mem::take(&mut record.application.uploaded_files);
    if let Err((survivors, step, source)) = destroy_files(ctx.files, attached) {
        record.application.uploaded_files = survivors;
        if let Err(save_error) = ctx.applications.update(record.clone()) {
            error!(
                application_id = %record.id(),
                error = %save_error,
                "failed to save surviving uploaded files after partial destruction"
            );
        }
        return Err(SideEffectFailure::new(
            &record.application,
            action,
            step,
            source,
        ));
    }

    ctx.applications.update(record.clone()).map_err(|source| {
        SideEffectFailure::new(&record.application, action, EffectStep::SaveApplication, source)
    })
}

/// Destroy `files` in order, stopping at the first failure.
///
/// The error carries the files still in existence: the one that failed,
/// followed by every file not yet attempted.
pub(crate) fn destroy_files(
    store: &dyn UploadedFileStore,
    files: Vec<UploadedFile>,
) -> Result<(), (Vec<UploadedFile>, EffectStep, RepositoryError)> {
    let mut remaining = files.into_iter();
    while let Some(mut file) = remaining.next() {
        if let Err((step, source)) = destroy_file(store, &mut file) {
            let survivors = std::iter::once(file).chain(remaining).collect();
            return Err((survivors, step, source));
        }
    }
    Ok(())
}

/// Clear the stored content of `file`, then delete its record.
fn destroy_file(
    files: &dyn UploadedFileStore,
    file: &mut UploadedFile,
) -> Result<(), (EffectStep, RepositoryError)> {
    if let Some(content) = file.content.take() {
        if let Err(source) = files.clear_content(&file.id, &content) {
            file.content = Some(content);
            return Err((EffectStep::ClearFileContent(file.id.clone()), source));
        }
    }

    files
        .delete(&file.id)
        .map_err(|source| (EffectStep::DeleteFile(file.id.clone()), source))
}
