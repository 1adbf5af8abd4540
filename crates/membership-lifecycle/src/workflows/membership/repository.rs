use serde::Serialize;

use super::domain::{
    ApplicationId, ApplicationState, Company, CompanyId, MembershipApplication, NewCompany,
    StoredContent, UploadedFileId, User, UserId,
};
use super::machine::ApplicationEvent;

/// Stored application together with its optimistic concurrency version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationRecord {
    pub application: MembershipApplication,
    pub version: u64,
}

impl ApplicationRecord {
    pub fn new(application: MembershipApplication) -> Self {
        Self {
            application,
            version: 0,
        }
    }

    pub fn id(&self) -> &ApplicationId {
        &self.application.id
    }

    pub fn status_view(&self, available_events: Vec<ApplicationEvent>) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.application.id.clone(),
            applicant: self.application.full_name(),
            company_number: self.application.company_number.clone(),
            state: self.application.state,
            company_id: self.application.company_id.clone(),
            uploaded_files: self.application.uploaded_files.len(),
            available_events,
            version: self.version,
        }
    }
}

/// Storage for application aggregates, including their owned files.
///
/// `update` must only succeed when the stored version equals `record.version`;
/// the stored copy then carries `record.version + 1` and is returned.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
}

pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn save(&self, user: &User) -> Result<(), RepositoryError>;
}

/// Companies are unique by company number; `create` returns
/// [`RepositoryError::Conflict`] when the number is already taken.
pub trait CompanyRepository: Send + Sync {
    fn find_by_number(&self, company_number: &str) -> Result<Option<Company>, RepositoryError>;
    fn create(&self, company: NewCompany) -> Result<Company, RepositoryError>;
}

/// Binary storage behind uploaded files.
pub trait UploadedFileStore: Send + Sync {
    /// Purge the stored content. Must be called before [`UploadedFileStore::delete`].
    fn clear_content(
        &self,
        file: &UploadedFileId,
        content: &StoredContent,
    ) -> Result<(), RepositoryError>;
    fn delete(&self, file: &UploadedFileId) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently (expected version {expected}, found {found})")]
    StaleVersion { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub applicant: String,
    pub company_number: String,
    pub state: ApplicationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
    pub uploaded_files: usize,
    pub available_events: Vec<ApplicationEvent>,
    pub version: u64,
}
