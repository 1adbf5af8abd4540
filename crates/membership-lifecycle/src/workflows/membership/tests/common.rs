use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::workflows::membership::domain::{
    ApplicationDraft, ApplicationId, ApplicationState, BusinessCategoryId, Company, CompanyId,
    FileChange, MembershipApplication, NewApplication, NewCompany, StoredContent,
    UploadedFileId, User, UserId,
};
use crate::workflows::membership::payment::ChargeLedger;
use crate::workflows::membership::repository::{
    ApplicationRecord, ApplicationRepository, CompanyRepository, RepositoryError,
    UploadedFileStore, UserRepository,
};
use crate::workflows::membership::validation::{EmailFormat, Validator};
use crate::workflows::membership::{
    membership_router, Collaborators, MembershipApplicationService,
};

/// Valid Swedish organisation number (checksum and group digit).
pub(super) const ORG_NUMBER: &str = "5560360793";

pub(super) fn applicant() -> UserId {
    UserId("user-applicant".to_string())
}

pub(super) fn content(name: &str) -> StoredContent {
    StoredContent {
        storage_key: format!("uploads/{name}"),
        content_type: "application/pdf".to_string(),
        byte_size: 2048,
    }
}

pub(super) fn draft() -> ApplicationDraft {
    ApplicationDraft {
        first_name: "Astrid".to_string(),
        last_name: "Lindqvist".to_string(),
        company_number: ORG_NUMBER.to_string(),
        contact_email: "astrid@lindqvist-design.se".to_string(),
        business_category_ids: vec![
            BusinessCategoryId("graphic-design".to_string()),
            BusinessCategoryId("print".to_string()),
        ],
        uploaded_files: Vec::new(),
    }
}

pub(super) fn new_application() -> NewApplication {
    NewApplication {
        user_id: applicant(),
        draft: draft(),
    }
}

pub(super) fn new_application_with_files(count: usize) -> NewApplication {
    let mut request = new_application();
    request.draft.uploaded_files = (1..=count)
        .map(|index| FileChange::Create {
            file_name: format!("evidence-{index}.pdf"),
            content: content(&format!("evidence-{index}.pdf")),
        })
        .collect();
    request
}

/// Validator that accepts any organisation number, for scenarios about the lifecycle only.
pub(super) fn permissive_validator() -> Validator {
    Validator::new(EmailFormat::basic(), Arc::new(|_: &str| true))
}

/// Application sitting in `state`, built without going through the service.
pub(super) fn application_in(state: ApplicationState) -> MembershipApplication {
    let mut application = MembershipApplication::from_new(
        ApplicationId(format!("app-{}", state.label())),
        &new_application(),
        chrono::Utc::now(),
    );
    application.state = state;
    application
}

pub(super) struct Harness {
    pub(super) service: MembershipApplicationService,
    pub(super) applications: Arc<MemoryApplications>,
    pub(super) users: Arc<MemoryUsers>,
    pub(super) companies: Arc<MemoryCompanies>,
    pub(super) files: Arc<MemoryFiles>,
}

impl Harness {
    pub(super) fn configure(
        mut self,
        configure: impl FnOnce(MembershipApplicationService) -> MembershipApplicationService,
    ) -> Self {
        self.service = configure(self.service);
        self
    }

    pub(super) fn stored(&self, id: &ApplicationId) -> ApplicationRecord {
        self.applications
            .fetch(id)
            .expect("fetch succeeds")
            .expect("record present")
    }

    pub(super) fn seed(&self, application: MembershipApplication) -> ApplicationId {
        let id = application.id.clone();
        self.applications
            .insert(ApplicationRecord::new(application))
            .expect("seed insert");
        id
    }
}

pub(super) fn build_service() -> Harness {
    build_service_with(Arc::new(MemoryCompanies::default()))
}

pub(super) fn build_service_with(companies: Arc<MemoryCompanies>) -> Harness {
    let applications = Arc::new(MemoryApplications::default());
    let users = Arc::new(MemoryUsers::with_user(applicant(), false));
    let files = Arc::new(MemoryFiles::default());
    let service = MembershipApplicationService::new(
        applications.clone(),
        Collaborators {
            users: users.clone(),
            companies: companies.clone(),
            files: files.clone(),
        },
    );

    Harness {
        service,
        applications,
        users,
        companies,
        files,
    }
}

#[derive(Default)]
pub(super) struct MemoryApplications {
    records: Mutex<HashMap<ApplicationId, ApplicationRecord>>,
}

impl ApplicationRepository for MemoryApplications {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn update(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let current = guard.get(record.id()).ok_or(RepositoryError::NotFound)?;
        if current.version != record.version {
            return Err(RepositoryError::StaleVersion {
                expected: record.version,
                found: current.version,
            });
        }
        record.version += 1;
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

/// Simulates a concurrent writer: the first fetch is followed by another
/// update before the caller gets to write.
#[derive(Default)]
pub(super) struct RacingApplications {
    pub(super) inner: MemoryApplications,
    raced: AtomicBool,
}

impl ApplicationRepository for RacingApplications {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.update(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let fetched = self.inner.fetch(id)?;
        if let Some(record) = &fetched {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.update(record.clone())?;
            }
        }
        Ok(fetched)
    }
}

#[derive(Default)]
pub(super) struct MemoryUsers {
    users: Mutex<HashMap<UserId, User>>,
}

impl MemoryUsers {
    pub(super) fn with_user(id: UserId, is_member: bool) -> Self {
        let users = Self::default();
        users.put(User { id, is_member });
        users
    }

    pub(super) fn put(&self, user: User) {
        self.users
            .lock()
            .expect("user mutex poisoned")
            .insert(user.id.clone(), user);
    }

    pub(super) fn is_member(&self, id: &UserId) -> bool {
        self.users
            .lock()
            .expect("user mutex poisoned")
            .get(id)
            .is_some_and(|user| user.is_member)
    }
}

impl UserRepository for MemoryUsers {
    fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.lock().expect("user mutex poisoned").get(id).cloned())
    }

    fn save(&self, user: &User) -> Result<(), RepositoryError> {
        self.put(user.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryCompanies {
    companies: Mutex<Vec<Company>>,
    unavailable: AtomicBool,
}

impl MemoryCompanies {
    pub(super) fn with_company(company_number: &str, email: &str) -> Self {
        let companies = Self::default();
        companies
            .companies
            .lock()
            .expect("company mutex poisoned")
            .push(Company {
                id: CompanyId("company-existing".to_string()),
                company_number: company_number.to_string(),
                email: email.to_string(),
            });
        companies
    }

    pub(super) fn offline() -> Self {
        let companies = Self::default();
        companies.unavailable.store(true, Ordering::SeqCst);
        companies
    }

    pub(super) fn all(&self) -> Vec<Company> {
        self.companies.lock().expect("company mutex poisoned").clone()
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("company registry offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl CompanyRepository for MemoryCompanies {
    fn find_by_number(&self, company_number: &str) -> Result<Option<Company>, RepositoryError> {
        self.check_available()?;
        let guard = self.companies.lock().expect("company mutex poisoned");
        Ok(guard
            .iter()
            .find(|company| company.company_number == company_number)
            .cloned())
    }

    fn create(&self, company: NewCompany) -> Result<Company, RepositoryError> {
        self.check_available()?;
        let mut guard = self.companies.lock().expect("company mutex poisoned");
        if guard
            .iter()
            .any(|existing| existing.company_number == company.company_number)
        {
            return Err(RepositoryError::Conflict);
        }
        let created = Company {
            id: CompanyId(format!("company-{}", guard.len() + 1)),
            company_number: company.company_number,
            email: company.email,
        };
        guard.push(created.clone());
        Ok(created)
    }
}

/// Storage operations observed by [`MemoryFiles`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum FileOperation {
    Cleared(UploadedFileId, String),
    Deleted(UploadedFileId),
}

#[derive(Default)]
pub(super) struct MemoryFiles {
    operations: Mutex<Vec<FileOperation>>,
    // deletes still allowed before the store starts failing them
    delete_budget: Mutex<Option<usize>>,
    fail_clears: AtomicBool,
}

impl MemoryFiles {
    pub(super) fn operations(&self) -> Vec<FileOperation> {
        self.operations.lock().expect("file mutex poisoned").clone()
    }

    pub(super) fn fail_deletes(&self) {
        self.fail_deletes_after(0);
    }

    pub(super) fn fail_deletes_after(&self, allowed: usize) {
        *self.delete_budget.lock().expect("file mutex poisoned") = Some(allowed);
    }

    pub(super) fn fail_clears(&self) {
        self.fail_clears.store(true, Ordering::SeqCst);
    }
}

impl UploadedFileStore for MemoryFiles {
    fn clear_content(
        &self,
        file: &UploadedFileId,
        content: &StoredContent,
    ) -> Result<(), RepositoryError> {
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("blob storage offline".to_string()));
        }
        self.operations
            .lock()
            .expect("file mutex poisoned")
            .push(FileOperation::Cleared(
                file.clone(),
                content.storage_key.clone(),
            ));
        Ok(())
    }

    fn delete(&self, file: &UploadedFileId) -> Result<(), RepositoryError> {
        if let Some(allowed) = self.delete_budget.lock().expect("file mutex poisoned").as_mut() {
            if *allowed == 0 {
                return Err(RepositoryError::Unavailable("file store read only".to_string()));
            }
            *allowed -= 1;
        }
        self.operations
            .lock()
            .expect("file mutex poisoned")
            .push(FileOperation::Deleted(file.clone()));
        Ok(())
    }
}

/// Ledger with the same balance for every user.
pub(super) struct FixedLedger(pub(super) i64);

impl ChargeLedger for FixedLedger {
    fn outstanding_charges(&self, _user: &UserId) -> Result<i64, RepositoryError> {
        Ok(self.0)
    }
}

pub(super) fn router_for(harness: Harness) -> axum::Router {
    membership_router(Arc::new(harness.service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
