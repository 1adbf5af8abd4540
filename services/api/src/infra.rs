use metrics_exporter_prometheus::PrometheusHandle;
use membership_lifecycle::config::{MembershipConfig, PaymentPolicyKind};
use membership_lifecycle::workflows::membership::{
    ApplicationId, ApplicationRecord, ApplicationRepository, ChargeLedger, Collaborators, Company,
    CompanyId, CompanyRepository, MembershipApplicationService, NewCompany,
    OutstandingChargesPolicy, RepositoryError, StoredContent, UploadedFileId, UploadedFileStore,
    User, UserId, UserRepository,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
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
        let found = guard
            .get(record.id())
            .map(|current| current.version)
            .ok_or(RepositoryError::NotFound)?;
        if found != record.version {
            return Err(RepositoryError::StaleVersion {
                expected: record.version,
                found,
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

#[derive(Default, Clone)]
pub(crate) struct InMemoryUserDirectory {
    users: Arc<Mutex<HashMap<UserId, User>>>,
}

impl InMemoryUserDirectory {
    pub(crate) fn register(&self, id: UserId, is_member: bool) {
        let mut guard = self.users.lock().expect("user mutex poisoned");
        guard.insert(id.clone(), User { id, is_member });
    }

    pub(crate) fn is_member(&self, id: &UserId) -> bool {
        let guard = self.users.lock().expect("user mutex poisoned");
        guard.get(id).is_some_and(|user| user.is_member)
    }
}

impl UserRepository for InMemoryUserDirectory {
    fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let guard = self.users.lock().expect("user mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn save(&self, user: &User) -> Result<(), RepositoryError> {
        let mut guard = self.users.lock().expect("user mutex poisoned");
        guard.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCompanyRegistry {
    companies: Arc<Mutex<Vec<Company>>>,
}

impl InMemoryCompanyRegistry {
    pub(crate) fn companies(&self) -> Vec<Company> {
        self.companies.lock().expect("company mutex poisoned").clone()
    }
}

impl CompanyRepository for InMemoryCompanyRegistry {
    fn find_by_number(&self, company_number: &str) -> Result<Option<Company>, RepositoryError> {
        let guard = self.companies.lock().expect("company mutex poisoned");
        Ok(guard
            .iter()
            .find(|company| company.company_number == company_number)
            .cloned())
    }

    fn create(&self, company: NewCompany) -> Result<Company, RepositoryError> {
        let mut guard = self.companies.lock().expect("company mutex poisoned");
        if guard
            .iter()
            .any(|existing| existing.company_number == company.company_number)
        {
            return Err(RepositoryError::Conflict);
        }
        let created = Company {
            id: CompanyId(format!("company-{:04}", guard.len() + 1)),
            company_number: company.company_number,
            email: company.email,
        };
        guard.push(created.clone());
        Ok(created)
    }
}

/// File store that only records which stored content it was asked to purge.
#[derive(Default, Clone)]
pub(crate) struct InMemoryFileStore {
    purged: Arc<Mutex<Vec<String>>>,
}

impl InMemoryFileStore {
    pub(crate) fn purged(&self) -> Vec<String> {
        self.purged.lock().expect("file mutex poisoned").clone()
    }
}

impl UploadedFileStore for InMemoryFileStore {
    fn clear_content(
        &self,
        file: &UploadedFileId,
        content: &StoredContent,
    ) -> Result<(), RepositoryError> {
        debug!(file_id = %file, storage_key = %content.storage_key, "clearing stored content");
        let mut guard = self.purged.lock().expect("file mutex poisoned");
        guard.push(content.storage_key.clone());
        Ok(())
    }

    fn delete(&self, file: &UploadedFileId) -> Result<(), RepositoryError> {
        debug!(file_id = %file, "deleting uploaded file record");
        Ok(())
    }
}

/// Outstanding balances keyed by user, in minor currency units.
#[derive(Default, Clone)]
pub(crate) struct InMemoryChargeLedger {
    balances: Arc<Mutex<HashMap<UserId, i64>>>,
}

impl InMemoryChargeLedger {
    pub(crate) fn charge(&self, user: &UserId, amount: i64) {
        let mut guard = self.balances.lock().expect("ledger mutex poisoned");
        *guard.entry(user.clone()).or_default() += amount;
    }
}

impl ChargeLedger for InMemoryChargeLedger {
    fn outstanding_charges(&self, user: &UserId) -> Result<i64, RepositoryError> {
        let guard = self.balances.lock().expect("ledger mutex poisoned");
        Ok(guard.get(user).copied().unwrap_or_default())
    }
}

/// Every in-memory collaborator the service needs, kept together so the
/// demo can inspect them after running transitions.
#[derive(Default, Clone)]
pub(crate) struct InMemoryStores {
    pub(crate) applications: InMemoryApplicationRepository,
    pub(crate) users: InMemoryUserDirectory,
    pub(crate) companies: InMemoryCompanyRegistry,
    pub(crate) files: InMemoryFileStore,
    pub(crate) ledger: InMemoryChargeLedger,
}

impl InMemoryStores {
    pub(crate) fn service(&self, config: &MembershipConfig) -> MembershipApplicationService {
        let service = MembershipApplicationService::new(
            Arc::new(self.applications.clone()),
            Collaborators {
                users: Arc::new(self.users.clone()),
                companies: Arc::new(self.companies.clone()),
                files: Arc::new(self.files.clone()),
            },
        );

        match config.payment_policy {
            PaymentPolicyKind::Waived => service,
            PaymentPolicyKind::Ledger => service.with_payment_policy(Arc::new(
                OutstandingChargesPolicy::new(self.ledger.clone()),
            )),
        }
    }
}
