use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::machine::{ApplicationEvent, Transition, TransitionRecord};

/// Identifier wrapper for membership applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier of the applicant's user account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UploadedFileId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusinessCategoryId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UploadedFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state stored on every application. There is no terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplicationState {
    #[default]
    Pending,
    WaitingForApplicant,
    Accepted,
    Rejected,
}

impl ApplicationState {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationState::Pending => "pending",
            ApplicationState::WaitingForApplicant => "waitingForApplicant",
            ApplicationState::Accepted => "accepted",
            ApplicationState::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference to binary content held by the file storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContent {
    pub storage_key: String,
    pub content_type: String,
    pub byte_size: u64,
}

/// Evidence attached to an application. Owned by the application aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: UploadedFileId,
    pub file_name: String,
    pub content: Option<StoredContent>,
}

/// Nested write command for the uploaded files of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum FileChange {
    #[serde(rename_all = "camelCase")]
    Create {
        file_name: String,
        content: StoredContent,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        id: UploadedFileId,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        content: Option<StoredContent>,
    },
    Delete { id: UploadedFileId },
}

/// Applicant-editable fields, shared by create and update requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDraft {
    pub first_name: String,
    pub last_name: String,
    pub company_number: String,
    pub contact_email: String,
    #[serde(default)]
    pub business_category_ids: Vec<BusinessCategoryId>,
    #[serde(default)]
    pub uploaded_files: Vec<FileChange>,
}

/// Create request: the draft plus the applicant submitting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub user_id: UserId,
    #[serde(flatten)]
    pub draft: ApplicationDraft,
}

/// The membership application aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipApplication {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub company_number: String,
    pub contact_email: String,
    pub state: ApplicationState,
    pub company_id: Option<CompanyId>,
    pub business_categories: BTreeSet<BusinessCategoryId>,
    pub uploaded_files: Vec<UploadedFile>,
    pub submitted_at: DateTime<Utc>,
    pub transitions: Vec<TransitionRecord>,
}

impl MembershipApplication {
    /// Build a fresh `pending` application from a create request. File commands
    /// are not applied here; see [`MembershipApplication::apply_file_changes`].
    pub fn from_new(
        id: ApplicationId,
        request: &NewApplication,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let draft = &request.draft;
        Self {
            id,
            user_id: request.user_id.clone(),
            first_name: draft.first_name.clone(),
            last_name: draft.last_name.clone(),
            company_number: draft.company_number.clone(),
            contact_email: draft.contact_email.clone(),
            state: ApplicationState::Pending,
            company_id: None,
            business_categories: draft.business_category_ids.iter().cloned().collect(),
            uploaded_files: Vec::new(),
            submitted_at,
            transitions: Vec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Copy the draft's scalar fields and categories onto the application.
    pub fn assign_fields(&mut self, draft: &ApplicationDraft) {
        self.first_name = draft.first_name.clone();
        self.last_name = draft.last_name.clone();
        self.company_number = draft.company_number.clone();
        self.contact_email = draft.contact_email.clone();
        self.business_categories = draft.business_category_ids.iter().cloned().collect();
    }

    /// File ids referenced by update/delete commands that this application does not own.
    pub fn unknown_file_references<'a>(&self, changes: &'a [FileChange]) -> Vec<&'a UploadedFileId> {
        changes
            .iter()
            .filter_map(|change| match change {
                FileChange::Update { id, .. } | FileChange::Delete { id } => Some(id),
                FileChange::Create { .. } => None,
            })
            .filter(|id| !self.uploaded_files.iter().any(|file| &file.id == *id))
            .collect()
    }

    /// Apply nested file commands, returning the files detached by `Delete`.
    ///
    /// Callers must check [`MembershipApplication::unknown_file_references`] first; commands
    /// naming a file this application does not own are skipped.
    pub fn apply_file_changes(
        &mut self,
        changes: &[FileChange],
        mut next_file_id: impl FnMut() -> UploadedFileId,
    ) -> Vec<UploadedFile> {
        let mut detached = Vec::new();
        for change in changes {
            match change {
                FileChange::Create { file_name, content } => {
                    self.uploaded_files.push(UploadedFile {
                        id: next_file_id(),
                        file_name: file_name.clone(),
                        content: Some(content.clone()),
                    });
                }
                FileChange::Update {
                    id,
                    file_name,
                    content,
                } => {
                    if let Some(file) = self.uploaded_files.iter_mut().find(|file| &file.id == id) {
                        if let Some(name) = file_name {
                            file.file_name = name.clone();
                        }
                        if let Some(content) = content {
                            file.content = Some(content.clone());
                        }
                    }
                }
                FileChange::Delete { id } => {
                    if let Some(position) =
                        self.uploaded_files.iter().position(|file| &file.id == id)
                    {
                        detached.push(self.uploaded_files.remove(position));
                    }
                }
            }
        }
        detached
    }

    /// Write the destination state of `transition` and append it to the history.
    pub(crate) fn enter(&mut self, transition: &Transition, at: DateTime<Utc>) {
        let from = self.state;
        self.state = transition.to;
        self.transitions.push(TransitionRecord {
            event: transition.event,
            from,
            to: transition.to,
            at,
        });
    }

    /// Whether the application ever reached `accepted`.
    pub fn has_been_accepted(&self) -> bool {
        self.state == ApplicationState::Accepted
            || self
                .transitions
                .iter()
                .any(|record| record.event == ApplicationEvent::Accept)
    }
}

/// Applicant account, referenced but not owned by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub is_member: bool,
}

/// Company record keyed by its organisation number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub company_number: String,
    pub email: String,
}

/// Attributes needed to create a company on first acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompany {
    pub company_number: String,
    pub email: String,
}
