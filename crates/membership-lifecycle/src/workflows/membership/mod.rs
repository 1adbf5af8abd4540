//! Membership application lifecycle: intake validation, the guarded state
//! machine, and the side effects of accepting or rejecting an applicant.
//!
//! Persistence and file storage are reached only through the traits in
//! [`repository`]; the organisation-number rule and the `isPaid` guard are
//! injected strategies.

pub mod domain;
pub mod effects;
pub mod machine;
pub mod organisation_number;
pub mod payment;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationDraft, ApplicationId, ApplicationState, BusinessCategoryId, Company, CompanyId,
    FileChange, MembershipApplication, NewApplication, NewCompany, StoredContent, UploadedFile,
    UploadedFileId, User, UserId,
};
pub use effects::{EffectStep, SideEffectFailure};
pub use machine::{
    ApplicationEvent, Guard, GuardSnapshot, PostAction, Transition, TransitionRecord,
    TransitionRejected, UnknownEvent, TRANSITIONS,
};
pub use organisation_number::{OrganisationNumberCheck, SwedishOrganisationNumber};
pub use payment::{ChargeLedger, ChargesWaived, OutstandingChargesPolicy, PaymentPolicy};
pub use repository::{
    ApplicationRecord, ApplicationRepository, ApplicationStatusView, CompanyRepository,
    RepositoryError, UploadedFileStore, UserRepository,
};
pub use router::membership_router;
pub use service::{
    Collaborators, MembershipApplicationService, MembershipServiceError, TransitionOutcome,
    TransitionRequest, TransitionResponse,
};
pub use validation::{EmailFormat, ValidationContext, ValidationErrors, Validator};
