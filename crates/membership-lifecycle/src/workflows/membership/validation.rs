use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use super::domain::MembershipApplication;
use super::organisation_number::{OrganisationNumberCheck, SwedishOrganisationNumber};

pub const FIRST_NAME: &str = "firstName";
pub const LAST_NAME: &str = "lastName";
pub const COMPANY_NUMBER: &str = "companyNumber";
pub const CONTACT_EMAIL: &str = "contactEmail";
pub const UPLOADED_FILES: &str = "uploadedFiles";
pub const USER: &str = "user";

pub const COMPANY_NUMBER_LENGTH: usize = 10;

/// `local@domain.tld`, compiled once for every default validator.
static BASIC_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([^@\s]+)@((?:[-a-z0-9]+\.)+[a-z]{2,})$").expect("basic email pattern")
});

/// Field name to human readable messages, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn on(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &[String])> + '_ {
        self.fields
            .iter()
            .map(|(field, messages)| (*field, messages.as_slice()))
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field} {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Which write the validator is guarding. The email format only applies to
/// creates and updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationContext {
    Create,
    Update,
    Other,
}

/// Contact email pattern. The default only demands `local@domain.tld`.
#[derive(Debug, Clone)]
pub struct EmailFormat {
    pattern: Regex,
}

impl EmailFormat {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn basic() -> Self {
        Self {
            pattern: BASIC_EMAIL.clone(),
        }
    }

    pub fn matches(&self, email: &str) -> bool {
        self.pattern.is_match(email)
    }
}

impl Default for EmailFormat {
    fn default() -> Self {
        Self::basic()
    }
}

/// Field rules checked before an application is created or updated.
#[derive(Clone)]
pub struct Validator {
    email: EmailFormat,
    organisation_numbers: Arc<dyn OrganisationNumberCheck>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(EmailFormat::basic(), Arc::new(SwedishOrganisationNumber))
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(email: EmailFormat, organisation_numbers: Arc<dyn OrganisationNumberCheck>) -> Self {
        Self {
            email,
            organisation_numbers,
        }
    }

    pub fn validate(
        &self,
        application: &MembershipApplication,
        context: ValidationContext,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        for (field, value) in [
            (FIRST_NAME, &application.first_name),
            (LAST_NAME, &application.last_name),
            (COMPANY_NUMBER, &application.company_number),
            (CONTACT_EMAIL, &application.contact_email),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "can't be blank");
            }
        }

        if application.company_number.chars().count() != COMPANY_NUMBER_LENGTH {
            errors.add(
                COMPANY_NUMBER,
                format!("is the wrong length (should be {COMPANY_NUMBER_LENGTH} characters)"),
            );
        }

        if matches!(context, ValidationContext::Create | ValidationContext::Update)
            && !self.email.matches(&application.contact_email)
        {
            errors.add(CONTACT_EMAIL, "is invalid");
        }

        if !self
            .organisation_numbers
            .is_valid(&application.company_number)
        {
            errors.add(
                COMPANY_NUMBER,
                format!(
                    "{} is not a valid organisation number",
                    application.company_number
                ),
            );
        }

        errors.into_result()
    }
}
