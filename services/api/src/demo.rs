use crate::infra::InMemoryStores;
use clap::Args;
use membership_lifecycle::config::{MembershipConfig, PaymentPolicyKind};
use membership_lifecycle::error::AppError;
use membership_lifecycle::workflows::membership::{
    ApplicationDraft, ApplicationEvent, ApplicationId, ApplicationRecord, BusinessCategoryId,
    FileChange, MembershipApplicationService, NewApplication, StoredContent, UserId,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Organisation number used for the demo applications.
    #[arg(long, default_value = "5560360793")]
    pub(crate) company_number: String,
    /// Number of evidence files attached to the application that gets rejected.
    #[arg(long, default_value_t = 3)]
    pub(crate) files: usize,
    /// Charge the applicant and use the ledger payment policy, showing a blocked accept.
    #[arg(long)]
    pub(crate) outstanding_charges: bool,
    /// Print final application status views as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn sample_application(
    user_id: UserId,
    company_number: &str,
    files: usize,
) -> NewApplication {
    NewApplication {
        user_id,
        draft: ApplicationDraft {
            first_name: "Ingrid".to_string(),
            last_name: "Holm".to_string(),
            company_number: company_number.to_string(),
            contact_email: "ingrid@holm-arkitekter.se".to_string(),
            business_category_ids: vec![BusinessCategoryId("architecture".to_string())],
            uploaded_files: (1..=files)
                .map(|index| FileChange::Create {
                    file_name: format!("portfolio-{index}.pdf"),
                    content: StoredContent {
                        storage_key: format!("demo/portfolio-{index}.pdf"),
                        content_type: "application/pdf".to_string(),
                        byte_size: 1_048_576,
                    },
                })
                .collect(),
        },
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        company_number,
        files,
        outstanding_charges,
        json,
    } = args;

    println!("Membership application lifecycle demo");

    let accepted = accept_scenario(&company_number, outstanding_charges)?;
    let rejected = reject_scenario(&company_number, files)?;
    member_scenario(&company_number)?;

    if json {
        for record in [&accepted, &rejected] {
            let view = record.status_view(Vec::new());
            match serde_json::to_string_pretty(&view) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => println!("(unable to render status view: {err})"),
            }
        }
    }

    Ok(())
}

fn accept_scenario(
    company_number: &str,
    outstanding_charges: bool,
) -> Result<ApplicationRecord, AppError> {
    println!("\n1. Pending application from a non-member is accepted");

    let stores = InMemoryStores::default();
    let policy = if outstanding_charges {
        PaymentPolicyKind::Ledger
    } else {
        PaymentPolicyKind::Waived
    };
    let service = stores.service(&MembershipConfig {
        payment_policy: policy,
    });

    let applicant = UserId("user-ingrid".to_string());
    stores.users.register(applicant.clone(), false);
    let record = service.create(sample_application(applicant.clone(), company_number, 0))?;
    print_available(&service, record.id())?;

    if outstanding_charges {
        stores.ledger.charge(&applicant, 2_500);
        match service.transition(record.id(), ApplicationEvent::Accept) {
            Ok(_) => println!("- accept went through despite outstanding charges"),
            Err(err) => println!("- accept blocked: {err}"),
        }
        stores.ledger.charge(&applicant, -2_500);
        println!("- membership fee settled");
    }

    let outcome = service.transition(record.id(), ApplicationEvent::Accept)?;
    println!("- {}: {} -> {}", outcome.event, outcome.from, outcome.to);
    println!(
        "- applicant is member: {}",
        stores.users.is_member(&applicant)
    );
    for company in stores.companies.companies() {
        println!(
            "- company {} created for {} ({})",
            company.id.0, company.company_number, company.email
        );
    }

    Ok(outcome.record)
}

fn reject_scenario(company_number: &str, files: usize) -> Result<ApplicationRecord, AppError> {
    println!("\n2. Application waiting for the applicant is rejected");

    let stores = InMemoryStores::default();
    let service = stores.service(&MembershipConfig::default());

    let applicant = UserId("user-oskar".to_string());
    stores.users.register(applicant.clone(), false);
    let record = service.create(sample_application(applicant, company_number, files))?;
    println!(
        "- submitted with {} uploaded file(s)",
        record.application.uploaded_files.len()
    );

    for event in [ApplicationEvent::AskApplicantForInfo, ApplicationEvent::Reject] {
        let outcome = service.transition(record.id(), event)?;
        println!("- {}: {} -> {}", outcome.event, outcome.from, outcome.to);
    }

    let stored = service.get(record.id())?;
    println!(
        "- files remaining: {} | stored content purged: {}",
        stored.application.uploaded_files.len(),
        stores.files.purged().join(", ")
    );

    Ok(stored)
}

fn member_scenario(company_number: &str) -> Result<(), AppError> {
    println!("\n3. Existing members are never asked for more information");

    let stores = InMemoryStores::default();
    let service = stores.service(&MembershipConfig::default());

    let applicant = UserId("user-maja".to_string());
    stores.users.register(applicant.clone(), true);
    let record = service.create(sample_application(applicant, company_number, 0))?;

    match service.transition(record.id(), ApplicationEvent::AskApplicantForInfo) {
        Ok(outcome) => println!("- unexpectedly moved to {}", outcome.to),
        Err(err) => println!("- {} ({})", err, err.kind()),
    }
    print_available(&service, record.id())?;

    Ok(())
}

fn print_available(
    service: &MembershipApplicationService,
    id: &ApplicationId,
) -> Result<(), AppError> {
    let view = service.status(id)?;
    let events: Vec<&str> = view
        .available_events
        .iter()
        .map(|event| event.name())
        .collect();
    println!(
        "- {} is {} | available events: {}",
        view.application_id.0,
        view.state,
        events.join(", ")
    );
    Ok(())
}
