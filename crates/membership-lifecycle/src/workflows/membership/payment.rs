use super::domain::{MembershipApplication, UserId};
use super::repository::RepositoryError;

/// Decides the `isPaid` guard for an application.
pub trait PaymentPolicy: Send + Sync {
    fn is_paid(&self, application: &MembershipApplication) -> Result<bool, RepositoryError>;
}

/// Treats every applicant as settled. Matches the behaviour of the current
/// membership office, which does not bill applicants before acceptance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChargesWaived;

impl PaymentPolicy for ChargesWaived {
    fn is_paid(&self, _application: &MembershipApplication) -> Result<bool, RepositoryError> {
        Ok(true)
    }
}

/// Source of the applicant's outstanding balance, in minor currency units.
pub trait ChargeLedger: Send + Sync {
    fn outstanding_charges(&self, user: &UserId) -> Result<i64, RepositoryError>;
}

/// Settled when the ledger reports no outstanding balance.
#[derive(Debug, Clone)]
pub struct OutstandingChargesPolicy<L> {
    ledger: L,
}

impl<L> OutstandingChargesPolicy<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }
}

impl<L> PaymentPolicy for OutstandingChargesPolicy<L>
where
    L: ChargeLedger,
{
    fn is_paid(&self, application: &MembershipApplication) -> Result<bool, RepositoryError> {
        Ok(self.ledger.outstanding_charges(&application.user_id)? <= 0)
    }
}
