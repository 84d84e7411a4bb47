use std::sync::Arc;

use async_trait::async_trait;
use auth_identity::{Actor, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{BusError, Result};

/// Current participants of a case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMembership {
    pub case_id: Uuid,
    pub patient_id: Uuid,
    pub nurse_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

impl CaseMembership {
    /// The single participation predicate shared by the HTTP layer and the
    /// real-time transport: admins, or the patient, nurse or doctor of the case
    pub fn admits(&self, actor: &Actor) -> bool {
        actor.role == Role::Admin || self.is_participant(actor.user_id)
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id
            || self.nurse_id == Some(user_id)
            || self.doctor_id == Some(user_id)
    }

    pub fn participants(&self) -> Vec<Uuid> {
        std::iter::once(self.patient_id)
            .chain(self.nurse_id)
            .chain(self.doctor_id)
            .collect()
    }
}

/// Reads case membership from the system of record
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn membership(&self, case_id: Uuid) -> Result<Option<CaseMembership>>;
}

/// Decides who may receive or cause events about a case
#[derive(Clone)]
pub struct SubscriptionAuthority {
    lookup: Arc<dyn MembershipLookup>,
}

impl SubscriptionAuthority {
    pub fn new(lookup: Arc<dyn MembershipLookup>) -> Self {
        Self { lookup }
    }

    /// Re-reads membership on every call; assignment may have changed since
    /// the connection last joined.
    pub async fn authorize_join(&self, actor: &Actor, case_id: Uuid) -> Result<()> {
        match self.lookup.membership(case_id).await? {
            Some(membership) if membership.admits(actor) => Ok(()),
            _ => {
                debug!(actor = %actor, case_id = %case_id, "Case topic join denied");
                Err(BusError::NotAParticipant { case_id })
            }
        }
    }

    pub async fn current_membership(&self, case_id: Uuid) -> Result<Option<CaseMembership>> {
        self.lookup.membership(case_id).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use dashmap::DashMap;

    /// Membership table for bus tests
    #[derive(Default)]
    pub struct StaticMembership {
        cases: DashMap<Uuid, CaseMembership>,
    }

    impl StaticMembership {
        pub fn put(&self, membership: CaseMembership) {
            self.cases.insert(membership.case_id, membership);
        }
    }

    #[async_trait]
    impl MembershipLookup for StaticMembership {
        async fn membership(&self, case_id: Uuid) -> Result<Option<CaseMembership>> {
            Ok(self.cases.get(&case_id).map(|entry| entry.value().clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticMembership;
    use super::*;

    fn membership() -> CaseMembership {
        CaseMembership {
            case_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            nurse_id: Some(Uuid::new_v4()),
            doctor_id: None,
        }
    }

    #[tokio::test]
    async fn test_participants_and_admins_may_join() {
        let lookup = Arc::new(StaticMembership::default());
        let case = membership();
        lookup.put(case.clone());
        let authority = SubscriptionAuthority::new(lookup);

        let patient = Actor::new(case.patient_id, Role::Patient);
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        assert!(authority.authorize_join(&patient, case.case_id).await.is_ok());
        assert!(authority.authorize_join(&admin, case.case_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_outsiders_are_denied() {
        let lookup = Arc::new(StaticMembership::default());
        let case = membership();
        lookup.put(case.clone());
        let authority = SubscriptionAuthority::new(lookup);

        let other_doctor = Actor::new(Uuid::new_v4(), Role::Doctor);
        let err = authority
            .authorize_join(&other_doctor, case.case_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_a_participant");

        // unknown cases look the same as foreign ones
        let err = authority
            .authorize_join(&other_doctor, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::NotAParticipant { .. }));
    }

    #[tokio::test]
    async fn test_membership_is_reread_after_reassignment() {
        let lookup = Arc::new(StaticMembership::default());
        let mut case = membership();
        lookup.put(case.clone());
        let authority = SubscriptionAuthority::new(lookup.clone());

        let former = Actor::new(case.nurse_id.unwrap(), Role::Nurse);
        assert!(authority.authorize_join(&former, case.case_id).await.is_ok());

        case.nurse_id = Some(Uuid::new_v4());
        lookup.put(case.clone());
        assert!(authority.authorize_join(&former, case.case_id).await.is_err());
    }

    #[test]
    fn test_role_alone_does_not_admit() {
        let case = membership();
        let nurse = Actor::new(Uuid::new_v4(), Role::Nurse);
        assert!(!case.admits(&nurse));
        assert_eq!(case.participants().len(), 2);
    }
}
