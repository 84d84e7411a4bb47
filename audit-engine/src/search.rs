// Audit lookups
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::{AuditEntry, EntityType};

/// Supported audit lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum AuditQuery {
    Entity { entity_type: EntityType, entity_id: Uuid },
    Actor { actor_id: Uuid },
}

impl AuditQuery {
    pub fn entity(entity_type: EntityType, entity_id: Uuid) -> Self {
        AuditQuery::Entity { entity_type, entity_id }
    }

    pub fn actor(actor_id: Uuid) -> Self {
        AuditQuery::Actor { actor_id }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        match self {
            AuditQuery::Entity { entity_type, entity_id } => {
                entry.entity_type == *entity_type && entry.entity_id == *entity_id
            }
            AuditQuery::Actor { actor_id } => entry.actor_id == *actor_id,
        }
    }

    /// Filter a slice of records, returned in commit order
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a AuditEntry>) -> Vec<AuditEntry> {
        let mut matched: Vec<AuditEntry> = entries
            .into_iter()
            .filter(|entry| self.matches(entry))
            .cloned()
            .collect();
        matched.sort_by_key(|entry| entry.sequence);
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AuditAction, NewAuditEntry};
    use auth_identity::{Actor, Role};

    #[test]
    fn test_query_by_entity_and_actor() {
        let nurse = Actor::new(Uuid::new_v4(), Role::Nurse);
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        let case_a = Uuid::new_v4();
        let case_b = Uuid::new_v4();

        let entries = vec![
            NewAuditEntry::new(admin, AuditAction::NurseAssigned, EntityType::Case, case_a).commit(2),
            NewAuditEntry::new(nurse, AuditAction::CaseTransitioned, EntityType::Case, case_a).commit(3),
            NewAuditEntry::new(nurse, AuditAction::CaseTransitioned, EntityType::Case, case_b).commit(1),
        ];

        let by_case = AuditQuery::entity(EntityType::Case, case_a).apply(&entries);
        assert_eq!(by_case.len(), 2);
        assert_eq!(by_case[0].sequence, 2);

        let by_nurse = AuditQuery::actor(nurse.user_id).apply(&entries);
        assert_eq!(by_nurse.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 3]);
    }
}
