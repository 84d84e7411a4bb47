// Event types and structures
use auth_identity::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authority::CaseMembership;
use crate::topic::Topic;

/// Semantic event names; external notification dispatch keys off these
pub mod names {
    pub const CASE_CREATED: &str = "case.created";
    pub const CASE_STATUS_CHANGED: &str = "case.status_changed";
    pub const CASE_NURSE_ASSIGNED: &str = "case.nurse_assigned";
    pub const CASE_NURSE_REASSIGNED: &str = "case.nurse_reassigned";
    pub const CASE_EMERGENCY_ALERT: &str = "case.emergency_alert";
    pub const CASE_REVIEW_REQUESTED: &str = "case.review_requested";
    pub const CASE_OPEN_FOR_ASSIGNMENT: &str = "case.open_for_assignment";
    pub const LAB_ORDER_CREATED: &str = "lab_order.created";
    pub const LAB_ORDER_STATUS_CHANGED: &str = "lab_order.status_changed";
}

/// A delivered event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub topic: Topic,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, topic: Topic, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            topic,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Who a decided notification is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Audience {
    /// Case topic, the personal topic of every current participant, any extra
    /// users (e.g. a lab collector or a nurse just reassigned away) and `role:admin`
    Case {
        membership: CaseMembership,
        #[serde(default)]
        also: Vec<Uuid>,
    },
    Role { role: Role },
    User { user_id: Uuid },
}

impl Audience {
    pub fn case(membership: CaseMembership) -> Self {
        Audience::Case {
            membership,
            also: Vec::new(),
        }
    }

    pub fn role(role: Role) -> Self {
        Audience::Role { role }
    }

    pub fn user(user_id: Uuid) -> Self {
        Audience::User { user_id }
    }

    /// Topic recorded on the delivered event
    pub fn primary(&self) -> Topic {
        match self {
            Audience::Case { membership, .. } => Topic::Case(membership.case_id),
            Audience::Role { role } => Topic::Role(*role),
            Audience::User { user_id } => Topic::User(*user_id),
        }
    }

    /// All topics the event fans out to, primary first, without duplicates
    pub fn topics(&self) -> Vec<Topic> {
        match self {
            Audience::Case { membership, also } => {
                let mut topics = vec![Topic::Case(membership.case_id)];
                for user in membership.participants().into_iter().chain(also.iter().copied()) {
                    let topic = Topic::User(user);
                    if !topics.contains(&topic) {
                        topics.push(topic);
                    }
                }
                topics.push(Topic::Role(Role::Admin));
                topics
            }
            Audience::Role { .. } | Audience::User { .. } => vec![self.primary()],
        }
    }

    pub fn membership(&self) -> Option<&CaseMembership> {
        match self {
            Audience::Case { membership, .. } => Some(membership),
            _ => None,
        }
    }
}

/// An event decided by the workflow, dispatched only after its change commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    pub audience: Audience,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(name: impl Into<String>, audience: Audience, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            audience,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_audience_fans_out_to_participants_and_admins() {
        let membership = CaseMembership {
            case_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            nurse_id: Some(Uuid::new_v4()),
            doctor_id: None,
        };
        let former_nurse = Uuid::new_v4();
        let audience = Audience::Case {
            membership: membership.clone(),
            also: vec![former_nurse, membership.patient_id],
        };

        let topics = audience.topics();
        assert_eq!(topics.first(), Some(&Topic::Case(membership.case_id)));
        assert!(topics.contains(&Topic::User(membership.patient_id)));
        assert!(topics.contains(&Topic::User(former_nurse)));
        assert!(topics.contains(&Topic::Role(Role::Admin)));
        // patient listed twice, delivered once
        assert_eq!(topics.len(), 5);
    }
}
