use std::fmt;
use std::str::FromStr;

use auth_identity::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BusError;

/// Addressable destination of an event
///
/// Serialized as its display form, e.g. `case:0b9e...` or `role:doctor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    User(Uuid),
    Role(Role),
    Case(Uuid),
}

impl Topic {
    pub fn case_id(&self) -> Option<Uuid> {
        match self {
            Topic::Case(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::User(id) => write!(f, "user:{id}"),
            Topic::Role(role) => write!(f, "role:{role}"),
            Topic::Case(id) => write!(f, "case:{id}"),
        }
    }
}

impl FromStr for Topic {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BusError::InvalidTopic(s.to_string());
        let (kind, value) = s.split_once(':').ok_or_else(invalid)?;
        match kind {
            "user" => Uuid::parse_str(value).map(Topic::User).map_err(|_| invalid()),
            "case" => Uuid::parse_str(value).map(Topic::Case).map_err(|_| invalid()),
            "role" => value.parse::<Role>().map(Topic::Role).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = BusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_display_and_parse() {
        let id = Uuid::new_v4();
        let topic = Topic::Case(id);
        assert_eq!(topic.to_string(), format!("case:{id}"));
        assert_eq!(topic.to_string().parse::<Topic>().unwrap(), topic);
        assert_eq!("role:admin".parse::<Topic>().unwrap(), Topic::Role(Role::Admin));
    }

    #[test]
    fn test_invalid_topics() {
        assert!("role:janitor".parse::<Topic>().is_err());
        assert!("case:not-a-uuid".parse::<Topic>().is_err());
        assert!("lab_order".parse::<Topic>().is_err());
    }

    #[test]
    fn test_topic_serializes_as_string() {
        let json = serde_json::to_string(&Topic::Role(Role::Nurse)).unwrap();
        assert_eq!(json, "\"role:nurse\"");
        let back: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Topic::Role(Role::Nurse));
    }
}
