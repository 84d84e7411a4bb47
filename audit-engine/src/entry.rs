// Audit entry types and structures
use auth_identity::{Actor, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AuditError;

/// Kind of entity an audit record is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Case,
    ClinicalReport,
    DoctorAction,
    LabOrder,
    LabReport,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Case => "case",
            EntityType::ClinicalReport => "clinical_report",
            EntityType::DoctorAction => "doctor_action",
            EntityType::LabOrder => "lab_order",
            EntityType::LabReport => "lab_report",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "case" => Ok(EntityType::Case),
            "clinical_report" => Ok(EntityType::ClinicalReport),
            "doctor_action" => Ok(EntityType::DoctorAction),
            "lab_order" => Ok(EntityType::LabOrder),
            "lab_report" => Ok(EntityType::LabReport),
            other => Err(AuditError::UnknownEntityType(other.to_string())),
        }
    }
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CaseCreated,
    NurseAssigned,
    NurseReassigned,
    CaseTransitioned,
    ClinicalReportSubmitted,
    CaseAutoAdvanced,
    DoctorActionRecorded,
    LabOrderCreated,
    LabOrderTransitioned,
    LabReportUploaded,
    LabReportReviewed,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::CaseCreated => "case_created",
            AuditAction::NurseAssigned => "nurse_assigned",
            AuditAction::NurseReassigned => "nurse_reassigned",
            AuditAction::CaseTransitioned => "case_transitioned",
            AuditAction::ClinicalReportSubmitted => "clinical_report_submitted",
            AuditAction::CaseAutoAdvanced => "case_auto_advanced",
            AuditAction::DoctorActionRecorded => "doctor_action_recorded",
            AuditAction::LabOrderCreated => "lab_order_created",
            AuditAction::LabOrderTransitioned => "lab_order_transitioned",
            AuditAction::LabReportUploaded => "lab_report_uploaded",
            AuditAction::LabReportReviewed => "lab_report_reviewed",
        }
    }
}

impl FromStr for AuditAction {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "case_created" => AuditAction::CaseCreated,
            "nurse_assigned" => AuditAction::NurseAssigned,
            "nurse_reassigned" => AuditAction::NurseReassigned,
            "case_transitioned" => AuditAction::CaseTransitioned,
            "clinical_report_submitted" => AuditAction::ClinicalReportSubmitted,
            "case_auto_advanced" => AuditAction::CaseAutoAdvanced,
            "doctor_action_recorded" => AuditAction::DoctorActionRecorded,
            "lab_order_created" => AuditAction::LabOrderCreated,
            "lab_order_transitioned" => AuditAction::LabOrderTransitioned,
            "lab_report_uploaded" => AuditAction::LabReportUploaded,
            "lab_report_reviewed" => AuditAction::LabReportReviewed,
            other => return Err(AuditError::UnknownAction(other.to_string())),
        };
        Ok(action)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit record decided by the workflow, not yet committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub actor_role: Role,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub from_state: Option<String>,
    pub to_state: Option<String>,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl NewAuditEntry {
    pub fn new(actor: Actor, action: AuditAction, entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: actor.user_id,
            actor_role: actor.role,
            action,
            entity_type,
            entity_id,
            from_state: None,
            to_state: None,
            metadata: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_states(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_state = Some(from.into());
        self.to_state = Some(to.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Turn the draft into a committed record with the store-assigned sequence
    pub fn commit(self, sequence: i64) -> AuditEntry {
        tracing::info!(
            target: "audit",
            sequence,
            actor_id = %self.actor_id,
            actor_role = %self.actor_role,
            action = %self.action,
            entity_type = %self.entity_type,
            entity_id = %self.entity_id,
            from = ?self.from_state,
            to = ?self.to_state,
            "Audit record appended"
        );

        AuditEntry {
            sequence,
            id: self.id,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            from_state: self.from_state,
            to_state: self.to_state,
            metadata: self.metadata,
            timestamp: self.timestamp,
        }
    }
}

/// A committed, immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub sequence: i64,
    pub id: Uuid,
    pub actor_id: Uuid,
    pub actor_role: Role,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub from_state: Option<String>,
    pub to_state: Option<String>,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
