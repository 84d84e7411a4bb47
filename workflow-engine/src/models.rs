// Care workflow entities
use chrono::{DateTime, NaiveDate, Utc};
use events_bus::CaseMembership;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::case_state::CaseStatus;
use crate::lab_state::LabOrderStatus;
use crate::service_type::ServiceType;

/// A service request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: Uuid,
    pub service_type: ServiceType,
    pub status: CaseStatus,
    pub patient_id: Uuid,
    pub nurse_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub is_immediate: bool,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn membership(&self) -> CaseMembership {
        CaseMembership {
            case_id: self.id,
            patient_id: self.patient_id,
            nurse_id: self.nurse_id,
            doctor_id: self.doctor_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageSeverity {
    Low,
    Moderate,
    High,
    Critical,
}

/// Opaque reference to an uploaded file, optionally tagged with the image field it satisfies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub reference: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl Attachment {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            field: None,
        }
    }

    pub fn for_field(reference: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            field: Some(field.into()),
        }
    }
}

/// Nurse-captured findings; created once per case, never updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalReport {
    pub id: Uuid,
    pub case_id: Uuid,
    pub nurse_id: Uuid,
    pub vitals: Map<String, Value>,
    pub triage_severity: TriageSeverity,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

/// Doctor's review outcome; created once per case, after the clinical report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorAction {
    pub id: Uuid,
    pub case_id: Uuid,
    pub doctor_id: Uuid,
    pub diagnosis: String,
    pub notes: Option<String>,
    pub referral: Option<String>,
    pub lab_tests: Vec<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Routine,
    Urgent,
    Stat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabOrder {
    pub id: Uuid,
    pub case_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub tests: Vec<String>,
    pub urgency: Urgency,
    pub requires_fasting: bool,
    pub collector_id: Option<Uuid>,
    pub scheduled_collection_at: Option<DateTime<Utc>>,
    pub status: LabOrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uploaded lab result plus the reviewing doctor's notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabReport {
    pub id: Uuid,
    pub lab_order_id: Uuid,
    pub artifact_ref: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
}
