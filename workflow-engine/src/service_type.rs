use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Fixed catalog of home-care services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    WoundDressing,
    Injection,
    IvTherapy,
    VitalsCheck,
    CatheterCare,
    PostOperativeCare,
    ElderlyCare,
    EmergencyVisit,
}

impl ServiceType {
    pub const ALL: [ServiceType; 8] = [
        ServiceType::WoundDressing,
        ServiceType::Injection,
        ServiceType::IvTherapy,
        ServiceType::VitalsCheck,
        ServiceType::CatheterCare,
        ServiceType::PostOperativeCare,
        ServiceType::ElderlyCare,
        ServiceType::EmergencyVisit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::WoundDressing => "wound_dressing",
            ServiceType::Injection => "injection",
            ServiceType::IvTherapy => "iv_therapy",
            ServiceType::VitalsCheck => "vitals_check",
            ServiceType::CatheterCare => "catheter_care",
            ServiceType::PostOperativeCare => "post_operative_care",
            ServiceType::ElderlyCare => "elderly_care",
            ServiceType::EmergencyVisit => "emergency_visit",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ServiceType::WoundDressing => "Wound Dressing",
            ServiceType::Injection => "Injection",
            ServiceType::IvTherapy => "IV Therapy",
            ServiceType::VitalsCheck => "Vitals Check",
            ServiceType::CatheterCare => "Catheter Care",
            ServiceType::PostOperativeCare => "Post-operative Care",
            ServiceType::ElderlyCare => "Elderly Care",
            ServiceType::EmergencyVisit => "Emergency Visit",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .into_iter()
            .find(|service| service.as_str() == s)
            .ok_or_else(|| WorkflowError::UnknownServiceType(s.to_string()))
    }
}
