// Sample collection checklist
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistItem {
    IdentityConfirmed,
    FastingConfirmed,
    SampleCollected,
    ProperLabeling,
}

impl ChecklistItem {
    pub fn as_str(self) -> &'static str {
        match self {
            ChecklistItem::IdentityConfirmed => "identity_confirmed",
            ChecklistItem::FastingConfirmed => "fasting_confirmed",
            ChecklistItem::SampleCollected => "sample_collected",
            ChecklistItem::ProperLabeling => "proper_labeling",
        }
    }
}

/// What the collecting nurse confirms at the patient's door
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleCollectionChecklist {
    pub identity_confirmed: bool,
    /// Only consulted when the order requires fasting
    pub fasting_confirmed: Option<bool>,
    pub sample_collected: bool,
    pub proper_labeling: bool,
}

impl SampleCollectionChecklist {
    pub fn complete() -> Self {
        Self {
            identity_confirmed: true,
            fasting_confirmed: Some(true),
            sample_collected: true,
            proper_labeling: true,
        }
    }

    /// Items not affirmatively confirmed, in checklist order
    pub fn missing_items(&self, requires_fasting: bool) -> Vec<ChecklistItem> {
        let mut missing = Vec::new();
        if !self.identity_confirmed {
            missing.push(ChecklistItem::IdentityConfirmed);
        }
        if requires_fasting && self.fasting_confirmed != Some(true) {
            missing.push(ChecklistItem::FastingConfirmed);
        }
        if !self.sample_collected {
            missing.push(ChecklistItem::SampleCollected);
        }
        if !self.proper_labeling {
            missing.push(ChecklistItem::ProperLabeling);
        }
        missing
    }
}
