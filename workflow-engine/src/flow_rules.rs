//! Flow Rule Registry
//!
//! Per service type: which fields the nurse captures, how many images are
//! needed, whether a doctor must review, and when review may be skipped.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::service_type::ServiceType;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Choice(Vec<&'static str>),
    Image,
    Timestamp,
    LongText,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Boolean that must be exactly `true`
    pub must_affirm: bool,
    /// Attachments tagged with this field's key
    pub min_images: u32,
}

impl FieldRule {
    fn new(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            label,
            kind,
            required: true,
            must_affirm: false,
            min_images: 0,
        }
    }

    pub fn text(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::Text)
    }

    pub fn long_text(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::LongText)
    }

    pub fn number(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::Number)
    }

    pub fn boolean(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::Boolean)
    }

    pub fn timestamp(key: &'static str, label: &'static str) -> Self {
        Self::new(key, label, FieldKind::Timestamp)
    }

    pub fn choice(key: &'static str, label: &'static str, options: &[&'static str]) -> Self {
        Self::new(key, label, FieldKind::Choice(options.to_vec()))
    }

    pub fn image(key: &'static str, label: &'static str, min_images: u32) -> Self {
        Self {
            min_images,
            ..Self::new(key, label, FieldKind::Image)
        }
    }

    /// Boolean confirmation that must be affirmatively `true`
    pub fn affirmation(key: &'static str, label: &'static str) -> Self {
        Self {
            must_affirm: true,
            ..Self::new(key, label, FieldKind::Boolean)
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Condition over captured fields under which doctor review is skipped
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AutoClosePredicate {
    Equals {
        field: &'static str,
        value: Value,
    },
    InRange {
        field: &'static str,
        min: Option<f64>,
        max: Option<f64>,
    },
    All {
        conditions: Vec<AutoClosePredicate>,
    },
}

impl AutoClosePredicate {
    pub fn equals(field: &'static str, value: impl Into<Value>) -> Self {
        AutoClosePredicate::Equals {
            field,
            value: value.into(),
        }
    }

    pub fn between(field: &'static str, min: f64, max: f64) -> Self {
        AutoClosePredicate::InRange {
            field,
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(field: &'static str, min: f64) -> Self {
        AutoClosePredicate::InRange {
            field,
            min: Some(min),
            max: None,
        }
    }

    pub fn evaluate(&self, captured: &Map<String, Value>) -> bool {
        match self {
            AutoClosePredicate::Equals { field, value } => captured.get(*field) == Some(value),
            AutoClosePredicate::InRange { field, min, max } => {
                match captured.get(*field).and_then(numeric_value) {
                    Some(n) => min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi),
                    None => false,
                }
            }
            AutoClosePredicate::All { conditions } => {
                conditions.iter().all(|condition| condition.evaluate(captured))
            }
        }
    }
}

/// Numbers arrive either as JSON numbers or as numeric strings from forms
pub(crate) fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DoctorReview {
    Mandatory,
    Bypassable { auto_close: AutoClosePredicate },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRuleSet {
    pub service_type: ServiceType,
    pub display_name: &'static str,
    pub fields: Vec<FieldRule>,
    pub min_total_images: u32,
    pub doctor_review: DoctorReview,
    pub is_emergency: bool,
}

impl FlowRuleSet {
    /// Rule set for a catalog entry
    pub fn for_service(service_type: ServiceType) -> Self {
        let (fields, min_total_images, doctor_review, is_emergency) = match service_type {
            ServiceType::WoundDressing => (
                vec![
                    FieldRule::text("woundLocation", "Wound location"),
                    FieldRule::text("woundSize", "Wound size"),
                    FieldRule::choice("exudateLevel", "Exudate level", &["none", "low", "moderate", "high"]),
                    FieldRule::boolean("signsOfInfection", "Signs of infection"),
                    FieldRule::text("dressingType", "Dressing type"),
                    FieldRule::number("painScore", "Pain score").optional(),
                    FieldRule::long_text("notes", "Notes").optional(),
                ],
                2,
                DoctorReview::Mandatory,
                false,
            ),
            ServiceType::Injection => (
                vec![
                    FieldRule::text("medicationName", "Medication name"),
                    FieldRule::text("dose", "Dose"),
                    FieldRule::choice("route", "Route", &["intramuscular", "subcutaneous", "intravenous", "intradermal"]),
                    FieldRule::text("injectionSite", "Injection site"),
                    FieldRule::affirmation("prescriptionVerified", "Prescription verified"),
                    FieldRule::choice("reactionStatus", "Reaction", &["none", "mild", "severe"]),
                    FieldRule::timestamp("administeredAt", "Administered at"),
                    FieldRule::image("prescriptionPhoto", "Prescription photo", 1),
                ],
                1,
                DoctorReview::Bypassable {
                    auto_close: AutoClosePredicate::equals("reactionStatus", "none"),
                },
                false,
            ),
            ServiceType::IvTherapy => (
                vec![
                    FieldRule::text("fluidType", "Fluid type"),
                    FieldRule::number("volumeMl", "Volume (ml)"),
                    FieldRule::text("infusionRate", "Infusion rate"),
                    FieldRule::text("cannulaSite", "Cannula site"),
                    FieldRule::affirmation("prescriptionVerified", "Prescription verified"),
                    FieldRule::timestamp("startTime", "Start time"),
                    FieldRule::timestamp("endTime", "End time").optional(),
                    FieldRule::long_text("complications", "Complications").optional(),
                ],
                1,
                DoctorReview::Mandatory,
                false,
            ),
            ServiceType::VitalsCheck => (
                vec![
                    FieldRule::text("bloodPressure", "Blood pressure"),
                    FieldRule::number("pulse", "Pulse"),
                    FieldRule::number("temperature", "Temperature"),
                    FieldRule::number("spo2", "SpO2"),
                    FieldRule::number("respiratoryRate", "Respiratory rate").optional(),
                    FieldRule::number("bloodGlucose", "Blood glucose").optional(),
                    FieldRule::long_text("observations", "Observations").optional(),
                ],
                0,
                DoctorReview::Bypassable {
                    auto_close: AutoClosePredicate::All {
                        conditions: vec![
                            AutoClosePredicate::between("pulse", 50.0, 110.0),
                            AutoClosePredicate::between("temperature", 36.0, 38.0),
                            AutoClosePredicate::at_least("spo2", 94.0),
                        ],
                    },
                },
                false,
            ),
            ServiceType::CatheterCare => (
                vec![
                    FieldRule::choice("catheterType", "Catheter type", &["foley", "suprapubic", "condom", "intermittent"]),
                    FieldRule::boolean("catheterChanged", "Catheter changed"),
                    FieldRule::choice("urineColor", "Urine color", &["clear", "yellow", "dark", "cloudy", "bloody"]),
                    FieldRule::text("siteCondition", "Site condition"),
                ],
                1,
                DoctorReview::Mandatory,
                false,
            ),
            ServiceType::PostOperativeCare => (
                vec![
                    FieldRule::text("surgeryType", "Surgery type"),
                    FieldRule::choice("incisionCondition", "Incision condition", &["healing", "inflamed", "infected", "dehisced"]),
                    FieldRule::number("painScore", "Pain score"),
                    FieldRule::boolean("drainPresent", "Drain present"),
                ],
                2,
                DoctorReview::Mandatory,
                false,
            ),
            ServiceType::ElderlyCare => (
                vec![
                    FieldRule::choice("mobilityStatus", "Mobility", &["independent", "assisted", "bedbound"]),
                    FieldRule::boolean("mealsTaken", "Meals taken"),
                    FieldRule::boolean("medicationAdherence", "Medication adherence"),
                    FieldRule::boolean("fallsSinceLastVisit", "Falls since last visit"),
                    FieldRule::choice("mood", "Mood", &["stable", "low", "agitated", "confused"]),
                ],
                0,
                DoctorReview::Bypassable {
                    auto_close: AutoClosePredicate::All {
                        conditions: vec![
                            AutoClosePredicate::equals("fallsSinceLastVisit", false),
                            AutoClosePredicate::equals("medicationAdherence", true),
                        ],
                    },
                },
                false,
            ),
            ServiceType::EmergencyVisit => (
                vec![
                    FieldRule::long_text("chiefComplaint", "Chief complaint"),
                    FieldRule::choice("consciousnessLevel", "Consciousness", &["alert", "verbal", "pain", "unresponsive"]),
                    FieldRule::text("bloodPressure", "Blood pressure"),
                    FieldRule::number("pulse", "Pulse"),
                    FieldRule::number("spo2", "SpO2"),
                ],
                0,
                DoctorReview::Mandatory,
                true,
            ),
        };

        Self {
            service_type,
            display_name: service_type.display_name(),
            fields,
            min_total_images,
            doctor_review,
            is_emergency,
        }
    }

    pub fn requires_doctor(&self) -> bool {
        matches!(self.doctor_review, DoctorReview::Mandatory)
    }

    /// Evaluates the predicate only when review is bypassable
    pub fn can_auto_close(&self, captured: &Map<String, Value>) -> bool {
        match &self.doctor_review {
            DoctorReview::Mandatory => false,
            DoctorReview::Bypassable { auto_close } => auto_close.evaluate(captured),
        }
    }
}

/// All rule sets, keyed by service type
#[derive(Debug, Clone)]
pub struct FlowRuleRegistry {
    rules: HashMap<ServiceType, FlowRuleSet>,
}

impl FlowRuleRegistry {
    pub fn standard() -> Self {
        let rules = ServiceType::ALL
            .into_iter()
            .map(|service| (service, FlowRuleSet::for_service(service)))
            .collect();
        Self { rules }
    }

    pub fn get(&self, service_type: ServiceType) -> Option<&FlowRuleSet> {
        self.rules.get(&service_type)
    }

    /// Lookup by wire name
    pub fn lookup(&self, service_type: &str) -> Option<&FlowRuleSet> {
        service_type
            .parse::<ServiceType>()
            .ok()
            .and_then(|service| self.get(service))
    }

    /// Catalog in declaration order
    pub fn catalog(&self) -> Vec<&FlowRuleSet> {
        ServiceType::ALL
            .iter()
            .filter_map(|service| self.rules.get(service))
            .collect()
    }

    /// `false` for unknown service types and for mandatory review
    pub fn can_auto_close(&self, service_type: &str, captured: &Map<String, Value>) -> bool {
        self.lookup(service_type)
            .is_some_and(|rules| rules.can_auto_close(captured))
    }
}

impl Default for FlowRuleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
