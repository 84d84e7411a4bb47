//! Validation Engine
//!
//! Checks a nurse's clinical submission against the service type's flow
//! rules. Returns every violation, in field order, then the aggregate image
//! check; an empty list means the submission is valid.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow_rules::{numeric_value, FieldKind, FieldRule, FlowRuleRegistry, FlowRuleSet};
use crate::models::Attachment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    MissingField,
    NotAffirmed,
    WrongType { expected: String },
    InvalidChoice { allowed: Vec<String> },
    InsufficientImages { required: u32, provided: u32 },
    UnknownServiceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Offending field key; `None` for submission-wide checks
    pub field: Option<String>,
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    fn on(rule: &FieldRule, kind: ViolationKind, message: String) -> Self {
        Self {
            field: Some(rule.key.to_string()),
            kind,
            message,
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn check_image_field(rule: &FieldRule, attachments: &[Attachment]) -> Option<Violation> {
    let provided = count(
        attachments
            .iter()
            .filter(|a| a.field.as_deref() == Some(rule.key))
            .count(),
    );
    let required = if rule.required { rule.min_images.max(1) } else { rule.min_images };
    (provided < required).then(|| {
        Violation::on(
            rule,
            ViolationKind::InsufficientImages { required, provided },
            format!("{} needs {required} image(s), {provided} provided", rule.label),
        )
    })
}

fn check_value(rule: &FieldRule, value: &Value) -> Option<Violation> {
    let wrong_type = |expected: &str| {
        Some(Violation::on(
            rule,
            ViolationKind::WrongType {
                expected: expected.to_string(),
            },
            format!("{} must be a {expected}", rule.label),
        ))
    };

    match &rule.kind {
        FieldKind::Text | FieldKind::LongText => {
            if value.is_string() {
                None
            } else {
                wrong_type("text")
            }
        }
        FieldKind::Number => {
            if numeric_value(value).is_some() {
                None
            } else {
                wrong_type("number")
            }
        }
        FieldKind::Boolean => match value {
            Value::Bool(true) => None,
            Value::Bool(false) if rule.must_affirm => Some(Violation::on(
                rule,
                ViolationKind::NotAffirmed,
                format!("{} must be confirmed", rule.label),
            )),
            Value::Bool(false) => None,
            _ => wrong_type("boolean"),
        },
        FieldKind::Choice(options) => match value.as_str() {
            Some(choice) if options.iter().any(|option| *option == choice) => None,
            _ => Some(Violation::on(
                rule,
                ViolationKind::InvalidChoice {
                    allowed: options.iter().map(|o| (*o).to_string()).collect(),
                },
                format!("{} must be one of: {}", rule.label, options.join(", ")),
            )),
        },
        FieldKind::Timestamp => match value.as_str().map(DateTime::parse_from_rfc3339) {
            Some(Ok(_)) => None,
            _ => wrong_type("RFC 3339 timestamp"),
        },
        FieldKind::Image => None,
    }
}

impl FlowRuleSet {
    pub fn validate(&self, captured: &Map<String, Value>, attachments: &[Attachment]) -> Vec<Violation> {
        let mut violations = Vec::new();

        for rule in &self.fields {
            if rule.kind == FieldKind::Image {
                violations.extend(check_image_field(rule, attachments));
                continue;
            }

            match captured.get(rule.key).filter(|value| !is_empty(value)) {
                None if rule.required => violations.push(Violation::on(
                    rule,
                    ViolationKind::MissingField,
                    format!("{} is required", rule.label),
                )),
                None => {}
                Some(value) => violations.extend(check_value(rule, value)),
            }
        }

        let provided = count(attachments.len());
        if provided < self.min_total_images {
            violations.push(Violation {
                field: None,
                kind: ViolationKind::InsufficientImages {
                    required: self.min_total_images,
                    provided,
                },
                message: format!(
                    "{} requires at least {} image(s), {provided} provided",
                    self.display_name, self.min_total_images
                ),
            });
        }

        violations
    }
}

impl FlowRuleRegistry {
    /// Unknown service types yield exactly one violation and nothing else
    pub fn validate_submission(
        &self,
        service_type: &str,
        captured: &Map<String, Value>,
        attachments: &[Attachment],
    ) -> Vec<Violation> {
        match self.lookup(service_type) {
            Some(rules) => rules.validate(captured, attachments),
            None => vec![Violation {
                field: None,
                kind: ViolationKind::UnknownServiceType,
                message: format!("Service type '{service_type}' is not recognized"),
            }],
        }
    }
}
