//! Route path constants

pub const API_V1: &str = "/api/v1";

pub mod health {
    pub const HEALTH: &str = "/health";
}

pub mod realtime {
    pub const WEBSOCKET: &str = "/ws";
}

/// Relative to [`super::API_V1`]
pub mod cases {
    pub const CASES: &str = "/cases";
    pub const CASE_BY_ID: &str = "/cases/:id";
    pub const ASSIGN: &str = "/cases/:id/assign";
    pub const REASSIGN: &str = "/cases/:id/reassign";
    pub const TRANSITION: &str = "/cases/:id/transition";
    pub const CLINICAL_REPORT: &str = "/cases/:id/clinical-report";
    pub const DOCTOR_ACTION: &str = "/cases/:id/doctor-action";
    pub const LAB_ORDERS: &str = "/cases/:id/lab-orders";
}

/// Relative to [`super::API_V1`]
pub mod lab_orders {
    pub const LAB_ORDER_BY_ID: &str = "/lab-orders/:id";
    pub const CONFIRM: &str = "/lab-orders/:id/confirm";
    pub const DECLINE: &str = "/lab-orders/:id/decline";
    pub const SCHEDULE: &str = "/lab-orders/:id/schedule";
    pub const COLLECT: &str = "/lab-orders/:id/collect";
    pub const SEND: &str = "/lab-orders/:id/send";
    pub const REPORT: &str = "/lab-orders/:id/report";
    pub const REVIEW: &str = "/lab-orders/:id/review";
    pub const CLOSE: &str = "/lab-orders/:id/close";
}

/// Relative to [`super::API_V1`]
pub mod audit {
    pub const ENTITY_HISTORY: &str = "/audit/entities/:entity_type/:id";
    pub const ACTOR_HISTORY: &str = "/audit/actors/:id";
}

/// Relative to [`super::API_V1`]
pub mod service_types {
    pub const SERVICE_TYPES: &str = "/service-types";
    pub const SERVICE_TYPE_BY_NAME: &str = "/service-types/:name";
}
