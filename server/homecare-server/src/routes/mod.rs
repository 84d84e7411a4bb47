pub mod paths;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{audit, cases, health, lab_orders, service_types, websocket};
use crate::server::HomeCareServer;

/// Unauthenticated liveness
pub fn health_routes() -> Router<HomeCareServer> {
    Router::new().route(paths::health::HEALTH, get(health::health_check))
}

/// Token checked before the upgrade
pub fn realtime_routes() -> Router<HomeCareServer> {
    Router::new().route(paths::realtime::WEBSOCKET, get(websocket::websocket_handler))
}

pub fn case_routes() -> Router<HomeCareServer> {
    use paths::cases::*;

    Router::new()
        .route(CASES, post(cases::create_case))
        .route(CASE_BY_ID, get(cases::get_case))
        .route(ASSIGN, post(cases::assign_nurse))
        .route(REASSIGN, post(cases::reassign_nurse))
        .route(TRANSITION, post(cases::transition_case))
        .route(
            CLINICAL_REPORT,
            post(cases::submit_clinical_report).get(cases::get_clinical_report),
        )
        .route(
            DOCTOR_ACTION,
            post(cases::record_doctor_action).get(cases::get_doctor_action),
        )
        .route(LAB_ORDERS, get(cases::list_lab_orders))
}

pub fn lab_order_routes() -> Router<HomeCareServer> {
    use paths::lab_orders::*;

    Router::new()
        .route(LAB_ORDER_BY_ID, get(lab_orders::get_lab_order))
        .route(CONFIRM, post(lab_orders::confirm))
        .route(DECLINE, post(lab_orders::decline))
        .route(SCHEDULE, post(lab_orders::schedule_collection))
        .route(COLLECT, post(lab_orders::record_collection))
        .route(SEND, post(lab_orders::send_to_lab))
        .route(REPORT, post(lab_orders::upload_report).get(lab_orders::get_lab_report))
        .route(REVIEW, post(lab_orders::begin_review))
        .route(CLOSE, post(lab_orders::close_review))
}

pub fn audit_routes() -> Router<HomeCareServer> {
    Router::new()
        .route(paths::audit::ENTITY_HISTORY, get(audit::entity_history))
        .route(paths::audit::ACTOR_HISTORY, get(audit::actor_history))
}

pub fn service_type_routes() -> Router<HomeCareServer> {
    Router::new()
        .route(paths::service_types::SERVICE_TYPES, get(service_types::list_service_types))
        .route(
            paths::service_types::SERVICE_TYPE_BY_NAME,
            get(service_types::get_service_type),
        )
}

/// Everything under `/api/v1`; handlers authenticate through `AuthContext`
pub fn api_v1_routes() -> Router<HomeCareServer> {
    Router::new()
        .merge(case_routes())
        .merge(lab_order_routes())
        .merge(audit_routes())
        .merge(service_type_routes())
}

pub fn create_routes() -> Router<HomeCareServer> {
    Router::new()
        .merge(health_routes())
        .merge(realtime_routes())
        .nest(paths::API_V1, api_v1_routes())
}
