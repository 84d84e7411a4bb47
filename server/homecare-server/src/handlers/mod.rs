pub mod audit;
pub mod cases;
pub mod health;
pub mod lab_orders;
pub mod service_types;
pub mod websocket;
