//! Identity primitives for HomeCare Engine
//!
//! This module provides the closed set of actor roles and the signed bearer
//! tokens that carry them:
//! - `Role`: patient, nurse, doctor, admin
//! - `Actor`: an authenticated `(user_id, role)` pair
//! - `TokenService`: HS256 token issue/verify used by both the HTTP action
//!   layer and the real-time transport
//!
//! # Example
//!
//! ```rust
//! use auth_identity::{IdentityConfig, Role, TokenService};
//! use uuid::Uuid;
//!
//! let service = TokenService::new(IdentityConfig::new("a-long-signing-secret")).unwrap();
//! let nurse = Uuid::new_v4();
//! let token = service.issue(nurse, Role::Nurse).unwrap();
//! let actor = service.verify(&token).unwrap();
//! assert_eq!(actor.user_id, nurse);
//! assert_eq!(actor.role, Role::Nurse);
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod service;

pub use config::*;
pub use error::*;
pub use models::*;
pub use service::*;
