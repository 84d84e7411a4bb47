//! Common error handling utilities for HomeCare Engine
//!
//! Every crate in the workspace owns its own `thiserror` enum, but they all
//! agree on two things defined here:
//!
//! - **Error codes**: the stable, user-facing taxonomy strings returned to
//!   callers (`invalid_transition`, `validation_failed`, ...)
//! - **Severity**: whether a failure is an expected, recoverable outcome the
//!   caller can correct, or a fatal fault (store connectivity, configuration)
//!   that is surfaced only as a generic server error
//!
//! Failures are logged through [`log_error`] with an [`ErrorContext`]
//! naming the request, actor and entity involved.
//!
//! # Example
//!
//! ```rust
//! use error_common::{codes, log_error, ErrorContext, Severity};
//!
//! let ctx = ErrorContext::new()
//!     .with_request_id("9f1c")
//!     .add_context("status_code", "409");
//! log_error(&"1 lab order still open", codes::workflow::LAB_PENDING, Severity::Recoverable, &ctx);
//! assert_eq!(ctx.request_id.as_deref(), Some("9f1c"));
//! ```

pub mod codes;
pub mod context;
pub mod types;

pub use context::*;
pub use types::*;
