//! Role-gated state machine contract shared by cases and lab orders
//!
//! `attempt_transition` checks, in order: the edge exists, the actor's role
//! may take it, the edge's domain guard holds.

use std::fmt;

use auth_identity::Role;
use error_common::codes;

use crate::checklist::SampleCollectionChecklist;
use crate::error::{Result, WorkflowError};

/// Domain condition attached to an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Every lab order owned by the case is closed
    NoOpenLabOrders,
    /// The sample collection checklist is fully affirmative
    ChecklistComplete,
}

/// One edge of a transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRule {
    pub roles: &'static [Role],
    /// Roles that may take the edge only when the engine approved an auto-close
    pub auto_close_roles: &'static [Role],
    pub guard: Option<Guard>,
}

impl EdgeRule {
    pub const fn open(roles: &'static [Role]) -> Self {
        Self {
            roles,
            auto_close_roles: &[],
            guard: None,
        }
    }

    pub const fn guarded(roles: &'static [Role], guard: Guard) -> Self {
        Self {
            roles,
            auto_close_roles: &[],
            guard: Some(guard),
        }
    }

    pub const fn with_auto_close(mut self, roles: &'static [Role]) -> Self {
        self.auto_close_roles = roles;
        self
    }

    pub fn permits(&self, role: Role, ctx: &GuardContext) -> bool {
        self.roles.contains(&role) || (ctx.auto_close_approved && self.auto_close_roles.contains(&role))
    }
}

/// A closed set of states with a fixed edge table
pub trait StateMachine: Copy + Eq + fmt::Debug + fmt::Display + 'static {
    const ALL: &'static [Self];

    fn edge(self, to: Self) -> Option<EdgeRule>;

    fn is_terminal(self) -> bool;
}

/// Facts the guards need; assembled by the caller from the store
#[derive(Debug, Clone, Default)]
pub struct GuardContext {
    pub open_lab_orders: usize,
    pub auto_close_approved: bool,
    pub checklist: Option<SampleCollectionChecklist>,
    pub requires_fasting: bool,
}

impl GuardContext {
    pub fn with_open_lab_orders(mut self, open: usize) -> Self {
        self.open_lab_orders = open;
        self
    }

    pub fn auto_close(mut self) -> Self {
        self.auto_close_approved = true;
        self
    }

    pub fn with_checklist(mut self, checklist: SampleCollectionChecklist, requires_fasting: bool) -> Self {
        self.checklist = Some(checklist);
        self.requires_fasting = requires_fasting;
        self
    }
}

/// Decide whether `role` may move `from` to `to`
pub fn attempt_transition<S: StateMachine>(
    from: S,
    to: S,
    role: Role,
    ctx: &GuardContext,
) -> Result<EdgeRule> {
    let rule = from
        .edge(to)
        .ok_or_else(|| WorkflowError::invalid_transition(from, to))?;

    if !rule.permits(role, ctx) {
        return Err(WorkflowError::UnauthorizedRole {
            role,
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    match rule.guard {
        Some(Guard::NoOpenLabOrders) if ctx.open_lab_orders > 0 => {
            Err(WorkflowError::DomainGuardFailed {
                reason: codes::workflow::LAB_PENDING,
                message: format!("{} lab order(s) still open", ctx.open_lab_orders),
            })
        }
        Some(Guard::ChecklistComplete) => {
            let missing = ctx
                .checklist
                .as_ref()
                .map_or_else(
                    || SampleCollectionChecklist::default().missing_items(ctx.requires_fasting),
                    |checklist| checklist.missing_items(ctx.requires_fasting),
                );
            if missing.is_empty() {
                Ok(rule)
            } else {
                Err(WorkflowError::IncompleteChecklist { missing })
            }
        }
        _ => Ok(rule),
    }
}
