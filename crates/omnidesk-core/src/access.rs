//! Static role-to-permission resolution.
//!
//! Pure and side-effect free; safe to call from any thread without
//! synchronization. Denials always report exactly which permissions were
//! missing, never a bare "denied".

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::error::{AuthError, Result};

/// User roles, ordered from most to least privileged.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// Full platform access; holds every permission by construction.
    SuperAdmin,
    /// Platform administration short of system management.
    Admin,
    /// Team oversight: assignment, analytics, reporting.
    Manager,
    /// Ticket handling.
    Agent,
    /// End user raising and reading their own tickets.
    User,
}

/// Granular platform permissions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Permission {
    // Ticket permissions
    /// Open a new ticket.
    CreateTicket,
    /// Read tickets.
    ReadTicket,
    /// Update ticket fields and status.
    UpdateTicket,
    /// Delete a ticket.
    DeleteTicket,
    /// Assign a ticket to an agent.
    AssignTicket,

    // User management
    /// Create user accounts.
    CreateUser,
    /// Read user accounts.
    ReadUser,
    /// Update user accounts.
    UpdateUser,
    /// Delete user accounts.
    DeleteUser,

    // Analytics and reporting
    /// View the analytics dashboards.
    ViewAnalytics,
    /// View generated reports.
    ViewReports,

    // System administration
    /// Manage platform-wide settings.
    ManageSystem,
    /// Read operational logs.
    ViewLogs,
    /// Configure the AI classification pipeline.
    ConfigureAi,
}

/// Static role-to-permission resolver.
///
/// A zero-sized handle: the table is compiled in, so cloning and sharing
/// are free.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessControl;

impl AccessControl {
    /// Returns the full permission set granted to `role`.
    ///
    /// `SuperAdmin` is computed as "every declared permission" at lookup
    /// time, so newly added permissions reach it without a table change.
    #[must_use]
    pub fn permissions_for(role: Role) -> HashSet<Permission> {
        use Permission::*;

        match role {
            Role::SuperAdmin => Permission::iter().collect(),
            Role::Admin => HashSet::from([
                CreateTicket,
                ReadTicket,
                UpdateTicket,
                AssignTicket,
                CreateUser,
                ReadUser,
                UpdateUser,
                ViewAnalytics,
                ViewReports,
                ViewLogs,
            ]),
            Role::Manager => HashSet::from([
                ReadTicket,
                UpdateTicket,
                AssignTicket,
                ReadUser,
                ViewAnalytics,
                ViewReports,
            ]),
            Role::Agent => HashSet::from([CreateTicket, ReadTicket, UpdateTicket]),
            Role::User => HashSet::from([CreateTicket, ReadTicket]),
        }
    }

    /// Checks that `granted` covers every permission in `required`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::PermissionDenied`] carrying exactly
    /// `required \ granted`, sorted for deterministic output.
    pub fn authorize(granted: &HashSet<Permission>, required: &[Permission]) -> Result<()> {
        let mut missing: Vec<Permission> = required
            .iter()
            .copied()
            .filter(|permission| !granted.contains(permission))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            missing.sort_unstable();
            missing.dedup();
            Err(AuthError::PermissionDenied { missing })
        }
    }
}
