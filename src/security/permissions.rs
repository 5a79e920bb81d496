//! Static role → permission table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    BillingManager,
    Viewer,
    ApiUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "invoice:create")]
    InvoiceCreate,
    #[serde(rename = "invoice:read")]
    InvoiceRead,
    #[serde(rename = "invoice:update")]
    InvoiceUpdate,
    #[serde(rename = "invoice:delete")]
    InvoiceDelete,
    #[serde(rename = "invoice:resend")]
    InvoiceResend,
    #[serde(rename = "logs:read")]
    LogsRead,
    #[serde(rename = "logs:export")]
    LogsExport,
    #[serde(rename = "settings:read")]
    SettingsRead,
    #[serde(rename = "settings:update")]
    SettingsUpdate,
    #[serde(rename = "user:manage")]
    UserManage,
}

const ADMIN: &[Permission] = &[
    Permission::InvoiceCreate,
    Permission::InvoiceRead,
    Permission::InvoiceUpdate,
    Permission::InvoiceDelete,
    Permission::InvoiceResend,
    Permission::LogsRead,
    Permission::LogsExport,
    Permission::SettingsRead,
    Permission::SettingsUpdate,
    Permission::UserManage,
];

const BILLING_MANAGER: &[Permission] = &[
    Permission::InvoiceCreate,
    Permission::InvoiceRead,
    Permission::InvoiceUpdate,
    Permission::InvoiceResend,
    Permission::LogsRead,
    Permission::SettingsRead,
];

const VIEWER: &[Permission] = &[Permission::InvoiceRead, Permission::LogsRead];

const API_USER: &[Permission] = &[Permission::InvoiceCreate, Permission::InvoiceResend];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::BillingManager => "billing_manager",
            Role::Viewer => "viewer",
            Role::ApiUser => "api_user",
        }
    }

    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => ADMIN,
            Role::BillingManager => BILLING_MANAGER,
            Role::Viewer => VIEWER,
            Role::ApiUser => API_USER,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "billing_manager" => Ok(Role::BillingManager),
            "viewer" => Ok(Role::Viewer),
            "api_user" => Ok(Role::ApiUser),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::InvoiceCreate => "invoice:create",
            Permission::InvoiceRead => "invoice:read",
            Permission::InvoiceUpdate => "invoice:update",
            Permission::InvoiceDelete => "invoice:delete",
            Permission::InvoiceResend => "invoice:resend",
            Permission::LogsRead => "logs:read",
            Permission::LogsExport => "logs:export",
            Permission::SettingsRead => "settings:read",
            Permission::SettingsUpdate => "settings:update",
            Permission::UserManage => "user:manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    role.permissions().contains(&permission)
}

/// Fail with `Forbidden` unless `role` carries `permission`
pub fn require(role: Role, permission: Permission) -> Result<()> {
    if has_permission(role, permission) {
        Ok(())
    } else {
        Err(BillingError::Forbidden(permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_holds_every_permission() {
        for permission in ADMIN {
            assert!(has_permission(Role::Admin, *permission));
        }
        assert_eq!(ADMIN.len(), 10);
    }

    #[test]
    fn billing_manager_cannot_delete_or_manage_users() {
        assert!(has_permission(Role::BillingManager, Permission::InvoiceResend));
        assert!(!has_permission(Role::BillingManager, Permission::InvoiceDelete));
        assert!(!has_permission(Role::BillingManager, Permission::UserManage));
        assert!(!has_permission(Role::BillingManager, Permission::LogsExport));
    }

    #[test]
    fn viewer_is_read_only() {
        assert!(has_permission(Role::Viewer, Permission::InvoiceRead));
        assert!(has_permission(Role::Viewer, Permission::LogsRead));
        assert!(!has_permission(Role::Viewer, Permission::InvoiceCreate));
    }

    #[test]
    fn api_user_creates_and_resends_only() {
        assert!(has_permission(Role::ApiUser, Permission::InvoiceCreate));
        assert!(has_permission(Role::ApiUser, Permission::InvoiceResend));
        assert!(!has_permission(Role::ApiUser, Permission::InvoiceRead));
        assert!(!has_permission(Role::ApiUser, Permission::LogsRead));
    }

    #[test]
    fn require_names_the_missing_permission() {
        let err = require(Role::Viewer, Permission::InvoiceResend).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient permissions. Required: invoice:resend");
    }

    #[test]
    fn roles_parse_from_their_labels() {
        for role in [Role::Admin, Role::BillingManager, Role::Viewer, Role::ApiUser] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("root".parse::<Role>().is_err());
    }
}
