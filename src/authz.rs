use std::sync::Arc;

use crate::{
    auth::Identity,
    error::ApiError,
    models::{ResourceKind, Role},
};

/// Capability
///
/// The closed set of operations a role can be granted on a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Read,
    Write,
    Delete,
}

/// Permission
///
/// A capability on a specific resource kind, e.g. "write album".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission {
    pub kind: ResourceKind,
    pub capability: Capability,
}

impl Permission {
    pub fn read(kind: ResourceKind) -> Self {
        Self { kind, capability: Capability::Read }
    }

    pub fn write(kind: ResourceKind) -> Self {
        Self { kind, capability: Capability::Write }
    }

    pub fn delete(kind: ResourceKind) -> Self {
        Self { kind, capability: Capability::Delete }
    }
}

const ADMIN_CAPABILITIES: &[Capability] = &[Capability::Read, Capability::Write, Capability::Delete];
const EDITOR_CAPABILITIES: &[Capability] = &[Capability::Read, Capability::Write];
const VIEWER_CAPABILITIES: &[Capability] = &[Capability::Read];

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::Admin => ADMIN_CAPABILITIES,
            Role::Editor => EDITOR_CAPABILITIES,
            Role::Viewer => VIEWER_CAPABILITIES,
        }
    }
}

/// Authorizer
///
/// Answers yes/no for an identity and a required permission. Evaluated once per request,
/// before any resource lookup.
pub trait Authorizer: Send + Sync {
    fn permits(&self, identity: &Identity, permission: Permission) -> bool;

    fn authorize(&self, identity: &Identity, permission: Permission) -> Result<(), ApiError> {
        if self.permits(identity, permission) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// RolePolicy
///
/// The catalog's role matrix: admin reads, writes and deletes; editor reads and writes;
/// viewer only reads. User records are visible and mutable by admins only.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl Authorizer for RolePolicy {
    fn permits(&self, identity: &Identity, permission: Permission) -> bool {
        if permission.kind == ResourceKind::User && identity.role != Role::Admin {
            return false;
        }
        identity.role.capabilities().contains(&permission.capability)
    }
}

pub type AuthorizerState = Arc<dyn Authorizer>;
