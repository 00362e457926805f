//! API-side authorization guard for writes.
//!
//! Checked at the request boundary, before the ledger service is called;
//! domain and infra crates stay auth-agnostic.

use backoffice_auth::{AuthzError, CommandAuthorization, Principal, authorize};

use crate::context::PrincipalContext;

/// Check that the request principal holds every permission `command` needs.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = Principal::from_roles(principal.user_id(), principal.roles().to_vec());

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}
