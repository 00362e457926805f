use backoffice_auth::{CommandAuthorization, Permission};

/// Associates the permission a write needs with its payload.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, permission: Permission) -> Self {
        Self {
            inner,
            required: vec![permission],
        }
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}
