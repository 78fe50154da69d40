use serde::Serialize;

/// The resolved identity and tenant for one gateway session.
///
/// Created once at bootstrap, read-only afterwards, passed by reference into
/// every scoped call. Never held as ambient mutable state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    pub uid: i64,
    pub login: String,
    pub tenant_id: i64,
}

impl SessionContext {
    pub fn new(uid: i64, login: impl Into<String>, tenant_id: i64) -> Self {
        Self { uid, login: login.into(), tenant_id }
    }
}
