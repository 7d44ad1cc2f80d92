use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};

use crate::limits::MAX_USER_LEN;

/// One shared password for every login. The startup `user` becomes the
/// booking session's identity, so it must be present and reasonably short.
#[derive(Debug)]
pub struct HallbookAuthSource {
    password: String,
}

impl HallbookAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for HallbookAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let user = login.user().map(|u| u.to_string()).unwrap_or_default();
        if user.is_empty() || user.len() > MAX_USER_LEN {
            metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
            return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                "FATAL".into(),
                "28000".into(),
                "invalid user name".into(),
            ))));
        }
        tracing::debug!("login attempt for {user}");
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
