//! Identity of the user on whose behalf a call was made.
use std::fmt;

/// The credentials of the remote user, as established by the transport during connection
/// negotiation.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct UserCredentials {
    real_user: Option<String>,
    effective_user: Option<String>,
}

impl UserCredentials {
    /// Credentials with neither a real nor an effective user.
    pub fn new() -> Self {
        UserCredentials::default()
    }

    /// Credentials for a real user acting as themselves.
    pub fn for_user<S>(real_user: S) -> Self
    where
        S: Into<String>,
    {
        UserCredentials {
            real_user: Some(real_user.into()),
            effective_user: None,
        }
    }

    /// Sets the user the caller is impersonating.
    pub fn with_effective_user<S>(mut self, effective_user: S) -> Self
    where
        S: Into<String>,
    {
        self.effective_user = Some(effective_user.into());
        self
    }

    /// The authenticated user.
    pub fn real_user(&self) -> Option<&str> {
        self.real_user.as_ref().map(String::as_str)
    }

    /// The user the call is made on behalf of, if different from the real user.
    pub fn effective_user(&self) -> Option<&str> {
        self.effective_user.as_ref().map(String::as_str)
    }
}

impl fmt::Display for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{real_user={}, eff_user={}}}",
            self.real_user().unwrap_or(""),
            self.effective_user().unwrap_or("")
        )
    }
}
