//! Authentication hook.
//!
//! Rally does not issue or verify credentials itself. The embedding
//! application implements [`Authenticator`] with whatever it trusts (a
//! session store, JWT validation, an upstream API) and the server calls
//! it once per connection, before any protocol message is exchanged.

use rally_protocol::Identity;

/// Why a connection could not be authenticated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The client offered no credential at all.
    #[error("no credential offered")]
    MissingCredential,

    /// The credential was present but not accepted.
    #[error("credential rejected: {0}")]
    Rejected(String),
}

/// Resolves a client credential to an [`Identity`].
///
/// The credential is the first `Sec-WebSocket-Protocol` value offered
/// during the upgrade, or the `token` query parameter when no subprotocol
/// was offered.
///
/// # Example
///
/// ```rust
/// use rally::{AuthError, Authenticator};
/// use rally_protocol::{Identity, UserId};
///
/// /// Accepts tokens of the form `<id>:<name>`. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
///         let (id, name) = token
///             .split_once(':')
///             .ok_or_else(|| AuthError::Rejected("expected <id>:<name>".into()))?;
///         let id: u64 = id
///             .parse()
///             .map_err(|_| AuthError::Rejected("id must be a number".into()))?;
///         Ok(Identity::new(UserId(id), name))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns who the client is.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, AuthError>> + Send;
}
