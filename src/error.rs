use std::fmt;

use crate::provider::ProviderFailure;
use crate::store::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Stable classification of federated sign-in failures.
///
/// Presentation code renders copy from these variants instead of matching on
/// provider wording, so a provider-side message change cannot break the UI.
/// `Generic` carries the original provider message for anything outside the
/// known code set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    PopupBlocked,
    RedirectInProgress,
    SignInCancelled,
    UnauthorizedDomain,
    ConfigurationError,
    NetworkError,
    AccountExists,
    OperationNotAllowed,
    InvalidCredentials,
    Generic(String),
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorKind::PopupBlocked => {
                write!(f, "The sign-in pop-up was blocked by the browser")
            }
            AuthErrorKind::RedirectInProgress => write!(f, "Redirect sign-in is in progress"),
            AuthErrorKind::SignInCancelled => write!(f, "Sign-in was cancelled"),
            AuthErrorKind::UnauthorizedDomain => {
                write!(f, "This domain is not authorized for sign-in")
            }
            AuthErrorKind::ConfigurationError => {
                write!(f, "Sign-in is not configured correctly")
            }
            AuthErrorKind::NetworkError => write!(f, "A network error interrupted sign-in"),
            AuthErrorKind::AccountExists => write!(
                f,
                "An account already exists with a different sign-in method"
            ),
            AuthErrorKind::OperationNotAllowed => {
                write!(f, "This sign-in method is not enabled")
            }
            AuthErrorKind::InvalidCredentials => {
                write!(f, "The credentials are invalid or the account is disabled")
            }
            AuthErrorKind::Generic(detail) => write!(f, "{detail}"),
        }
    }
}

/// Maps an opaque provider failure to an [`AuthErrorKind`].
///
/// Classification keys on the structured failure code, never on message
/// text; the message is purely presentational. Codes may carry the
/// provider's `auth/` namespace prefix or arrive bare. Unknown codes
/// degrade to [`AuthErrorKind::Generic`] with the original message.
pub fn classify(failure: &ProviderFailure) -> AuthErrorKind {
    let code = failure
        .code
        .strip_prefix("auth/")
        .unwrap_or(failure.code.as_str());

    match code {
        "popup-closed-by-user" | "cancelled-popup-request" | "user-cancelled" => {
            AuthErrorKind::SignInCancelled
        }
        "popup-blocked" => AuthErrorKind::PopupBlocked,
        "redirect-in-progress" => AuthErrorKind::RedirectInProgress,
        "network-request-failed" => AuthErrorKind::NetworkError,
        "operation-not-allowed" => AuthErrorKind::OperationNotAllowed,
        "unauthorized-domain" => AuthErrorKind::UnauthorizedDomain,
        "account-exists-with-different-credential" => AuthErrorKind::AccountExists,
        "invalid-api-key" | "invalid-oauth-client-id" => AuthErrorKind::ConfigurationError,
        "user-disabled" | "user-not-found" | "wrong-password" | "invalid-email" => {
            AuthErrorKind::InvalidCredentials
        }
        _ => AuthErrorKind::Generic(failure.message.clone()),
    }
}

/// Failure surface of the session operations.
///
/// The password path deliberately bypasses the classifier and carries the
/// provider's own message (`Credentials`); only federated sign-in failures
/// are classified (`Google`). See DESIGN.md for the rationale behind the
/// asymmetry.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Password-path failure, surfaced with the raw provider message.
    Credentials(String),
    /// Federated sign-in failure, classified into a stable kind.
    Google(AuthErrorKind),
    /// Document-store failure propagated unchanged.
    Store(StoreError),
    /// A password sign-in resolved a provider session with no usable
    /// stored profile behind it.
    ProfileUnresolved,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Credentials(message) => write!(f, "{message}"),
            AuthError::Google(kind) => write!(f, "{kind}"),
            AuthError::Store(err) => write!(f, "{err}"),
            AuthError::ProfileUnresolved => write!(f, "Failed to resolve profile"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(error: StoreError) -> Self {
        AuthError::Store(error)
    }
}
