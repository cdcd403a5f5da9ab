mod in_memory;

pub use in_memory::InMemoryIdentityProvider;

use std::fmt;
use std::sync::Arc;

use crate::subscription::Unsubscribe;

/// Transient identity claim issued by the provider after a successful
/// authentication.
///
/// Assertions are never persisted directly; the reconciler folds them into
/// the durable [`Profile`](crate::profile::Profile) record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityAssertion {
    /// Stable subject identifier issued by the provider.
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    /// Whether the provider itself considers the email verified.
    pub email_verified: bool,
}

/// Opaque provider failure: a provider-defined code string plus a human
/// message. Callers classify on the code; the message is presentational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub code: String,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for ProviderFailure {}

/// How an interactive federated sign-in is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInStrategy {
    Popup,
    Redirect,
}

/// Result of an interactive federated sign-in attempt.
///
/// Redirect flows never return an assertion in-page; they suspend the
/// operation by navigating away, and the assertion surfaces through
/// [`IdentityProvider::poll_pending_redirect`] on the next load. Suspension
/// is a control signal, not a failure, which is why it lives in the success
/// variant space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveOutcome {
    Completed(IdentityAssertion),
    Suspended,
}

pub type AssertionListener = Arc<dyn Fn(Option<&IdentityAssertion>) + Send + Sync + 'static>;

/// Capability interface over the identity-provider SDK.
///
/// Production code wraps the real SDK; tests and demos use
/// [`InMemoryIdentityProvider`]. All methods are synchronous from the
/// caller's point of view; the provider is free to block.
pub trait IdentityProvider: Send + Sync {
    fn authenticate_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAssertion, ProviderFailure>;

    fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAssertion, ProviderFailure>;

    /// Updates the display name on the provider side for the current
    /// session's account.
    fn set_display_name(&self, display_name: &str) -> Result<(), ProviderFailure>;

    fn request_password_reset(&self, email: &str) -> Result<(), ProviderFailure>;

    /// Terminates the provider session. Must succeed when no session
    /// exists.
    fn sign_out(&self) -> Result<(), ProviderFailure>;

    fn begin_interactive(
        &self,
        strategy: SignInStrategy,
    ) -> Result<InteractiveOutcome, ProviderFailure>;

    /// Asks whether a redirect-based sign-in completed before this load.
    /// `Ok(None)` means no redirect was pending, which is not an error.
    fn poll_pending_redirect(&self) -> Result<Option<IdentityAssertion>, ProviderFailure>;

    /// One-shot read of the current provider session.
    fn current_assertion(&self) -> Option<IdentityAssertion>;

    /// Registers an observer on the provider's live auth-state feed.
    /// Implementations emit the current state to the new observer
    /// immediately, then on every subsequent change.
    fn observe(&self, listener: AssertionListener) -> Unsubscribe;
}
