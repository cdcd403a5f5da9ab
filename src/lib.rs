//! Client-side authentication session and profile layer for the Campus
//! web app.
//!
//! The crate wraps two injected collaborators — an identity provider
//! ([`IdentityProvider`]) and a profile document store ([`ProfileStore`]) —
//! behind a small set of session operations ([`Auth`]), reconciles the
//! provider's transient identity assertions into durable [`Profile`]
//! records, and exposes a reactive [`SessionContext`] for presentation
//! code. Federated sign-in failures are classified into a stable
//! [`AuthErrorKind`] taxonomy; redirect-based flows suspend as a value
//! ([`GoogleSignIn::Suspended`]) instead of failing.

pub mod context;
pub mod error;
pub mod profile;
pub mod provider;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod subscription;

#[doc(inline)]
pub use context::{SessionContext, SessionState, StateListener};

#[doc(inline)]
pub use error::{classify, AuthError, AuthErrorKind, AuthResult};

#[doc(inline)]
pub use profile::{Profile, Role, USERS_COLLECTION};

#[doc(inline)]
pub use provider::{
    AssertionListener, IdentityAssertion, IdentityProvider, InMemoryIdentityProvider,
    InteractiveOutcome, ProviderFailure, SignInStrategy,
};

#[doc(inline)]
pub use reconcile::ProfileReconciler;

#[doc(inline)]
pub use session::{Auth, AuthBuilder, GoogleSignIn};

#[doc(inline)]
pub use store::{
    Fields, InMemoryProfileStore, ProfileStore, StoreError, StoreErrorCode, StoreResult,
};

#[doc(inline)]
pub use subscription::{ProfileListener, ProfileListeners, Unsubscribe};
