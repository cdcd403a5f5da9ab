use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{classify, AuthError, AuthResult};
use crate::profile::{Profile, Role, USERS_COLLECTION};
use crate::provider::{IdentityProvider, InteractiveOutcome, SignInStrategy};
use crate::reconcile::ProfileReconciler;
use crate::store::ProfileStore;
use crate::subscription::{ProfileListener, ProfileListeners, Unsubscribe};

/// Outcome of a federated sign-in from the caller's point of view.
///
/// `Suspended` means the flow navigated away from the page; the result
/// arrives via [`Auth::check_pending_redirect`] on the next load. It is
/// pending work, not an error, and must not be surfaced as one.
#[derive(Debug, Clone, PartialEq)]
pub enum GoogleSignIn {
    Completed(Profile),
    Suspended,
}

/// Session operations over the identity provider and the profile store.
///
/// Construct via [`Auth::builder`]; collaborators are injected explicitly,
/// there is no global instance. Within one operation the provider call,
/// store read and store write happen strictly in sequence; concurrent
/// operations interleave with last-write-wins per merged field.
pub struct Auth {
    provider: Arc<dyn IdentityProvider>,
    reconciler: Arc<ProfileReconciler>,
    listeners: Arc<ProfileListeners>,
    feed_guard: Mutex<Option<Unsubscribe>>,
}

impl Auth {
    pub fn builder(provider: Arc<dyn IdentityProvider>, store: Arc<dyn ProfileStore>) -> AuthBuilder {
        AuthBuilder::new(provider, store)
    }

    /// Password sign-in. The account must already have a stored profile;
    /// provider failures surface their own message rather than a
    /// classified kind.
    pub fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Profile> {
        debug!("password sign-in for {email}");
        let assertion = self
            .provider
            .authenticate_with_password(email, password)
            .map_err(|failure| AuthError::Credentials(failure.message))?;

        self.reconciler.reconcile_existing(&assertion).map_err(|err| {
            if !matches!(err, AuthError::ProfileUnresolved) {
                warn!("profile resolution failed for {}: {err}", assertion.uid);
            }
            AuthError::ProfileUnresolved
        })
    }

    /// Creates the account and its profile, then terminates the provider
    /// session so the caller confirms the new credentials with an explicit
    /// sign-in.
    pub fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: Role,
    ) -> AuthResult<Profile> {
        debug!("sign-up for {email} with role {role}");
        let mut assertion = self
            .provider
            .create_account(email, password)
            .map_err(|failure| AuthError::Credentials(failure.message))?;
        self.provider
            .set_display_name(display_name)
            .map_err(|failure| AuthError::Credentials(failure.message))?;
        assertion.display_name = Some(display_name.to_string());

        let profile = self.reconciler.reconcile(&assertion, role)?;

        self.provider
            .sign_out()
            .map_err(|failure| AuthError::Credentials(failure.message))?;
        Ok(profile)
    }

    /// Interactive Google sign-in. Pop-up completions reconcile with the
    /// default `student` role (applied only when the profile is brand new);
    /// redirect flows suspend; failures are classified.
    pub fn sign_in_with_google(&self, strategy: SignInStrategy) -> AuthResult<GoogleSignIn> {
        debug!("google sign-in via {strategy:?}");
        match self.provider.begin_interactive(strategy) {
            Ok(InteractiveOutcome::Completed(assertion)) => {
                let profile = self.reconciler.reconcile(&assertion, Role::Student)?;
                Ok(GoogleSignIn::Completed(profile))
            }
            Ok(InteractiveOutcome::Suspended) => Ok(GoogleSignIn::Suspended),
            Err(failure) => {
                let kind = classify(&failure);
                warn!("google sign-in failed: {kind} [{}]", failure.code);
                Err(AuthError::Google(kind))
            }
        }
    }

    /// Resolves a redirect-based sign-in that completed before this load,
    /// if any. Absence of a pending result is not an error.
    pub fn check_pending_redirect(&self) -> AuthResult<Option<Profile>> {
        match self.provider.poll_pending_redirect() {
            Ok(Some(assertion)) => {
                debug!("pending redirect resolved for {}", assertion.uid);
                self.reconciler.reconcile(&assertion, Role::Student).map(Some)
            }
            Ok(None) => Ok(None),
            Err(failure) => {
                let kind = classify(&failure);
                warn!("pending redirect check failed: {kind} [{}]", failure.code);
                Err(AuthError::Google(kind))
            }
        }
    }

    /// Terminates the provider session. Idempotent: signing out without a
    /// session succeeds.
    pub fn sign_out(&self) -> AuthResult<()> {
        self.provider
            .sign_out()
            .map_err(|failure| AuthError::Credentials(failure.message))
    }

    /// One-shot read of the current session, reconciled through the same
    /// idempotent rule as any other sign-in.
    pub fn current_profile(&self) -> AuthResult<Option<Profile>> {
        match self.provider.current_assertion() {
            Some(assertion) => self.reconciler.reconcile(&assertion, Role::Student).map(Some),
            None => Ok(None),
        }
    }

    pub fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        debug!("password reset requested for {email}");
        self.provider
            .request_password_reset(email)
            .map_err(|failure| AuthError::Credentials(failure.message))
    }

    /// Subscribes to resolved profile changes driven by the provider's
    /// auth-state feed. A null provider session delivers absence without
    /// touching the store.
    pub fn on_profile_changed(&self, listener: ProfileListener) -> Unsubscribe {
        self.listeners.subscribe(listener)
    }
}

impl Drop for Auth {
    fn drop(&mut self) {
        if let Some(detach) = self.feed_guard.lock().unwrap().take() {
            detach();
        }
    }
}

pub struct AuthBuilder {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    collection: String,
}

impl AuthBuilder {
    fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            provider,
            store,
            collection: USERS_COLLECTION.to_string(),
        }
    }

    /// Overrides the profile collection name.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn build(self) -> Arc<Auth> {
        let reconciler = Arc::new(ProfileReconciler::new(self.store, self.collection));
        let listeners = Arc::new(ProfileListeners::default());

        let feed_reconciler = reconciler.clone();
        let feed_listeners = listeners.clone();
        let detach = self.provider.observe(Arc::new(move |assertion| {
            let profile = match assertion {
                None => None,
                Some(assertion) => match feed_reconciler.lookup(assertion) {
                    Ok(profile) => profile,
                    Err(err) => {
                        warn!("auth-state resolution failed for {}: {err}", assertion.uid);
                        None
                    }
                },
            };
            feed_listeners.notify(profile.as_ref());
        }));

        Arc::new(Auth {
            provider: self.provider,
            reconciler,
            listeners,
            feed_guard: Mutex::new(Some(detach)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use crate::error::AuthErrorKind;
    use crate::provider::{IdentityAssertion, InMemoryIdentityProvider, ProviderFailure};
    use crate::store::InMemoryProfileStore;

    fn harness() -> (Arc<InMemoryIdentityProvider>, Arc<InMemoryProfileStore>, Arc<Auth>) {
        let provider = InMemoryIdentityProvider::shared();
        let store = InMemoryProfileStore::shared();
        let auth = Auth::builder(provider.clone(), store.clone()).build();
        (provider, store, auth)
    }

    fn google_assertion(uid: &str) -> IdentityAssertion {
        IdentityAssertion {
            uid: uid.to_string(),
            email: Some(format!("{uid}@gmail.com")),
            display_name: Some("G User".to_string()),
            photo_url: Some("https://example.com/g.png".to_string()),
            email_verified: true,
        }
    }

    #[test]
    fn sign_up_returns_the_profile_and_leaves_no_session() {
        let (provider, _store, auth) = harness();

        let profile = auth
            .sign_up_with_password("a@x.com", "secret1", "Ann", Role::Student)
            .unwrap();
        assert_eq!(profile.email, "a@x.com");
        assert_eq!(profile.display_name, "Ann");
        assert_eq!(profile.role, Role::Student);
        assert!(profile.email_verified);

        assert!(provider.current_assertion().is_none());
        assert_eq!(auth.current_profile().unwrap(), None);
    }

    #[test]
    fn sign_in_after_sign_up_reuses_the_profile() {
        let (_provider, _store, auth) = harness();
        let created = auth
            .sign_up_with_password("a@x.com", "secret1", "Ann", Role::Student)
            .unwrap();

        let signed_in = auth.sign_in_with_password("a@x.com", "secret1").unwrap();
        assert_eq!(signed_in.id, created.id);
        assert_eq!(signed_in.created_at, created.created_at);
        assert!(signed_in.last_login >= created.created_at);
    }

    #[test]
    fn password_failures_surface_the_provider_message() {
        let (_provider, _store, auth) = harness();
        auth.sign_up_with_password("a@x.com", "secret1", "Ann", Role::Student)
            .unwrap();

        let err = auth.sign_in_with_password("a@x.com", "wrong!").unwrap_err();
        match err {
            AuthError::Credentials(message) => {
                assert!(message.contains("password is invalid"));
            }
            other => panic!("expected credentials error, got {other:?}"),
        }
    }

    #[test]
    fn password_sign_in_without_a_profile_fails_generically() {
        let (provider, _store, auth) = harness();
        // Provider account exists but nothing was ever stored for it.
        provider.create_account("ghost@x.com", "secret1").unwrap();
        provider.sign_out().unwrap();

        let err = auth.sign_in_with_password("ghost@x.com", "secret1").unwrap_err();
        assert!(matches!(err, AuthError::ProfileUnresolved));
    }

    #[test]
    fn google_popup_creates_a_student_profile() {
        let (provider, _store, auth) = harness();
        provider.script_interactive(Ok(InteractiveOutcome::Completed(google_assertion("g-1"))));

        let outcome = auth.sign_in_with_google(SignInStrategy::Popup).unwrap();
        let GoogleSignIn::Completed(profile) = outcome else {
            panic!("expected completed sign-in");
        };
        assert_eq!(profile.role, Role::Student);
        assert_eq!(profile.display_name, "G User");
    }

    #[test]
    fn google_popup_preserves_an_existing_admin_role() {
        let (provider, store, auth) = harness();
        provider.script_interactive(Ok(InteractiveOutcome::Completed(google_assertion("g-1"))));
        auth.sign_in_with_google(SignInStrategy::Popup).unwrap();

        // Promote out of band, then sign in again.
        store
            .set(
                crate::profile::USERS_COLLECTION,
                "g-1",
                [("role".to_string(), serde_json::json!("admin"))]
                    .into_iter()
                    .collect(),
                true,
            )
            .unwrap();

        provider.script_interactive(Ok(InteractiveOutcome::Completed(google_assertion("g-1"))));
        let GoogleSignIn::Completed(profile) =
            auth.sign_in_with_google(SignInStrategy::Popup).unwrap()
        else {
            panic!("expected completed sign-in");
        };
        assert_eq!(profile.role, Role::Admin);
    }

    #[test]
    fn google_failures_are_classified() {
        let (provider, _store, auth) = harness();
        provider.script_interactive(Err(ProviderFailure::new(
            "auth/account-exists-with-different-credential",
            "An account already exists.",
        )));

        let err = auth.sign_in_with_google(SignInStrategy::Popup).unwrap_err();
        assert!(matches!(
            err,
            AuthError::Google(AuthErrorKind::AccountExists)
        ));
    }

    #[test]
    fn redirect_strategy_suspends_without_error() {
        let (_provider, store, auth) = harness();
        let outcome = auth.sign_in_with_google(SignInStrategy::Redirect).unwrap();
        assert_eq!(outcome, GoogleSignIn::Suspended);
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn pending_redirect_reconciles_like_a_popup() {
        let (provider, _store, auth) = harness();
        provider.stage_pending_redirect(Ok(google_assertion("g-9")));

        let profile = auth.check_pending_redirect().unwrap().unwrap();
        assert_eq!(profile.id, "g-9");
        assert_eq!(profile.role, Role::Student);

        assert_eq!(auth.check_pending_redirect().unwrap(), None);
    }

    #[test]
    fn pending_redirect_failures_are_classified() {
        let (provider, _store, auth) = harness();
        provider.stage_pending_redirect(Err(ProviderFailure::new(
            "auth/unauthorized-domain",
            "This domain is not authorized.",
        )));

        let err = auth.check_pending_redirect().unwrap_err();
        assert!(matches!(
            err,
            AuthError::Google(AuthErrorKind::UnauthorizedDomain)
        ));
    }

    #[test]
    fn sign_out_is_idempotent() {
        let (_provider, _store, auth) = harness();
        assert!(auth.sign_out().is_ok());
        assert!(auth.sign_out().is_ok());
    }

    #[test]
    fn profile_feed_resolves_through_the_read_path_only() {
        let (provider, store, auth) = harness();
        auth.sign_up_with_password("a@x.com", "secret1", "Ann", Role::Student)
            .unwrap();

        let events: Arc<StdMutex<Vec<Option<String>>>> = Arc::new(StdMutex::new(Vec::new()));
        let captured = events.clone();
        let _keep = auth.on_profile_changed(Arc::new(move |profile| {
            captured
                .lock()
                .unwrap()
                .push(profile.map(|p| p.display_name.clone()));
        }));

        let writes_before = store.writes();
        provider
            .authenticate_with_password("a@x.com", "secret1")
            .unwrap();
        provider.sign_out().unwrap();

        let events = events.lock().unwrap();
        // Replay of the post-sign-up absence, then sign-in, then sign-out.
        assert_eq!(
            events.as_slice(),
            &[None, Some("Ann".to_string()), None]
        );
        // Feed resolution reads; only the sign-up wrote.
        assert_eq!(store.writes(), writes_before);
    }

    #[test]
    fn feed_delivers_absence_without_touching_the_store() {
        let (provider, store, auth) = harness();
        let _keep = auth.on_profile_changed(Arc::new(|_| {}));

        provider.script_interactive(Ok(InteractiveOutcome::Completed(google_assertion("g-1"))));
        auth.sign_in_with_google(SignInStrategy::Popup).unwrap();

        let reads_before = store.reads();
        provider.sign_out().unwrap();
        assert_eq!(store.reads(), reads_before);
    }

    #[test]
    fn request_password_reset_requires_a_known_account() {
        let (_provider, _store, auth) = harness();
        auth.sign_up_with_password("a@x.com", "secret1", "Ann", Role::Student)
            .unwrap();

        assert!(auth.request_password_reset("a@x.com").is_ok());
        assert!(matches!(
            auth.request_password_reset("nobody@x.com"),
            Err(AuthError::Credentials(_))
        ));
    }
}
