use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    AssertionListener, IdentityAssertion, IdentityProvider, InteractiveOutcome, ProviderFailure,
    SignInStrategy,
};
use crate::subscription::Unsubscribe;

#[derive(Clone)]
struct Account {
    uid: String,
    password: String,
    display_name: Option<String>,
}

#[derive(Default)]
struct ProviderState {
    accounts: BTreeMap<String, Account>,
    session: Option<IdentityAssertion>,
    interactive: VecDeque<Result<InteractiveOutcome, ProviderFailure>>,
    pending_redirect: Option<Result<IdentityAssertion, ProviderFailure>>,
    listeners: Vec<(usize, AssertionListener)>,
}

/// In-process [`IdentityProvider`] used by tests and demos.
///
/// Password accounts live in a map; interactive (federated) flows are
/// scripted ahead of time via [`script_interactive`](Self::script_interactive)
/// so a test can drive the pop-up and redirect branches deterministically.
pub struct InMemoryIdentityProvider {
    state: Arc<Mutex<ProviderState>>,
    next_listener_id: AtomicUsize,
    next_uid: AtomicUsize,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState::default())),
            next_listener_id: AtomicUsize::new(1),
            next_uid: AtomicUsize::new(1),
        }
    }
}

impl InMemoryIdentityProvider {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the outcome of the next `begin_interactive` call.
    pub fn script_interactive(&self, outcome: Result<InteractiveOutcome, ProviderFailure>) {
        self.state.lock().unwrap().interactive.push_back(outcome);
    }

    /// Stages the result the next `poll_pending_redirect` call reports, as
    /// if a redirect sign-in finished before this load.
    pub fn stage_pending_redirect(&self, result: Result<IdentityAssertion, ProviderFailure>) {
        self.state.lock().unwrap().pending_redirect = Some(result);
    }

    fn notify(&self, session: Option<IdentityAssertion>) {
        let listeners = {
            let guard = self.state.lock().unwrap();
            guard
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect::<Vec<_>>()
        };
        for listener in listeners {
            listener(session.as_ref());
        }
    }

    fn adopt_session(&self, assertion: IdentityAssertion) {
        self.state.lock().unwrap().session = Some(assertion.clone());
        self.notify(Some(assertion));
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn authenticate_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAssertion, ProviderFailure> {
        let assertion = {
            let guard = self.state.lock().unwrap();
            let account = guard.accounts.get(email).ok_or_else(|| {
                ProviderFailure::new(
                    "auth/user-not-found",
                    "There is no user record corresponding to this identifier.",
                )
            })?;
            if account.password != password {
                return Err(ProviderFailure::new(
                    "auth/wrong-password",
                    "The password is invalid or the user does not have a password.",
                ));
            }
            IdentityAssertion {
                uid: account.uid.clone(),
                email: Some(email.to_string()),
                display_name: account.display_name.clone(),
                photo_url: None,
                email_verified: false,
            }
        };
        self.adopt_session(assertion.clone());
        Ok(assertion)
    }

    fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAssertion, ProviderFailure> {
        if password.len() < 6 {
            return Err(ProviderFailure::new(
                "auth/weak-password",
                "Password should be at least 6 characters.",
            ));
        }
        let assertion = {
            let mut guard = self.state.lock().unwrap();
            if guard.accounts.contains_key(email) {
                return Err(ProviderFailure::new(
                    "auth/email-already-in-use",
                    "The email address is already in use by another account.",
                ));
            }
            let uid = format!("uid-{}", self.next_uid.fetch_add(1, Ordering::SeqCst));
            guard.accounts.insert(
                email.to_string(),
                Account {
                    uid: uid.clone(),
                    password: password.to_string(),
                    display_name: None,
                },
            );
            IdentityAssertion {
                uid,
                email: Some(email.to_string()),
                display_name: None,
                photo_url: None,
                email_verified: false,
            }
        };
        self.adopt_session(assertion.clone());
        Ok(assertion)
    }

    fn set_display_name(&self, display_name: &str) -> Result<(), ProviderFailure> {
        let session = {
            let mut guard = self.state.lock().unwrap();
            let Some(mut session) = guard.session.clone() else {
                return Err(ProviderFailure::new(
                    "auth/no-current-user",
                    "No user currently signed in.",
                ));
            };
            session.display_name = Some(display_name.to_string());
            if let Some(email) = session.email.clone() {
                if let Some(account) = guard.accounts.get_mut(&email) {
                    account.display_name = Some(display_name.to_string());
                }
            }
            guard.session = Some(session.clone());
            session
        };
        self.notify(Some(session));
        Ok(())
    }

    fn request_password_reset(&self, email: &str) -> Result<(), ProviderFailure> {
        let guard = self.state.lock().unwrap();
        if guard.accounts.contains_key(email) {
            Ok(())
        } else {
            Err(ProviderFailure::new(
                "auth/user-not-found",
                "There is no user record corresponding to this identifier.",
            ))
        }
    }

    fn sign_out(&self) -> Result<(), ProviderFailure> {
        let had_session = {
            let mut guard = self.state.lock().unwrap();
            guard.session.take().is_some()
        };
        if had_session {
            self.notify(None);
        }
        Ok(())
    }

    fn begin_interactive(
        &self,
        strategy: SignInStrategy,
    ) -> Result<InteractiveOutcome, ProviderFailure> {
        let scripted = self.state.lock().unwrap().interactive.pop_front();
        match scripted {
            Some(Ok(InteractiveOutcome::Completed(assertion))) => {
                self.adopt_session(assertion.clone());
                Ok(InteractiveOutcome::Completed(assertion))
            }
            Some(Ok(InteractiveOutcome::Suspended)) => Ok(InteractiveOutcome::Suspended),
            Some(Err(failure)) => Err(failure),
            // Unscripted redirects behave like the real thing: the page
            // navigates away and nothing returns in-process.
            None => match strategy {
                SignInStrategy::Redirect => Ok(InteractiveOutcome::Suspended),
                SignInStrategy::Popup => Err(ProviderFailure::new(
                    "auth/internal-error",
                    "No interactive outcome available.",
                )),
            },
        }
    }

    fn poll_pending_redirect(&self) -> Result<Option<IdentityAssertion>, ProviderFailure> {
        let staged = self.state.lock().unwrap().pending_redirect.take();
        match staged {
            Some(Ok(assertion)) => {
                self.adopt_session(assertion.clone());
                Ok(Some(assertion))
            }
            Some(Err(failure)) => Err(failure),
            None => Ok(None),
        }
    }

    fn current_assertion(&self) -> Option<IdentityAssertion> {
        self.state.lock().unwrap().session.clone()
    }

    fn observe(&self, listener: AssertionListener) -> Unsubscribe {
        let (id, session) = {
            let mut guard = self.state.lock().unwrap();
            let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
            guard.listeners.push((id, listener.clone()));
            (id, guard.session.clone())
        };

        listener(session.as_ref());

        let state = Arc::downgrade(&self.state);
        Box::new(move || {
            if let Some(state) = state.upgrade() {
                state
                    .lock()
                    .unwrap()
                    .listeners
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }
}
