use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{AuthError, AuthErrorKind, AuthResult};
use crate::profile::{Profile, Role};
use crate::provider::SignInStrategy;
use crate::session::{Auth, GoogleSignIn};
use crate::subscription::Unsubscribe;

/// Reactive view of the session exposed to presentation code.
///
/// Presentation treats this as read-only; it is mutated only by the
/// context's operations and the auth-state feed callback.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub profile: Option<Profile>,
    pub busy: bool,
}

pub type StateListener = Arc<dyn Fn(&SessionState) + Send + Sync + 'static>;

struct ContextShared {
    state: Mutex<SessionState>,
    listeners: Mutex<Vec<(usize, StateListener)>>,
    next_listener_id: AtomicUsize,
}

impl ContextShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                profile: None,
                busy: true,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicUsize::new(1),
        }
    }

    fn apply(&self, profile: Option<Profile>, busy: bool) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.profile = profile;
            state.busy = busy;
            state.clone()
        };
        self.notify(&snapshot);
    }

    fn set_busy(&self, busy: bool) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.busy = busy;
            state.clone()
        };
        self.notify(&snapshot);
    }

    fn notify(&self, snapshot: &SessionState) {
        let listeners = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

/// Owns the single per-client [`SessionState`] and mediates the two
/// federated sign-in strategies on top of [`Auth`].
///
/// Starts busy; [`init`](Self::init) either adopts a profile from a
/// completed redirect or attaches the live feed and clears `busy` on its
/// first event. Dropping the context detaches the feed.
pub struct SessionContext {
    auth: Arc<Auth>,
    shared: Arc<ContextShared>,
    feed: Mutex<Option<Unsubscribe>>,
}

impl SessionContext {
    pub fn new(auth: Arc<Auth>) -> Self {
        Self {
            auth,
            shared: Arc::new(ContextShared::new()),
            feed: Mutex::new(None),
        }
    }

    /// Startup sequence: resolve a completed redirect first; only when
    /// there is none does the live feed get attached, avoiding a race
    /// between the redirect result and the feed's first event.
    pub fn init(&self) -> AuthResult<()> {
        match self.auth.check_pending_redirect() {
            Ok(Some(profile)) => {
                debug!("adopting profile {} from completed redirect", profile.id);
                self.shared.apply(Some(profile), false);
                Ok(())
            }
            Ok(None) => {
                self.attach_feed();
                Ok(())
            }
            Err(err) => {
                warn!("redirect resolution failed at startup: {err}");
                self.attach_feed();
                Err(err)
            }
        }
    }

    fn attach_feed(&self) {
        let shared = self.shared.clone();
        let unsubscribe = self.auth.on_profile_changed(Arc::new(move |profile| {
            shared.apply(profile.cloned(), false);
        }));
        *self.feed.lock().unwrap() = Some(unsubscribe);
    }

    pub fn sign_in(&self, email: &str, password: &str) -> AuthResult<Profile> {
        self.shared.set_busy(true);
        match self.auth.sign_in_with_password(email, password) {
            Ok(profile) => {
                self.shared.apply(Some(profile.clone()), false);
                Ok(profile)
            }
            Err(err) => {
                self.shared.set_busy(false);
                Err(err)
            }
        }
    }

    /// Creates the account; the caller stays signed out and the state keeps
    /// no profile, so the UI can show a confirmation step.
    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: Option<Role>,
    ) -> AuthResult<Profile> {
        self.shared.set_busy(true);
        let result =
            self.auth
                .sign_up_with_password(email, password, display_name, role.unwrap_or_default());
        match &result {
            Ok(_) => self.shared.apply(None, false),
            Err(_) => self.shared.set_busy(false),
        }
        result
    }

    /// Google sign-in with the pop-up first policy: a blocked pop-up is
    /// retried once via redirect. A suspended retry resolves as pending
    /// and deliberately leaves `busy` set for the rest of this page's
    /// lifetime; the page is about to navigate away.
    pub fn sign_in_with_google(&self) -> AuthResult<GoogleSignIn> {
        self.shared.set_busy(true);
        match self.auth.sign_in_with_google(SignInStrategy::Popup) {
            Ok(GoogleSignIn::Completed(profile)) => {
                self.shared.apply(Some(profile.clone()), false);
                Ok(GoogleSignIn::Completed(profile))
            }
            Ok(GoogleSignIn::Suspended) => Ok(GoogleSignIn::Suspended),
            Err(AuthError::Google(AuthErrorKind::PopupBlocked)) => {
                debug!("pop-up blocked, retrying via redirect");
                match self.auth.sign_in_with_google(SignInStrategy::Redirect) {
                    Ok(GoogleSignIn::Suspended) => Ok(GoogleSignIn::Suspended),
                    Ok(GoogleSignIn::Completed(profile)) => {
                        self.shared.apply(Some(profile.clone()), false);
                        Ok(GoogleSignIn::Completed(profile))
                    }
                    Err(err) => {
                        warn!("redirect fallback failed: {err}");
                        self.shared.set_busy(false);
                        Err(AuthError::Google(AuthErrorKind::Generic(
                            "Google sign-in failed".to_string(),
                        )))
                    }
                }
            }
            Err(err) => {
                self.shared.set_busy(false);
                Err(err)
            }
        }
    }

    pub fn sign_out(&self) -> AuthResult<()> {
        self.shared.set_busy(true);
        match self.auth.sign_out() {
            Ok(()) => {
                self.shared.apply(None, false);
                Ok(())
            }
            Err(err) => {
                self.shared.set_busy(false);
                Err(err)
            }
        }
    }

    pub fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        self.shared.set_busy(true);
        let result = self.auth.request_password_reset(email);
        self.shared.set_busy(false);
        result
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.lock().unwrap().clone()
    }

    pub fn current_profile(&self) -> Option<Profile> {
        self.state().profile
    }

    pub fn busy(&self) -> bool {
        self.state().busy
    }

    /// Notifies on every state change. The listener runs synchronously and
    /// must not block.
    pub fn on_state_changed(&self, listener: StateListener) -> Unsubscribe {
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.shared.listeners.lock().unwrap().push((id, listener));

        let shared = Arc::downgrade(&self.shared);
        Box::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared
                    .listeners
                    .lock()
                    .unwrap()
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        if let Some(detach) = self.feed.lock().unwrap().take() {
            detach();
        }
    }
}
