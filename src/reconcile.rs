use std::sync::Arc;

use chrono::Utc;
use log::debug;

use crate::error::{AuthError, AuthResult};
use crate::profile::{timestamp_value, Profile, Role};
use crate::provider::IdentityAssertion;
use crate::store::{internal_error, Fields, ProfileStore};

/// Read-merge-write policy turning a provider assertion plus any stored
/// profile into the profile the application should see.
///
/// Reconciliation is idempotent under repeated calls with the same
/// assertion content, except for the monotonically advancing `last_login`.
pub struct ProfileReconciler {
    store: Arc<dyn ProfileStore>,
    collection: String,
}

impl ProfileReconciler {
    pub fn new(store: Arc<dyn ProfileStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Pure read path: resolves the stored profile for an assertion without
    /// ever writing. Used by the auth-state subscription.
    pub fn lookup(&self, assertion: &IdentityAssertion) -> AuthResult<Option<Profile>> {
        let Some(fields) = self.store.get(&self.collection, &assertion.uid)? else {
            return Ok(None);
        };
        let profile = Profile::from_fields(fields)
            .map_err(|err| internal_error(format!("malformed profile document: {err}")))?;
        Ok(Some(profile))
    }

    /// Creates the profile on first contact, refreshes it otherwise.
    pub fn reconcile(
        &self,
        assertion: &IdentityAssertion,
        default_role: Role,
    ) -> AuthResult<Profile> {
        match self.lookup(assertion)? {
            Some(existing) => self.refresh(assertion, existing),
            None => self.create(assertion, default_role),
        }
    }

    /// Refresh-only variant for the password sign-in path, where an account
    /// without a stored profile is a failure rather than a reason to create
    /// one.
    pub fn reconcile_existing(&self, assertion: &IdentityAssertion) -> AuthResult<Profile> {
        match self.lookup(assertion)? {
            Some(existing) => self.refresh(assertion, existing),
            None => Err(AuthError::ProfileUnresolved),
        }
    }

    fn create(&self, assertion: &IdentityAssertion, role: Role) -> AuthResult<Profile> {
        let now = Utc::now();
        let profile = Profile {
            id: assertion.uid.clone(),
            email: assertion.email.clone().unwrap_or_default(),
            display_name: assertion.display_name.clone().unwrap_or_default(),
            role,
            photo_url: non_empty(assertion.photo_url.as_deref()),
            created_at: now,
            last_login: now,
            email_verified: true,
        };
        self.store
            .set(&self.collection, &profile.id, profile.to_fields(), false)?;
        debug!("created profile {} with role {}", profile.id, profile.role);
        Ok(profile)
    }

    /// Preserves `role`, `created_at` and `email`, falls back to stored
    /// `display_name`/`photo_url` when the assertion omits them, and
    /// merge-writes only the fields that actually moved.
    fn refresh(&self, assertion: &IdentityAssertion, existing: Profile) -> AuthResult<Profile> {
        let now = Utc::now();
        let display_name = non_empty(assertion.display_name.as_deref())
            .unwrap_or_else(|| existing.display_name.clone());
        let photo_url =
            non_empty(assertion.photo_url.as_deref()).or_else(|| existing.photo_url.clone());

        let mut delta = Fields::new();
        delta.insert("lastLogin".to_string(), timestamp_value(&now));
        if display_name != existing.display_name {
            delta.insert("displayName".to_string(), display_name.clone().into());
        }
        if photo_url != existing.photo_url {
            if let Some(url) = &photo_url {
                delta.insert("photoURL".to_string(), url.clone().into());
            }
        }
        self.store.set(&self.collection, &existing.id, delta, true)?;

        Ok(Profile {
            display_name,
            photo_url,
            last_login: now,
            ..existing
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}
