use std::sync::{Arc, Mutex};

use crate::profile::Profile;

pub type ProfileListener = Arc<dyn Fn(Option<&Profile>) + Send + Sync + 'static>;
pub type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct ListenerTable {
    next_id: usize,
    entries: Vec<(usize, ProfileListener)>,
    /// Last delivered snapshot, replayed to late subscribers. `None` until
    /// the provider feed has reported at least once.
    last: Option<Option<Profile>>,
}

/// Fan-out registry for resolved profile snapshots.
///
/// Listeners are invoked synchronously in registration order and each
/// receives every event independently. A subscriber registered after the
/// first provider event immediately receives the last known snapshot, so
/// consumers never wait on a change that already happened.
#[derive(Default)]
pub struct ProfileListeners {
    inner: Arc<Mutex<ListenerTable>>,
}

impl ProfileListeners {
    /// Registers a listener and returns its removal handle.
    ///
    /// The handle removes exactly the one registration; dropping it without
    /// calling leaves the listener attached.
    pub fn subscribe(&self, listener: ProfileListener) -> Unsubscribe {
        let (id, replay) = {
            let mut table = self.inner.lock().unwrap();
            let id = table.next_id;
            table.next_id += 1;
            table.entries.push((id, listener.clone()));
            (id, table.last.clone())
        };

        if let Some(snapshot) = replay {
            listener(snapshot.as_ref());
        }

        let inner = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .lock()
                    .unwrap()
                    .entries
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Records the snapshot and notifies every current listener, outside the
    /// table lock so callbacks may subscribe or unsubscribe.
    pub fn notify(&self, profile: Option<&Profile>) {
        let listeners = {
            let mut table = self.inner.lock().unwrap();
            table.last = Some(profile.cloned());
            table
                .entries
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect::<Vec<_>>()
        };

        for listener in listeners {
            listener(profile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::profile::Role;

    fn sample_profile() -> Profile {
        let now = Utc::now();
        Profile {
            id: "uid-1".into(),
            email: "a@x.com".into(),
            display_name: "Ann".into(),
            role: Role::Student,
            photo_url: None,
            created_at: now,
            last_login: now,
            email_verified: true,
        }
    }

    #[test]
    fn listeners_receive_events_in_registration_order() {
        let listeners = ProfileListeners::default();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let first = order.clone();
        let _keep_first = listeners.subscribe(Arc::new(move |_| {
            first.lock().unwrap().push("first");
        }));
        let second = order.clone();
        let _keep_second = listeners.subscribe(Arc::new(move |_| {
            second.lock().unwrap().push("second");
        }));

        listeners.notify(Some(&sample_profile()));
        assert_eq!(order.lock().unwrap().as_slice(), &["first", "second"]);
    }

    #[test]
    fn unsubscribed_listener_sees_no_later_events() {
        let listeners = ProfileListeners::default();
        let calls = Arc::new(Mutex::new(0usize));

        let counter = calls.clone();
        let unsubscribe = listeners.subscribe(Arc::new(move |_| {
            *counter.lock().unwrap() += 1;
        }));
        unsubscribe();

        listeners.notify(Some(&sample_profile()));
        listeners.notify(None);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn late_subscriber_gets_last_snapshot_replayed() {
        let listeners = ProfileListeners::default();
        listeners.notify(Some(&sample_profile()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let capture = seen.clone();
        let _keep = listeners.subscribe(Arc::new(move |profile| {
            capture.lock().unwrap().push(profile.map(|p| p.id.clone()));
        }));

        assert_eq!(seen.lock().unwrap().as_slice(), &[Some("uid-1".to_string())]);
    }

    #[test]
    fn subscriber_before_any_event_gets_no_replay() {
        let listeners = ProfileListeners::default();
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let _keep = listeners.subscribe(Arc::new(move |_| {
            *counter.lock().unwrap() += 1;
        }));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn removal_targets_only_the_one_listener() {
        let listeners = ProfileListeners::default();
        let calls = Arc::new(Mutex::new((0usize, 0usize)));

        let first = calls.clone();
        let unsubscribe = listeners.subscribe(Arc::new(move |_| {
            first.lock().unwrap().0 += 1;
        }));
        let second = calls.clone();
        let _keep = listeners.subscribe(Arc::new(move |_| {
            second.lock().unwrap().1 += 1;
        }));

        unsubscribe();
        listeners.notify(None);
        assert_eq!(*calls.lock().unwrap(), (0, 1));
    }
}
