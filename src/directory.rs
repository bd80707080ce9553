use crate::types::{ProfileDefaults, RegisteredUser};
use chrono::NaiveDate;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

/// Source of registered users and the profile details used to prefill
/// booking requests.
pub trait Directory: Send + Sync + 'static {
    fn find_user(&self, id: Uuid) -> Option<RegisteredUser>;

    /// Best effort. A user without a profile simply gets empty defaults.
    fn profile_defaults(&self, id: Uuid) -> ProfileDefaults;
}

#[derive(Debug, Default)]
struct Accounts {
    users: HashMap<Uuid, RegisteredUser>,
    profiles: HashMap<Uuid, ProfileDefaults>,
}

#[derive(Debug, Clone, Default)]
pub struct LocalDirectory {
    accounts: Arc<Mutex<Accounts>>,
}

impl LocalDirectory {
    fn lock(&self) -> MutexGuard<'_, Accounts> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds two accounts with fixed ids, one of them with a complete
    /// profile, and returns them.
    pub fn insert_example_users(&self) -> Vec<RegisteredUser> {
        let john = RegisteredUser {
            id: Uuid::from_u128(0x6a1f_3c2e_9b4d_4e7a_8c15_2f60_d1b3_0001),
            username: "jdoe".into(),
            full_name: "John Doe".into(),
            email: "john.doe@example.com".into(),
        };
        let alice = RegisteredUser {
            id: Uuid::from_u128(0x6a1f_3c2e_9b4d_4e7a_8c15_2f60_d1b3_0002),
            username: "asmith".into(),
            full_name: String::new(),
            email: "alice.smith@example.com".into(),
        };
        self.add_user(
            john.clone(),
            Some(ProfileDefaults {
                phone: Some("0412 000 111".into()),
                date_of_birth: NaiveDate::from_ymd_opt(1985, 3, 14),
            }),
        );
        self.add_user(alice.clone(), None);
        vec![john, alice]
    }

    pub fn add_user(&self, user: RegisteredUser, profile: Option<ProfileDefaults>) {
        let mut accounts = self.lock();
        if let Some(profile) = profile {
            accounts.profiles.insert(user.id, profile);
        }
        accounts.users.insert(user.id, user);
    }
}

impl Directory for LocalDirectory {
    fn find_user(&self, id: Uuid) -> Option<RegisteredUser> {
        self.lock().users.get(&id).cloned()
    }

    fn profile_defaults(&self, id: Uuid) -> ProfileDefaults {
        self.lock().profiles.get(&id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::registered_user;

    #[test]
    fn test_profile_defaults_are_optional() {
        let directory = LocalDirectory::default();
        let with_profile = registered_user();
        let without_profile = RegisteredUser {
            id: Uuid::new_v4(),
            ..registered_user()
        };
        let profile = ProfileDefaults {
            phone: Some("0412 345 678".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1980, 4, 2),
        };
        directory.add_user(with_profile.clone(), Some(profile.clone()));
        directory.add_user(without_profile.clone(), None);

        assert_eq!(directory.find_user(with_profile.id), Some(with_profile.clone()));
        assert_eq!(directory.profile_defaults(with_profile.id), profile);
        assert_eq!(
            directory.profile_defaults(without_profile.id),
            ProfileDefaults::default()
        );
        assert_eq!(directory.find_user(Uuid::new_v4()), None);
    }

    #[test]
    fn test_example_users_are_resolvable() {
        let directory = LocalDirectory::default();
        let users = directory.insert_example_users();
        assert_eq!(users.len(), 2);

        for user in &users {
            assert_eq!(directory.find_user(user.id).as_ref(), Some(user));
        }
        assert!(directory.profile_defaults(users[0].id).date_of_birth.is_some());
        assert_eq!(users[1].display_name(), "asmith");
        assert_eq!(
            directory.profile_defaults(users[1].id),
            ProfileDefaults::default()
        );
    }
}
