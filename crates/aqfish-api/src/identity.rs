use std::collections::HashMap;
use std::sync::RwLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// A caller's effective identity for one request (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Admin { name: String },
    User { name: String, groups: Vec<String>, permissions: Vec<String> },
    Anonymous,
}

impl Identity {
    pub fn name(&self) -> &str {
        match self {
            Identity::Admin { name } | Identity::User { name, .. } => name,
            Identity::Anonymous => "anonymous",
        }
    }

    pub fn groups(&self) -> &[String] {
        match self {
            Identity::User { groups, .. } => groups,
            _ => &[],
        }
    }

    /// `true` if this identity may act as though it owns or is targeted by
    /// any record (the `*All` permission family, §4.7).
    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::Admin { .. })
    }

    /// Does this identity hold `permission`, or the matching `*All` form?
    pub fn has_permission(&self, permission: &str) -> bool {
        match self {
            Identity::Admin { .. } => true,
            Identity::User { permissions, .. } => {
                let all_form = all_permission(permission);
                permissions.iter().any(|p| p == permission || p == &all_form)
            }
            Identity::Anonymous => false,
        }
    }

    /// Visibility test for Get/List of an owned, `visibleFor`-scoped record.
    pub fn can_view(&self, owner_name: &str, visible_for: &[String]) -> bool {
        if self.is_admin() {
            return true;
        }
        if owner_name == self.name() {
            return true;
        }
        visible_for.iter().any(|v| v == self.name() || self.groups().contains(v))
    }
}

fn all_permission(permission: &str) -> String {
    match permission.rsplit_once('.') {
        Some((service, _)) => format!("{service}.*All"),
        None => format!("{permission}All"),
    }
}

/// A persisted account. Never serialized back to clients with `password_hash`
/// populated (§4.7: "User responses never carry the password hash").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub rate_limit_per_min: Option<u32>,
}

/// Collections of permission strings a User may hold via its `roles`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<String>,
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else { return false };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// In-memory account directory. User/Role/Group membership is administrative
/// metadata, not a replicated cluster entity (§3 names no such record), so it
/// lives node-local rather than in the `StateStore`.
#[derive(Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
    roles: RwLock<HashMap<String, Role>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a single `admin` account with every permission, used when no
    /// accounts exist yet (first boot) or when `disable_auth` is set.
    pub fn with_bootstrap_admin(password: &str) -> Self {
        let store = Self::new();
        store.put_role(Role { name: "admin".into(), permissions: vec!["*.*All".into()] });
        let _ = store.create_user("admin", password, vec!["admin".into()], vec![]);
        store
    }

    pub fn put_role(&self, role: Role) {
        self.roles.write().unwrap().insert(role.name.clone(), role);
    }

    pub fn get_role(&self, name: &str) -> Option<Role> {
        self.roles.read().unwrap().get(name).cloned()
    }

    pub fn create_user(
        &self,
        name: &str,
        password: &str,
        roles: Vec<String>,
        groups: Vec<String>,
    ) -> Result<(), argon2::password_hash::Error> {
        let password_hash = hash_password(password)?;
        self.users.write().unwrap().insert(
            name.to_string(),
            User { name: name.to_string(), password_hash, roles, groups, rate_limit_per_min: None },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<User> {
        self.users.read().unwrap().get(name).cloned()
    }

    pub fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.read().unwrap().values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        users
    }

    pub fn list_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.read().unwrap().values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    /// `UserService.UpdateGroup` (§4.7): replaces a user's group membership wholesale.
    pub fn update_groups(&self, name: &str, groups: Vec<String>) -> bool {
        let mut users = self.users.write().unwrap();
        match users.get_mut(name) {
            Some(user) => {
                user.groups = groups;
                true
            }
            None => false,
        }
    }

    /// Verifies `password` against the stored hash and resolves the user's
    /// permissions by expanding its roles.
    pub fn authenticate(&self, name: &str, password: &str) -> Option<Identity> {
        let user = self.get(name)?;
        if !verify_password(password, &user.password_hash) {
            return None;
        }
        Some(self.identity_for(&user))
    }

    pub fn identity_for(&self, user: &User) -> Identity {
        if user.roles.iter().any(|r| r == "admin") {
            return Identity::Admin { name: user.name.clone() };
        }
        let roles = self.roles.read().unwrap();
        let permissions = user
            .roles
            .iter()
            .filter_map(|r| roles.get(r))
            .flat_map(|r| r.permissions.clone())
            .collect();
        Identity::User { name: user.name.clone(), groups: user.groups.clone(), permissions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trips_through_hash() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn admin_role_grants_every_permission() {
        let store = UserStore::with_bootstrap_admin("s3cret");
        let identity = store.authenticate("admin", "s3cret").unwrap();
        assert!(identity.is_admin());
        assert!(identity.has_permission("LabelService.Create"));
    }

    #[test]
    fn non_admin_permission_requires_matching_role() {
        let store = UserStore::new();
        store.put_role(Role { name: "viewer".into(), permissions: vec!["LabelService.Get".into()] });
        store.create_user("bob", "pw", vec!["viewer".into()], vec!["team-a".into()]).unwrap();
        let identity = store.authenticate("bob", "pw").unwrap();
        assert!(identity.has_permission("LabelService.Get"));
        assert!(!identity.has_permission("LabelService.Create"));
    }

    #[test]
    fn wrong_password_does_not_authenticate() {
        let store = UserStore::with_bootstrap_admin("s3cret");
        assert!(store.authenticate("admin", "nope").is_none());
    }

    #[test]
    fn update_groups_replaces_membership_wholesale() {
        let store = UserStore::new();
        store.create_user("bob", "pw", vec![], vec!["team-a".into()]).unwrap();
        assert!(store.update_groups("bob", vec!["team-b".into(), "team-c".into()]));
        assert_eq!(store.get("bob").unwrap().groups, vec!["team-b", "team-c"]);
        assert!(!store.update_groups("nobody", vec![]));
    }

    #[test]
    fn visibility_grants_owner_and_group_members_but_not_strangers() {
        let owner = Identity::User { name: "alice".into(), groups: vec![], permissions: vec![] };
        assert!(owner.can_view("alice", &[]));

        let group_member = Identity::User {
            name: "bob".into(),
            groups: vec!["team-a".into()],
            permissions: vec![],
        };
        assert!(group_member.can_view("alice", &["team-a".to_string()]));

        let stranger = Identity::User { name: "eve".into(), groups: vec![], permissions: vec![] };
        assert!(!stranger.can_view("alice", &["team-a".to_string()]));
    }
}
