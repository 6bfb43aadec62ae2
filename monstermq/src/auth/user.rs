// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! User directory with bcrypt password hashes, loaded from a TOML file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::acl::AclRule;
use crate::error::{Error, ErrorKind};

/// One broker user.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct User {
    pub username: String,

    /// Bcrypt hash as produced by `bcrypt::hash`.
    pub password_hash: String,

    #[serde(default = "User::default_enabled")]
    pub enabled: bool,

    /// Admin users bypass ACL evaluation.
    #[serde(default)]
    pub is_admin: bool,

    /// Fallback when no ACL rule matches a subscribe.
    #[serde(default)]
    pub can_subscribe: bool,

    /// Fallback when no ACL rule matches a publish.
    #[serde(default)]
    pub can_publish: bool,
}

impl User {
    #[must_use]
    pub const fn default_enabled() -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct AclRuleEntry {
    username: String,
    pattern: String,
    #[serde(default)]
    allow_subscribe: bool,
    #[serde(default)]
    allow_publish: bool,
    #[serde(default)]
    priority: i32,
}

#[derive(Debug, Default, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    acl: Vec<AclRuleEntry>,
}

/// In-memory snapshot of users and their ACL rules. Reloaded on the
/// refresh interval and on SIGUSR1.
#[derive(Debug, Default)]
pub struct Directory {
    users: HashMap<String, User>,
    rules: HashMap<String, Vec<AclRule>>,
}

impl Directory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a directory from the users TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or a rule
    /// pattern is invalid.
    pub fn load_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("auth: failed to read users file {path:?}: {err}"),
            )
        })?;
        let file: UsersFile = toml::from_str(&content).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("auth: invalid users file {path:?}: {err}"),
            )
        })?;

        let mut directory = Self::new();
        for user in file.users {
            directory.upsert_user(user);
        }
        for entry in file.acl {
            let rule = AclRule::new(
                &entry.pattern,
                entry.allow_subscribe,
                entry.allow_publish,
                entry.priority,
            )
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::ConfigError,
                    format!("auth: invalid acl pattern {}: {err:?}", entry.pattern),
                )
            })?;
            directory.add_rule(&entry.username, rule);
        }
        Ok(directory)
    }

    #[must_use]
    pub fn find_user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    #[must_use]
    pub fn rules_of(&self, username: &str) -> &[AclRule] {
        self.rules.get(username).map_or(&[], Vec::as_slice)
    }

    /// Insert or replace a user.
    pub fn upsert_user(&mut self, user: User) {
        self.users.insert(user.username.clone(), user);
    }

    /// Remove a user and its rules. Returns true when it existed.
    pub fn remove_user(&mut self, username: &str) -> bool {
        self.rules.remove(username);
        self.users.remove(username).is_some()
    }

    /// Add an ACL rule; rules stay sorted by priority descending.
    pub fn add_rule(&mut self, username: &str, rule: AclRule) {
        let rules = self.rules.entry(username.to_string()).or_default();
        rules.push(rule);
        rules.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Verify a plaintext password against the stored bcrypt hash.
    #[must_use]
    pub fn validate_password(user: &User, password: &[u8]) -> bool {
        let password = String::from_utf8_lossy(password);
        match bcrypt::verify(password.as_ref(), &user.password_hash) {
            Ok(valid) => valid,
            Err(err) => {
                log::error!("auth: bcrypt verify failed for {}: {err}", user.username);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed(password: &str) -> String {
        bcrypt::hash(password, 4).unwrap()
    }

    #[test]
    fn test_parse_users_file() {
        let text = format!(
            r#"
[[users]]
username = "alice"
password_hash = "{}"
is_admin = true

[[users]]
username = "u1"
password_hash = "{}"
can_subscribe = true

[[acl]]
username = "u1"
pattern = "sensors/#"
allow_publish = true
priority = 10
"#,
            hashed("alpha"),
            hashed("beta"),
        );
        let dir = tempdir_file(&text);
        assert_eq!(dir.user_count(), 2);

        let alice = dir.find_user("alice").unwrap();
        assert!(alice.is_admin);
        assert!(Directory::validate_password(alice, b"alpha"));
        assert!(!Directory::validate_password(alice, b"beta"));

        assert_eq!(dir.rules_of("u1").len(), 1);
        assert!(dir.rules_of("alice").is_empty());
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let mut dir = Directory::new();
        dir.add_rule("u", AclRule::new("a/#", true, false, 1).unwrap());
        dir.add_rule("u", AclRule::new("b/#", true, false, 9).unwrap());
        dir.add_rule("u", AclRule::new("c/#", true, false, 5).unwrap());

        let priorities: Vec<i32> = dir.rules_of("u").iter().map(AclRule::priority).collect();
        assert_eq!(priorities, vec![9, 5, 1]);
    }

    fn tempdir_file(content: &str) -> Directory {
        let path = std::env::temp_dir().join(format!(
            "monstermq-users-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        let directory = Directory::load_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        directory
    }
}
