// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Filter-pattern ACL evaluation.

use codec::topic::TopicError;
use codec::TopicFilter;

use super::user::Directory;

/// Operation an ACL decision is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclOp {
    Subscribe,
    Publish,
}

/// One access rule of a user: a topic filter pattern with allow bits and
/// a priority. Higher priorities win.
#[derive(Debug, Clone)]
pub struct AclRule {
    pattern: TopicFilter,
    allow_subscribe: bool,
    allow_publish: bool,
    priority: i32,
}

impl AclRule {
    /// Build a rule from a filter pattern.
    ///
    /// # Errors
    ///
    /// Returns error if `pattern` is not a valid topic filter.
    pub fn new(
        pattern: &str,
        allow_subscribe: bool,
        allow_publish: bool,
        priority: i32,
    ) -> Result<Self, TopicError> {
        Ok(Self {
            pattern: TopicFilter::parse(pattern)?,
            allow_subscribe,
            allow_publish,
            priority,
        })
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    fn allows(&self, op: AclOp) -> bool {
        match op {
            AclOp::Subscribe => self.allow_subscribe,
            AclOp::Publish => self.allow_publish,
        }
    }

    /// Whether this rule applies to `topic`. Subscribe checks pass the
    /// requested filter as the topic; a rule matches it on equality as
    /// well as on wildcard coverage of literal filters.
    fn matches(&self, topic: &str) -> bool {
        self.pattern.filter() == topic || self.pattern.is_match(topic)
    }
}

/// Evaluate whether `username` may perform `op` on `topic`.
///
/// Admin users are always allowed, disabled users never. Otherwise the
/// highest-priority matching rule decides; without a match the user's
/// global flag for the operation applies.
#[must_use]
pub fn evaluate(directory: &Directory, username: &str, topic: &str, op: AclOp) -> bool {
    let Some(user) = directory.find_user(username) else {
        return false;
    };
    if !user.enabled {
        return false;
    }
    if user.is_admin {
        return true;
    }

    // Rules are kept sorted by priority descending.
    for rule in directory.rules_of(username) {
        if rule.matches(topic) {
            return rule.allows(op);
        }
    }

    match op {
        AclOp::Subscribe => user.can_subscribe,
        AclOp::Publish => user.can_publish,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::User;

    fn user(username: &str, admin: bool, enabled: bool) -> User {
        User {
            username: username.to_string(),
            password_hash: String::new(),
            enabled,
            is_admin: admin,
            can_subscribe: false,
            can_publish: false,
        }
    }

    fn directory() -> Directory {
        let mut dir = Directory::new();
        dir.upsert_user(user("admin", true, true));
        dir.upsert_user(user("off", false, false));
        dir.upsert_user(user("u1", false, true));
        dir.add_rule("u1", AclRule::new("sensors/#", false, true, 10).unwrap());
        dir.add_rule("u1", AclRule::new("sensors/secret/#", false, false, 20).unwrap());
        dir
    }

    #[test]
    fn test_admin_allowed_disabled_denied() {
        let dir = directory();
        assert!(evaluate(&dir, "admin", "anything", AclOp::Publish));
        assert!(!evaluate(&dir, "off", "anything", AclOp::Publish));
        assert!(!evaluate(&dir, "missing", "anything", AclOp::Subscribe));
    }

    #[test]
    fn test_priority_order_decides() {
        let dir = directory();
        assert!(evaluate(&dir, "u1", "sensors/a", AclOp::Publish));
        // The higher priority deny rule shadows the allow.
        assert!(!evaluate(&dir, "u1", "sensors/secret/x", AclOp::Publish));
    }

    #[test]
    fn test_global_flags_are_fallback() {
        let mut dir = directory();
        // No rule matches "admin/cmd"; u1 has no global publish right.
        assert!(!evaluate(&dir, "u1", "admin/cmd", AclOp::Publish));

        let mut u2 = user("u2", false, true);
        u2.can_publish = true;
        dir.upsert_user(u2);
        assert!(evaluate(&dir, "u2", "admin/cmd", AclOp::Publish));
        assert!(!evaluate(&dir, "u2", "admin/cmd", AclOp::Subscribe));
    }

    #[test]
    fn test_subscribe_filter_matches_rule_pattern() {
        let dir = directory();
        // Subscribing to the pattern itself is covered by the rule.
        assert!(!evaluate(&dir, "u1", "sensors/#", AclOp::Subscribe));
        let mut dir = directory();
        dir.add_rule("u1", AclRule::new("plant/#", true, false, 1).unwrap());
        assert!(evaluate(&dir, "u1", "plant/#", AclOp::Subscribe));
        assert!(evaluate(&dir, "u1", "plant/line1/temp", AclOp::Subscribe));
    }
}
