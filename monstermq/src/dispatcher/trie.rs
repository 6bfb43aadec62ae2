// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Subscription index: an exact-match map for literal filters plus a
//! segment trie for wildcard filters.
//!
//! Lookup cost is proportional to the number of topic segments, not to
//! the number of subscriptions.

use std::collections::{HashMap, HashSet};

use codec::topic::{MULTI_WILDCARD, RESERVED_PREFIX, SINGLE_WILDCARD, TOPIC_SEPARATOR};

use crate::types::ClientId;

#[derive(Debug, Default)]
struct TrieNode {
    /// Literal segment children.
    children: HashMap<String, TrieNode>,

    /// `+` child.
    single: Option<Box<TrieNode>>,

    /// Clients whose filter ends with `#` directly below this node.
    multi_subscribers: HashSet<ClientId>,

    /// Clients whose filter ends exactly at this node.
    subscribers: HashSet<ClientId>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.children.is_empty()
            && self.single.is_none()
            && self.multi_subscribers.is_empty()
            && self.subscribers.is_empty()
    }

    fn collect(&self, parts: &[&str], index: usize, found: &mut HashSet<ClientId>) {
        // A `#` at this level matches the remaining segments, including
        // none at all: `a/#` matches `a`.
        found.extend(self.multi_subscribers.iter().cloned());

        if index == parts.len() {
            found.extend(self.subscribers.iter().cloned());
            return;
        }

        if let Some(child) = self.children.get(parts[index]) {
            child.collect(parts, index + 1, found);
        }
        if let Some(single) = &self.single {
            single.collect(parts, index + 1, found);
        }
    }

    fn insert(&mut self, segments: &[&str], client_id: &str) {
        match segments.first() {
            None => {
                self.subscribers.insert(client_id.to_string());
            }
            Some(&MULTI_WILDCARD) => {
                self.multi_subscribers.insert(client_id.to_string());
            }
            Some(&SINGLE_WILDCARD) => {
                self.single
                    .get_or_insert_with(Box::default)
                    .insert(&segments[1..], client_id);
            }
            Some(literal) => {
                self.children
                    .entry((*literal).to_string())
                    .or_default()
                    .insert(&segments[1..], client_id);
            }
        }
    }

    /// Returns true when the subscription existed.
    fn remove(&mut self, segments: &[&str], client_id: &str) -> bool {
        let existed = match segments.first() {
            None => self.subscribers.remove(client_id),
            Some(&MULTI_WILDCARD) => self.multi_subscribers.remove(client_id),
            Some(&SINGLE_WILDCARD) => match &mut self.single {
                Some(single) => {
                    let existed = single.remove(&segments[1..], client_id);
                    if single.is_empty() {
                        self.single = None;
                    }
                    existed
                }
                None => false,
            },
            Some(literal) => match self.children.get_mut(*literal) {
                Some(child) => {
                    let existed = child.remove(&segments[1..], client_id);
                    if child.is_empty() {
                        self.children.remove(*literal);
                    }
                    existed
                }
                None => false,
            },
        };
        existed
    }

    fn contains(&self, segments: &[&str], client_id: &str) -> bool {
        match segments.first() {
            None => self.subscribers.contains(client_id),
            Some(&MULTI_WILDCARD) => self.multi_subscribers.contains(client_id),
            Some(&SINGLE_WILDCARD) => self
                .single
                .as_ref()
                .is_some_and(|single| single.contains(&segments[1..], client_id)),
            Some(literal) => self
                .children
                .get(*literal)
                .is_some_and(|child| child.contains(&segments[1..], client_id)),
        }
    }
}

/// Two-level subscription index over client ids.
#[derive(Debug, Default)]
pub struct TopicIndex {
    /// Literal filter -> subscribers.
    exact: HashMap<String, HashSet<ClientId>>,

    /// Wildcard filters.
    root: TrieNode,
}

fn has_wildcard(filter: &str) -> bool {
    filter.contains(['+', '#'])
}

impl TopicIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `filter` for `client_id`. Duplicate installs are no-ops.
    pub fn subscribe(&mut self, client_id: &str, filter: &str) {
        if has_wildcard(filter) {
            let segments: Vec<&str> = filter.split(TOPIC_SEPARATOR).collect();
            self.root.insert(&segments, client_id);
        } else {
            self.exact
                .entry(filter.to_string())
                .or_default()
                .insert(client_id.to_string());
        }
    }

    /// Remove `filter` of `client_id`; empty trie branches are pruned.
    /// Returns true when the subscription existed.
    pub fn unsubscribe(&mut self, client_id: &str, filter: &str) -> bool {
        if has_wildcard(filter) {
            let segments: Vec<&str> = filter.split(TOPIC_SEPARATOR).collect();
            self.root.remove(&segments, client_id)
        } else {
            match self.exact.get_mut(filter) {
                Some(subscribers) => {
                    let existed = subscribers.remove(client_id);
                    if subscribers.is_empty() {
                        self.exact.remove(filter);
                    }
                    existed
                }
                None => false,
            }
        }
    }

    /// All clients with a subscription matching the concrete `topic`.
    #[must_use]
    pub fn matching_subscribers(&self, topic: &str) -> HashSet<ClientId> {
        let mut found = HashSet::new();
        if let Some(subscribers) = self.exact.get(topic) {
            found.extend(subscribers.iter().cloned());
        }

        let parts: Vec<&str> = topic.split(TOPIC_SEPARATOR).collect();
        if topic.starts_with(RESERVED_PREFIX) {
            // Wildcards never match into the `$` namespace from the root;
            // only filters starting with the literal `$...` segment do.
            if let Some(child) = self.root.children.get(parts[0]) {
                child.collect(&parts, 1, &mut found);
            }
        } else {
            self.root.collect(&parts, 0, &mut found);
        }
        found
    }

    /// True if `client_id` currently holds exactly this `filter`.
    #[must_use]
    pub fn has_subscriber(&self, filter: &str, client_id: &str) -> bool {
        if has_wildcard(filter) {
            let segments: Vec<&str> = filter.split(TOPIC_SEPARATOR).collect();
            self.root.contains(&segments, client_id)
        } else {
            self.exact
                .get(filter)
                .is_some_and(|subscribers| subscribers.contains(client_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(subs: &[(&str, &str)]) -> TopicIndex {
        let mut index = TopicIndex::new();
        for (client, filter) in subs {
            index.subscribe(client, filter);
        }
        index
    }

    fn matching(index: &TopicIndex, topic: &str) -> Vec<String> {
        let mut clients: Vec<String> = index.matching_subscribers(topic).into_iter().collect();
        clients.sort();
        clients
    }

    #[test]
    fn test_exact_and_wildcard_union() {
        let index = index_with(&[
            ("c1", "a/b"),
            ("c2", "a/+"),
            ("c3", "a/#"),
            ("c4", "x/y"),
        ]);
        assert_eq!(matching(&index, "a/b"), vec!["c1", "c2", "c3"]);
        assert_eq!(matching(&index, "a/z"), vec!["c2", "c3"]);
        assert_eq!(matching(&index, "a/b/c"), vec!["c3"]);
        // The parent level of `a/#` is included.
        assert_eq!(matching(&index, "a"), vec!["c3"]);
        assert!(matching(&index, "b").is_empty());
    }

    #[test]
    fn test_single_wildcard_is_one_segment() {
        let index = index_with(&[("c1", "s/+/t")]);
        assert_eq!(matching(&index, "s/1/t"), vec!["c1"]);
        assert!(matching(&index, "s/t").is_empty());
        assert!(matching(&index, "s/1/2/t").is_empty());
    }

    #[test]
    fn test_root_multi_wildcard_skips_reserved() {
        let index = index_with(&[("c1", "#"), ("c2", "+/uptime"), ("c3", "$SYS/#")]);
        assert_eq!(matching(&index, "$SYS/uptime"), vec!["c3"]);
        assert_eq!(matching(&index, "node/uptime"), vec!["c1", "c2"]);
    }

    #[test]
    fn test_unsubscribe_prunes_branches() {
        let mut index = index_with(&[("c1", "a/b/+/d")]);
        assert!(index.has_subscriber("a/b/+/d", "c1"));
        assert!(index.unsubscribe("c1", "a/b/+/d"));
        assert!(!index.has_subscriber("a/b/+/d", "c1"));
        assert!(!index.unsubscribe("c1", "a/b/+/d"));
        assert!(index.root.is_empty());
    }

    #[test]
    fn test_duplicate_subscribe_is_single_entry() {
        let mut index = index_with(&[("c1", "a/#"), ("c1", "a/#")]);
        assert_eq!(matching(&index, "a/b"), vec!["c1"]);
        assert!(index.unsubscribe("c1", "a/#"));
        assert!(matching(&index, "a/b").is_empty());
    }
}
