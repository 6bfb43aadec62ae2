// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Authoritative map of (client, filter) -> subscription options, layered
//! over the topic index.
//!
//! All mutations run on the dispatcher task, which serializes changes to
//! a single client's subscriptions against each other.

use std::collections::HashMap;

use codec::v5::RetainHandling;
use codec::{QoS, TopicFilter};

use super::trie::TopicIndex;
use crate::commands::SubscriptionRequest;
use crate::types::ClientId;

/// Option bits of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

#[derive(Debug)]
struct ClientSubscription {
    options: SubscriptionOptions,

    /// Parsed filter, kept for wildcard-aware option lookups.
    filter: TopicFilter,
}

/// Subscription manager: index plus per-client option maps.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    index: TopicIndex,
    clients: HashMap<ClientId, HashMap<String, ClientSubscription>>,
    count: usize,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of installed subscriptions.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True if `client_id` already holds exactly this filter. Used for
    /// the retain handling option "send only if new".
    #[must_use]
    pub fn has_subscription(&self, client_id: &str, filter: &str) -> bool {
        self.index.has_subscriber(filter, client_id)
    }

    /// Install or replace a subscription. Returns true when a previous
    /// subscription with the same filter was replaced.
    ///
    /// Re-subscribing with an identical filter completely replaces the
    /// previous subscription, including its option bits.
    pub fn subscribe(&mut self, client_id: &str, request: &SubscriptionRequest) -> bool {
        let Ok(filter) = TopicFilter::parse(&request.filter) else {
            log::error!(
                "subscriptions: rejecting malformed filter {} of {client_id}",
                request.filter
            );
            return false;
        };

        let entry = ClientSubscription {
            options: SubscriptionOptions {
                qos: request.qos,
                no_local: request.no_local,
                retain_as_published: request.retain_as_published,
                retain_handling: request.retain_handling,
            },
            filter,
        };

        let replaced = self
            .clients
            .entry(client_id.to_string())
            .or_default()
            .insert(request.filter.clone(), entry)
            .is_some();
        if !replaced {
            self.index.subscribe(client_id, &request.filter);
            self.count += 1;
        }
        replaced
    }

    /// Remove one subscription. Returns true when it existed.
    pub fn unsubscribe(&mut self, client_id: &str, filter: &str) -> bool {
        let existed = self
            .clients
            .get_mut(client_id)
            .is_some_and(|filters| filters.remove(filter).is_some());
        if existed {
            self.index.unsubscribe(client_id, filter);
            self.count -= 1;
            if self
                .clients
                .get(client_id)
                .is_some_and(HashMap::is_empty)
            {
                self.clients.remove(client_id);
            }
        }
        existed
    }

    /// Drop every subscription of `client_id`. Returns the removed count.
    pub fn remove_client(&mut self, client_id: &str) -> usize {
        let Some(filters) = self.clients.remove(client_id) else {
            return 0;
        };
        for filter in filters.keys() {
            self.index.unsubscribe(client_id, filter);
        }
        self.count -= filters.len();
        filters.len()
    }

    /// Resolve the subscribers of a concrete topic together with their
    /// effective options.
    ///
    /// With overlapping subscriptions of one client the highest granted
    /// QoS wins; its option bits apply.
    #[must_use]
    pub fn matching_subscribers(&self, topic: &str) -> Vec<(ClientId, SubscriptionOptions)> {
        let mut result = Vec::new();
        for client_id in self.index.matching_subscribers(topic) {
            if let Some(options) = self.best_matching_options(&client_id, topic) {
                result.push((client_id, options));
            }
        }
        result
    }

    fn best_matching_options(&self, client_id: &str, topic: &str) -> Option<SubscriptionOptions> {
        let filters = self.clients.get(client_id)?;
        filters
            .values()
            .filter(|sub| sub.filter.is_match(topic))
            .max_by_key(|sub| sub.options.qos)
            .map(|sub| sub.options.clone())
    }

    /// Wildcard-aware retain-as-published lookup: exact filter first,
    /// then the client's wildcard filters against the concrete topic.
    #[must_use]
    pub fn retain_as_published(&self, client_id: &str, topic: &str) -> bool {
        let Some(filters) = self.clients.get(client_id) else {
            return false;
        };
        if let Some(sub) = filters.get(topic) {
            return sub.options.retain_as_published;
        }
        filters
            .values()
            .find(|sub| sub.filter.is_match(topic))
            .map(|sub| sub.options.retain_as_published)
            .unwrap_or(false)
    }

    /// All filters of a client, for persistence and cleanup.
    #[must_use]
    pub fn filters_of(&self, client_id: &str) -> Vec<(String, SubscriptionOptions)> {
        self.clients.get(client_id).map_or_else(Vec::new, |filters| {
            filters
                .iter()
                .map(|(filter, sub)| (filter.clone(), sub.options.clone()))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(filter: &str, qos: QoS) -> SubscriptionRequest {
        SubscriptionRequest {
            filter: filter.to_string(),
            qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::Send,
        }
    }

    #[test]
    fn test_resubscribe_replaces() {
        let mut manager = SubscriptionManager::new();
        assert!(!manager.subscribe("c1", &request("a/+", QoS::AtMostOnce)));
        assert!(manager.subscribe("c1", &request("a/+", QoS::ExactOnce)));
        assert_eq!(manager.len(), 1);

        let subs = manager.matching_subscribers("a/b");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].1.qos, QoS::ExactOnce);

        assert!(manager.unsubscribe("c1", "a/+"));
        assert!(manager.is_empty());
        assert!(manager.matching_subscribers("a/b").is_empty());
    }

    #[test]
    fn test_overlapping_subscriptions_highest_qos_wins() {
        let mut manager = SubscriptionManager::new();
        manager.subscribe("c1", &request("a/#", QoS::AtMostOnce));
        manager.subscribe("c1", &request("a/b", QoS::AtLeastOnce));

        let subs = manager.matching_subscribers("a/b");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].1.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_retain_as_published_wildcard_lookup() {
        let mut manager = SubscriptionManager::new();
        let mut rap = request("r/#", QoS::AtLeastOnce);
        rap.retain_as_published = true;
        manager.subscribe("c1", &rap);
        manager.subscribe("c2", &request("r/#", QoS::AtLeastOnce));

        assert!(manager.retain_as_published("c1", "r/1"));
        assert!(!manager.retain_as_published("c2", "r/1"));
        assert!(!manager.retain_as_published("c3", "r/1"));
    }

    #[test]
    fn test_remove_client_purges_everything() {
        let mut manager = SubscriptionManager::new();
        manager.subscribe("c1", &request("a/#", QoS::AtMostOnce));
        manager.subscribe("c1", &request("b", QoS::AtMostOnce));
        manager.subscribe("c2", &request("b", QoS::AtMostOnce));

        assert_eq!(manager.remove_client("c1"), 2);
        assert_eq!(manager.len(), 1);
        assert!(manager.matching_subscribers("a/x").is_empty());
        assert_eq!(manager.matching_subscribers("b").len(), 1);
    }
}
