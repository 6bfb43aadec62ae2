// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Retained message replay at subscribe time.

use codec::v5::RetainHandling;
use codec::TopicFilter;

use super::Dispatcher;
use crate::commands::{DispatcherToListenerCmd, OutboundPublish, SubscriptionRequest};
use crate::store::RetainedStore;
use crate::types::{now_ms, SessionGid};

impl Dispatcher {
    /// Replay retained messages for one freshly installed subscription,
    /// subject to its retain handling option. `existed` tells whether the
    /// same (client, filter) pair was installed before this subscribe.
    pub(super) async fn deliver_retained(
        &mut self,
        gid: SessionGid,
        client_id: &str,
        request: &SubscriptionRequest,
        existed: bool,
    ) {
        match request.retain_handling {
            RetainHandling::Send => {}
            RetainHandling::SendFirst => {
                if existed {
                    return;
                }
            }
            RetainHandling::NoSend => return,
        }

        let filter = match TopicFilter::parse(&request.filter) {
            Ok(filter) => filter,
            Err(err) => {
                log::error!(
                    "dispatcher: retained replay with bad filter {}: {err:?}",
                    request.filter
                );
                return;
            }
        };

        let matching = match self.retained_store.matching(&filter).await {
            Ok(matching) => matching,
            Err(err) => {
                log::error!("dispatcher: retained lookup failed: {err:?}");
                return;
            }
        };

        let now = now_ms();
        for message in matching {
            if message.is_expired(now) {
                continue;
            }
            // The retain flag of the replayed copy follows the
            // retain-as-published option of the new subscription.
            let publish = OutboundPublish {
                qos: message.qos().min(request.qos),
                retain: request.retain_as_published,
                message,
            };
            let cmd = DispatcherToListenerCmd::Publish(gid.session_id(), publish);
            if let Err(err) = self.send_to_listener(gid.listener_id(), cmd).await {
                log::error!(
                    "dispatcher: retained delivery to {client_id} failed: {err:?}"
                );
            }
        }
    }
}
