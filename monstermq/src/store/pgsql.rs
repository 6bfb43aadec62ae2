// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! PostgreSQL storage backends, enabled with the `pgsql_conn` feature.
//!
//! One connection per pool; statement failures surface as
//! `ErrorKind::StorageError` and are retried by the callers' backoff
//! logic where applicable.

use async_trait::async_trait;
use bytes::Bytes;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio_postgres::{Client, NoTls, Row};

use super::{
    decode_properties, encode_properties, LastValueStore, MessageArchive, MetricsStore,
    RetainedStore, SessionStore, StoredSession, StoredSubscription,
};
use crate::error::Error;
use crate::message::{BrokerMessage, QueuedMessage, NO_EXPIRY};
use crate::metrics::BrokerMetrics;
use crate::types::ClientId;
use codec::{QoS, TopicFilter};

/// Shared postgres connection.
#[derive(Clone)]
pub struct PgPool {
    client: Arc<Client>,
}

impl std::fmt::Debug for PgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("PgPool")
    }
}

impl PgPool {
    /// Connect and drive the connection on a background task.
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be established.
    pub async fn connect(conn_str: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(conn_str, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::error!("pgsql: connection task failed: {err}");
            }
        });
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn client(&self) -> &Client {
        &self.client
    }
}

fn qos_to_i16(qos: QoS) -> i16 {
    i16::from(qos as u8)
}

fn qos_from_i16(value: i16) -> QoS {
    u8::try_from(value)
        .ok()
        .and_then(|v| QoS::try_from(v).ok())
        .unwrap_or(QoS::AtMostOnce)
}

fn expiry_to_i64(message: &BrokerMessage) -> i64 {
    message
        .properties()
        .message_expiry_interval
        .map_or(NO_EXPIRY, i64::from)
}

fn message_from_row(row: &Row, topic_col: &str) -> BrokerMessage {
    let topic: String = row.get(topic_col);
    let payload: Vec<u8> = row.get("payload");
    let qos = qos_from_i16(row.get("qos"));
    let retain: bool = row.get("retain");
    let origin: String = row.get("origin");
    let created_at: i64 = row.get("created_at");
    let properties: Vec<u8> = row.get("properties");

    let mut message = BrokerMessage::new(
        &topic,
        Bytes::from(payload),
        qos,
        &origin,
        u64::try_from(created_at).unwrap_or(0),
    );
    message.set_retain(retain);
    *message.properties_mut() = decode_properties(&properties);
    message
}

/// Session store on the `sessions`, `subscriptions` and
/// `queued_messages` tables.
#[derive(Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Create the store and its tables.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be created.
    pub async fn new(pool: PgPool) -> Result<Self, Error> {
        pool.client()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS sessions (
                    client_id TEXT PRIMARY KEY,
                    clean_start BOOL NOT NULL,
                    session_expiry BIGINT NOT NULL,
                    receive_maximum INT NOT NULL,
                    maximum_packet_size BIGINT NOT NULL,
                    topic_alias_maximum INT NOT NULL,
                    connected BOOL NOT NULL,
                    node_id TEXT NOT NULL,
                    disconnected_at BIGINT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS subscriptions (
                    client_id TEXT NOT NULL,
                    filter TEXT NOT NULL,
                    qos SMALLINT NOT NULL,
                    no_local BOOL NOT NULL,
                    retain_as_published BOOL NOT NULL,
                    retain_handling SMALLINT NOT NULL,
                    PRIMARY KEY (client_id, filter)
                );
                CREATE TABLE IF NOT EXISTS queued_messages (
                    client_id TEXT NOT NULL,
                    sequence BIGINT NOT NULL,
                    topic TEXT NOT NULL,
                    payload BYTEA NOT NULL,
                    qos SMALLINT NOT NULL,
                    retain BOOL NOT NULL,
                    origin TEXT NOT NULL,
                    created_at BIGINT NOT NULL,
                    expiry BIGINT NOT NULL,
                    properties BYTEA NOT NULL,
                    PRIMARY KEY (client_id, sequence)
                );",
            )
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load_session(&self, client_id: &str) -> Result<Option<StoredSession>, Error> {
        let row = self
            .pool
            .client()
            .query_opt("SELECT * FROM sessions WHERE client_id = $1", &[&client_id])
            .await?;
        Ok(row.map(|row| {
            let session_expiry: i64 = row.get("session_expiry");
            let receive_maximum: i32 = row.get("receive_maximum");
            let maximum_packet_size: i64 = row.get("maximum_packet_size");
            let topic_alias_maximum: i32 = row.get("topic_alias_maximum");
            let disconnected_at: i64 = row.get("disconnected_at");
            StoredSession {
                client_id: row.get("client_id"),
                clean_start: row.get("clean_start"),
                session_expiry_interval: u32::try_from(session_expiry).unwrap_or(0),
                receive_maximum: u16::try_from(receive_maximum).unwrap_or(u16::MAX),
                maximum_packet_size: u32::try_from(maximum_packet_size).unwrap_or(u32::MAX),
                topic_alias_maximum: u16::try_from(topic_alias_maximum).unwrap_or(0),
                connected: row.get("connected"),
                node_id: row.get("node_id"),
                disconnected_at: u64::try_from(disconnected_at).unwrap_or(0),
            }
        }))
    }

    async fn save_session(&self, session: &StoredSession) -> Result<(), Error> {
        self.pool
            .client()
            .execute(
                "INSERT INTO sessions (client_id, clean_start, session_expiry,
                    receive_maximum, maximum_packet_size, topic_alias_maximum,
                    connected, node_id, disconnected_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (client_id) DO UPDATE SET
                    clean_start = $2, session_expiry = $3, receive_maximum = $4,
                    maximum_packet_size = $5, topic_alias_maximum = $6,
                    connected = $7, node_id = $8, disconnected_at = $9",
                &[
                    &session.client_id,
                    &session.clean_start,
                    &i64::from(session.session_expiry_interval),
                    &i32::from(session.receive_maximum),
                    &i64::from(session.maximum_packet_size),
                    &i32::from(session.topic_alias_maximum),
                    &session.connected,
                    &session.node_id,
                    &i64::try_from(session.disconnected_at).unwrap_or(i64::MAX),
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove_session(&self, client_id: &str) -> Result<(), Error> {
        let client = self.pool.client();
        client
            .execute("DELETE FROM sessions WHERE client_id = $1", &[&client_id])
            .await?;
        client
            .execute(
                "DELETE FROM subscriptions WHERE client_id = $1",
                &[&client_id],
            )
            .await?;
        client
            .execute(
                "DELETE FROM queued_messages WHERE client_id = $1",
                &[&client_id],
            )
            .await?;
        Ok(())
    }

    async fn subscriptions(&self, client_id: &str) -> Result<Vec<StoredSubscription>, Error> {
        let rows = self
            .pool
            .client()
            .query(
                "SELECT * FROM subscriptions WHERE client_id = $1 ORDER BY filter",
                &[&client_id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let qos: i16 = row.get("qos");
                let retain_handling: i16 = row.get("retain_handling");
                StoredSubscription {
                    client_id: row.get("client_id"),
                    filter: row.get("filter"),
                    qos: u8::try_from(qos).unwrap_or(0),
                    no_local: row.get("no_local"),
                    retain_as_published: row.get("retain_as_published"),
                    retain_handling: u8::try_from(retain_handling).unwrap_or(0),
                }
            })
            .collect())
    }

    async fn save_subscription(&self, subscription: &StoredSubscription) -> Result<(), Error> {
        self.pool
            .client()
            .execute(
                "INSERT INTO subscriptions (client_id, filter, qos, no_local,
                    retain_as_published, retain_handling)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (client_id, filter) DO UPDATE SET
                    qos = $3, no_local = $4, retain_as_published = $5,
                    retain_handling = $6",
                &[
                    &subscription.client_id,
                    &subscription.filter,
                    &i16::from(subscription.qos),
                    &subscription.no_local,
                    &subscription.retain_as_published,
                    &i16::from(subscription.retain_handling),
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove_subscription(&self, client_id: &str, filter: &str) -> Result<(), Error> {
        self.pool
            .client()
            .execute(
                "DELETE FROM subscriptions WHERE client_id = $1 AND filter = $2",
                &[&client_id, &filter],
            )
            .await?;
        Ok(())
    }

    async fn clear_subscriptions(&self, client_id: &str) -> Result<(), Error> {
        self.pool
            .client()
            .execute(
                "DELETE FROM subscriptions WHERE client_id = $1",
                &[&client_id],
            )
            .await?;
        Ok(())
    }

    async fn enqueue(
        &self,
        client_id: &str,
        message: &BrokerMessage,
        limit: usize,
    ) -> Result<u64, Error> {
        let client = self.pool.client();
        if limit > 0 {
            let count: i64 = client
                .query_one(
                    "SELECT COUNT(*) FROM queued_messages WHERE client_id = $1",
                    &[&client_id],
                )
                .await?
                .get(0);
            let overflow = count - i64::try_from(limit).unwrap_or(i64::MAX) + 1;
            if overflow > 0 {
                log::warn!("session store: queue of {client_id} full, dropping {overflow} rows");
                client
                    .execute(
                        "DELETE FROM queued_messages WHERE client_id = $1 AND sequence IN (
                            SELECT sequence FROM queued_messages WHERE client_id = $1
                            ORDER BY sequence ASC LIMIT $2)",
                        &[&client_id, &overflow],
                    )
                    .await?;
            }
        }

        let sequence: i64 = client
            .query_one(
                "SELECT COALESCE(MAX(sequence) + 1, 0) FROM queued_messages
                 WHERE client_id = $1",
                &[&client_id],
            )
            .await?
            .get(0);
        client
            .execute(
                "INSERT INTO queued_messages (client_id, sequence, topic, payload,
                    qos, retain, origin, created_at, expiry, properties)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &client_id,
                    &sequence,
                    &message.topic(),
                    &message.payload().as_ref(),
                    &qos_to_i16(message.qos()),
                    &message.retain(),
                    &message.origin(),
                    &i64::try_from(message.created_at()).unwrap_or(i64::MAX),
                    &expiry_to_i64(message),
                    &encode_properties(message.properties()),
                ],
            )
            .await?;
        Ok(u64::try_from(sequence).unwrap_or(0))
    }

    async fn dequeue(&self, client_id: &str, max: usize) -> Result<Vec<QueuedMessage>, Error> {
        let client = self.pool.client();
        let rows = client
            .query(
                "DELETE FROM queued_messages WHERE client_id = $1 AND sequence IN (
                    SELECT sequence FROM queued_messages WHERE client_id = $1
                    ORDER BY sequence ASC LIMIT $2)
                 RETURNING *",
                &[&client_id, &i64::try_from(max).unwrap_or(i64::MAX)],
            )
            .await?;
        let mut entries: Vec<QueuedMessage> = rows
            .iter()
            .map(|row| {
                let sequence: i64 = row.get("sequence");
                QueuedMessage {
                    client_id: client_id.to_string(),
                    sequence: u64::try_from(sequence).unwrap_or(0),
                    message: message_from_row(row, "topic"),
                }
            })
            .collect();
        entries.sort_by_key(|entry| entry.sequence);
        Ok(entries)
    }

    async fn queue_len(&self, client_id: &str) -> Result<usize, Error> {
        let count: i64 = self
            .pool
            .client()
            .query_one(
                "SELECT COUNT(*) FROM queued_messages WHERE client_id = $1",
                &[&client_id],
            )
            .await?
            .get(0);
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn purge_expired_messages(&self, now_ms: u64) -> Result<u64, Error> {
        let removed = self
            .pool
            .client()
            .execute(
                "DELETE FROM queued_messages
                 WHERE expiry >= 0 AND created_at + expiry * 1000 <= $1",
                &[&i64::try_from(now_ms).unwrap_or(i64::MAX)],
            )
            .await?;
        Ok(removed)
    }

    async fn expired_sessions(&self, now_ms: u64) -> Result<Vec<ClientId>, Error> {
        let rows = self
            .pool
            .client()
            .query(
                "SELECT client_id FROM sessions
                 WHERE NOT connected AND session_expiry < $1
                   AND disconnected_at + session_expiry * 1000 <= $2",
                &[
                    &i64::from(u32::MAX),
                    &i64::try_from(now_ms).unwrap_or(i64::MAX),
                ],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get("client_id")).collect())
    }
}

/// Retained message store on the `retained` table. Wildcard matching runs
/// host-side over the topic column.
#[derive(Debug)]
pub struct PgRetainedStore {
    pool: PgPool,
}

impl PgRetainedStore {
    /// Create the store and its table.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be created.
    pub async fn new(pool: PgPool) -> Result<Self, Error> {
        pool.client()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS retained (
                    topic TEXT PRIMARY KEY,
                    payload BYTEA NOT NULL,
                    qos SMALLINT NOT NULL,
                    retain BOOL NOT NULL,
                    origin TEXT NOT NULL,
                    created_at BIGINT NOT NULL,
                    properties BYTEA NOT NULL
                );",
            )
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RetainedStore for PgRetainedStore {
    async fn store(&self, message: &BrokerMessage) -> Result<(), Error> {
        self.pool
            .client()
            .execute(
                "INSERT INTO retained (topic, payload, qos, retain, origin,
                    created_at, properties)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (topic) DO UPDATE SET
                    payload = $2, qos = $3, retain = $4, origin = $5,
                    created_at = $6, properties = $7",
                &[
                    &message.topic(),
                    &message.payload().as_ref(),
                    &qos_to_i16(message.qos()),
                    &message.retain(),
                    &message.origin(),
                    &i64::try_from(message.created_at()).unwrap_or(i64::MAX),
                    &encode_properties(message.properties()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, topic: &str) -> Result<bool, Error> {
        let removed = self
            .pool
            .client()
            .execute("DELETE FROM retained WHERE topic = $1", &[&topic])
            .await?;
        Ok(removed > 0)
    }

    async fn get(&self, topic: &str) -> Result<Option<BrokerMessage>, Error> {
        let row = self
            .pool
            .client()
            .query_opt("SELECT * FROM retained WHERE topic = $1", &[&topic])
            .await?;
        Ok(row.map(|row| message_from_row(&row, "topic")))
    }

    async fn matching(&self, filter: &TopicFilter) -> Result<Vec<BrokerMessage>, Error> {
        let rows = self.pool.client().query("SELECT * FROM retained", &[]).await?;
        Ok(rows
            .iter()
            .filter(|row| {
                let topic: String = row.get("topic");
                filter.is_match(&topic)
            })
            .map(|row| message_from_row(row, "topic"))
            .collect())
    }
}

/// Last-value sink of one archive group on the `last_values` table.
#[derive(Debug)]
pub struct PgLastValueStore {
    pool: PgPool,
    group: String,
}

impl PgLastValueStore {
    /// Create the sink and its table.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be created.
    pub async fn new(pool: PgPool, group: &str) -> Result<Self, Error> {
        pool.client()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS last_values (
                    grp TEXT NOT NULL,
                    topic TEXT NOT NULL,
                    payload BYTEA NOT NULL,
                    qos SMALLINT NOT NULL,
                    retain BOOL NOT NULL,
                    origin TEXT NOT NULL,
                    created_at BIGINT NOT NULL,
                    properties BYTEA NOT NULL,
                    PRIMARY KEY (grp, topic)
                );",
            )
            .await?;
        Ok(Self {
            pool,
            group: group.to_string(),
        })
    }
}

#[async_trait]
impl LastValueStore for PgLastValueStore {
    async fn set_all(&self, batch: &[BrokerMessage]) -> Result<(), Error> {
        let client = self.pool.client();
        for message in batch {
            client
                .execute(
                    "INSERT INTO last_values (grp, topic, payload, qos, retain,
                        origin, created_at, properties)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     ON CONFLICT (grp, topic) DO UPDATE SET
                        payload = $3, qos = $4, retain = $5, origin = $6,
                        created_at = $7, properties = $8",
                    &[
                        &self.group,
                        &message.topic(),
                        &message.payload().as_ref(),
                        &qos_to_i16(message.qos()),
                        &message.retain(),
                        &message.origin(),
                        &i64::try_from(message.created_at()).unwrap_or(i64::MAX),
                        &encode_properties(message.properties()),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn get(&self, topic: &str) -> Result<Option<BrokerMessage>, Error> {
        let row = self
            .pool
            .client()
            .query_opt(
                "SELECT * FROM last_values WHERE grp = $1 AND topic = $2",
                &[&self.group, &topic],
            )
            .await?;
        Ok(row.map(|row| message_from_row(&row, "topic")))
    }
}

/// Append-only archive sink of one archive group on the `archive` table.
#[derive(Debug)]
pub struct PgMessageArchive {
    pool: PgPool,
    group: String,
}

impl PgMessageArchive {
    /// Create the sink and its table.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be created.
    pub async fn new(pool: PgPool, group: &str) -> Result<Self, Error> {
        pool.client()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS archive (
                    grp TEXT NOT NULL,
                    topic TEXT NOT NULL,
                    created_at BIGINT NOT NULL,
                    payload BYTEA NOT NULL,
                    qos SMALLINT NOT NULL,
                    retain BOOL NOT NULL,
                    origin TEXT NOT NULL,
                    properties BYTEA NOT NULL
                );
                CREATE INDEX IF NOT EXISTS archive_group_time
                    ON archive (grp, created_at);",
            )
            .await?;
        Ok(Self {
            pool,
            group: group.to_string(),
        })
    }
}

#[async_trait]
impl MessageArchive for PgMessageArchive {
    async fn append_all(&self, batch: &[BrokerMessage]) -> Result<(), Error> {
        let client = self.pool.client();
        for message in batch {
            client
                .execute(
                    "INSERT INTO archive (grp, topic, created_at, payload, qos,
                        retain, origin, properties)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                    &[
                        &self.group,
                        &message.topic(),
                        &i64::try_from(message.created_at()).unwrap_or(i64::MAX),
                        &message.payload().as_ref(),
                        &qos_to_i16(message.qos()),
                        &message.retain(),
                        &message.origin(),
                        &encode_properties(message.properties()),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn purge_older_than(&self, cutoff_ms: u64) -> Result<u64, Error> {
        let removed = self
            .pool
            .client()
            .execute(
                "DELETE FROM archive WHERE grp = $1 AND created_at < $2",
                &[&self.group, &i64::try_from(cutoff_ms).unwrap_or(i64::MAX)],
            )
            .await?;
        Ok(removed)
    }
}

/// Metrics store on the `broker_metrics` table.
#[derive(Debug)]
pub struct PgMetricsStore {
    pool: PgPool,
}

impl PgMetricsStore {
    /// Create the store and its table.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be created.
    pub async fn new(pool: PgPool) -> Result<Self, Error> {
        pool.client()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS broker_metrics (
                    node_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    ts BIGINT NOT NULL,
                    sessions BIGINT NOT NULL,
                    subscriptions BIGINT NOT NULL,
                    retained BIGINT NOT NULL,
                    queued BIGINT NOT NULL,
                    publish_received BIGINT NOT NULL,
                    publish_sent BIGINT NOT NULL,
                    publish_dropped BIGINT NOT NULL,
                    bytes_received BIGINT NOT NULL,
                    bytes_sent BIGINT NOT NULL
                );",
            )
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl MetricsStore for PgMetricsStore {
    async fn append(&self, metrics: &BrokerMetrics) -> Result<(), Error> {
        self.pool
            .client()
            .execute(
                "INSERT INTO broker_metrics (node_id, kind, ts, sessions,
                    subscriptions, retained, queued, publish_received,
                    publish_sent, publish_dropped, bytes_received, bytes_sent)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                &[
                    &metrics.node_id,
                    &metrics.kind,
                    &i64::try_from(metrics.timestamp).unwrap_or(i64::MAX),
                    &i64::try_from(metrics.counters.sessions).unwrap_or(0),
                    &i64::try_from(metrics.counters.subscriptions).unwrap_or(0),
                    &i64::try_from(metrics.counters.retained_messages).unwrap_or(0),
                    &i64::try_from(metrics.counters.queued_messages).unwrap_or(0),
                    &i64::try_from(metrics.counters.publish_received).unwrap_or(0),
                    &i64::try_from(metrics.counters.publish_sent).unwrap_or(0),
                    &i64::try_from(metrics.counters.publish_dropped).unwrap_or(0),
                    &i64::try_from(metrics.counters.bytes_received).unwrap_or(0),
                    &i64::try_from(metrics.counters.bytes_sent).unwrap_or(0),
                ],
            )
            .await?;
        Ok(())
    }
}
