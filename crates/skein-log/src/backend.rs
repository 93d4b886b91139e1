//! Backend assembly and namespace bootstrap.
//!
//! [`CoordinationLog`] wires a coordination client, a codec, and a monitoring
//! sink into the component handles the rest of the system uses. Construction
//! runs the connect loop and the bootstrap: every subtree root is created
//! exactly once (`NodeExists` is swallowed here and only here), and the
//! origin and log-parameters nodes get their initial payloads if absent.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skein_core::{
    Codec, CoordError, Coordination, CreateMode, EventSink, MemoryCoordination, NamespacePaths,
};
use tokio::sync::mpsc;

use crate::LOG_VERSION;
use crate::chunks::ChunkStore;
use crate::config::LogConfig;
use crate::connection::ConnectionManager;
use crate::error::{LogError, Result, guard, guard_err};
use crate::gc::LogGc;
use crate::origin::{OriginManager, OriginSnapshot};
use crate::pulse::PulseRegistry;
use crate::subscriber::{LogEvent, LogSubscriber, Subscription};
use crate::writer::LogWriter;

/// Cluster-wide parameters stored under `log-parameters/log-parameters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogParameters {
    /// Version of the log layout and entry semantics.
    pub log_version: String,
}

impl LogParameters {
    /// Returns the parameters this build writes at bootstrap.
    #[must_use]
    pub fn current() -> Self {
        Self {
            log_version: LOG_VERSION.to_string(),
        }
    }
}

/// Shared core handed to every component: client, codec, paths, sink.
#[derive(Clone)]
pub(crate) struct LogContext {
    pub(crate) client: Arc<dyn Coordination>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) paths: Arc<NamespacePaths>,
    pub(crate) sink: Arc<dyn EventSink>,
}

impl LogContext {
    /// Encodes an opaque value through the codec.
    pub(crate) fn encode_value(&self, value: &Value) -> Result<Bytes> {
        guard(self.codec.encode(value))
    }

    /// Encodes a typed payload through the codec.
    pub(crate) fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        let value = serde_json::to_value(value)
            .map_err(|e| guard_err(CoordError::codec(format!("to value: {e}"))))?;
        self.encode_value(&value)
    }

    /// Decodes payload bytes into an opaque value.
    pub(crate) fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        guard(self.codec.decode(bytes))
    }

    /// Decodes payload bytes into a typed payload.
    pub(crate) fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let value = self.decode_value(bytes)?;
        serde_json::from_value(value)
            .map_err(|e| guard_err(CoordError::codec(format!("from value: {e}"))))
    }
}

/// The coordination log backend.
///
/// Owns the connection lifecycle and hands out component handles. All
/// handles share one client; cursors live inside each subscription.
pub struct CoordinationLog {
    ctx: LogContext,
    connection: ConnectionManager,
    config: LogConfig,
}

impl CoordinationLog {
    /// Connects per the configuration and bootstraps the namespace.
    ///
    /// `base_replica` seeds the origin snapshot on first start for the
    /// tenancy; later starts leave the stored snapshot untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the backend cannot
    /// be reached, or the bootstrap fails.
    pub async fn connect(
        config: LogConfig,
        codec: Arc<dyn Codec>,
        sink: Arc<dyn EventSink>,
        base_replica: Value,
    ) -> Result<Self> {
        let client: Arc<dyn Coordination> = if config.server {
            Arc::new(MemoryCoordination::new())
        } else {
            dial(&config).await?
        };
        Self::with_client(config, client, codec, sink, base_replica).await
    }

    /// Like [`CoordinationLog::connect`], with a caller-supplied client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the bootstrap
    /// fails.
    pub async fn with_client(
        config: LogConfig,
        client: Arc<dyn Coordination>,
        codec: Arc<dyn Codec>,
        sink: Arc<dyn EventSink>,
        base_replica: Value,
    ) -> Result<Self> {
        let tenancy = config.tenancy()?;
        let connection = ConnectionManager::start(Arc::clone(&client)).await;
        let ctx = LogContext {
            client,
            codec,
            paths: Arc::new(NamespacePaths::new(&tenancy)),
            sink,
        };
        initialize(&ctx, &base_replica).await?;
        Ok(Self {
            ctx,
            connection,
            config,
        })
    }

    /// Returns the configuration this backend was built from.
    #[must_use]
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Returns the underlying client handle.
    #[must_use]
    pub fn client(&self) -> Arc<dyn Coordination> {
        self.connection.client()
    }

    /// Returns a log writer handle.
    #[must_use]
    pub fn writer(&self) -> LogWriter {
        LogWriter::new(self.ctx.clone())
    }

    /// Returns a log subscriber handle.
    #[must_use]
    pub fn subscriber(&self) -> LogSubscriber {
        LogSubscriber::new(self.ctx.clone())
    }

    /// Starts a subscription on a channel sized by the configuration.
    ///
    /// Convenience over [`LogSubscriber::subscribe`] with a caller-owned
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    pub async fn subscribe(&self) -> Result<(Subscription, mpsc::Receiver<LogEvent>)> {
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer_size);
        let subscription = self.subscriber().subscribe(tx).await?;
        Ok((subscription, rx))
    }

    /// Returns a chunk store handle.
    #[must_use]
    pub fn chunks(&self) -> ChunkStore {
        ChunkStore::new(self.ctx.clone())
    }

    /// Returns an origin manager handle.
    #[must_use]
    pub fn origin(&self) -> OriginManager {
        OriginManager::new(self.ctx.clone())
    }

    /// Returns a pulse registry handle.
    #[must_use]
    pub fn pulse(&self) -> PulseRegistry {
        PulseRegistry::new(self.ctx.clone())
    }

    /// Returns a GC handle.
    #[must_use]
    pub fn gc(&self) -> LogGc {
        LogGc::new(self.ctx.clone())
    }

    /// Stops the connection lifecycle and closes the client.
    ///
    /// # Errors
    ///
    /// Returns an error if closing the client fails.
    pub async fn shutdown(self) -> Result<()> {
        self.connection.shutdown().await
    }
}

#[cfg(feature = "zookeeper-backend")]
async fn dial(config: &LogConfig) -> Result<Arc<dyn Coordination>> {
    let client =
        skein_core::ZooKeeperCoordination::connect(&config.address, config.connect_timeout())
            .await
            .map_err(guard_err)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "zookeeper-backend"))]
async fn dial(_config: &LogConfig) -> Result<Arc<dyn Coordination>> {
    Err(LogError::Config {
        message: "built without the zookeeper-backend feature; enable it or set `server`"
            .to_string(),
    })
}

/// Creates the namespace skeleton and the initial origin and parameters.
async fn initialize(ctx: &LogContext, base_replica: &Value) -> Result<()> {
    swallow_exists(ctx.client.create_all(ctx.paths.prefix(), None).await)?;
    for root in ctx.paths.bootstrap_roots() {
        swallow_exists(ctx.client.create(&root, None, CreateMode::Persistent).await)?;
    }

    let origin_path = ctx.paths.origin();
    if guard(ctx.client.exists(&origin_path).await)?.is_none() {
        let snapshot = OriginSnapshot {
            message_id: -1,
            replica: base_replica.clone(),
        };
        let bytes = ctx.encode(&snapshot)?;
        swallow_exists(
            ctx.client
                .create(&origin_path, Some(bytes), CreateMode::Persistent)
                .await,
        )?;
    }

    let parameters_path = ctx.paths.log_parameters();
    if guard(ctx.client.exists(&parameters_path).await)?.is_none() {
        let bytes = ctx.encode(&LogParameters::current())?;
        swallow_exists(
            ctx.client
                .create(&parameters_path, Some(bytes), CreateMode::Persistent)
                .await,
        )?;
    }

    tracing::debug!(prefix = ctx.paths.prefix(), "namespace bootstrapped");
    Ok(())
}

/// Bootstrap-only: creation of an already-existing node is a no-op.
fn swallow_exists<T>(result: skein_core::Result<T>) -> Result<()> {
    match result {
        Ok(_) | Err(CoordError::NodeExists(_)) => Ok(()),
        Err(e) => Err(guard_err(e)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use skein_core::{JsonCodec, NullSink, Tenancy};

    /// Builds a bootstrapped context over a fresh in-memory store.
    pub(crate) async fn memory_context(tenancy_id: &str) -> (LogContext, MemoryCoordination) {
        let store = MemoryCoordination::new();
        let ctx = LogContext {
            client: Arc::new(store.clone()),
            codec: Arc::new(JsonCodec),
            paths: Arc::new(NamespacePaths::new(
                &Tenancy::new(tenancy_id).expect("tenancy"),
            )),
            sink: Arc::new(NullSink),
        };
        initialize(&ctx, &serde_json::json!({})).await.expect("bootstrap");
        (ctx, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{JsonCodec, NullSink};

    #[tokio::test]
    async fn bootstrap_creates_skeleton_and_origin() {
        let (ctx, store) = testing::memory_context("t1").await;

        for root in ctx.paths.bootstrap_roots() {
            assert!(
                store.exists(&root).await.expect("exists").is_some(),
                "missing root: {root}"
            );
        }

        let (bytes, _) = store.get(&ctx.paths.origin()).await.expect("origin");
        let snapshot: OriginSnapshot = ctx.decode(&bytes).expect("decode");
        assert_eq!(snapshot.message_id, -1);
        assert_eq!(snapshot.replica, serde_json::json!({}));
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let (ctx, _store) = testing::memory_context("t1").await;
        // A second peer bootstrapping the same tenancy must be a no-op.
        initialize(&ctx, &serde_json::json!({"seeded": true}))
            .await
            .expect("second bootstrap");

        let origin = OriginManager::new(ctx.clone()).read_origin().await.expect("read");
        assert_eq!(origin.message_id, -1);
        assert_eq!(origin.replica, serde_json::json!({}));
    }

    #[tokio::test]
    async fn connect_with_embedded_server() {
        let config = LogConfig::new("t1").with_embedded_server();
        let log = CoordinationLog::connect(
            config,
            Arc::new(JsonCodec),
            Arc::new(NullSink),
            serde_json::json!({}),
        )
        .await
        .expect("connect");

        assert!(log.client().is_started());
        log.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn invalid_tenancy_is_rejected() {
        let config = LogConfig::new("bad/tenancy").with_embedded_server();
        let result = CoordinationLog::connect(
            config,
            Arc::new(JsonCodec),
            Arc::new(NullSink),
            serde_json::json!({}),
        )
        .await;
        assert!(matches!(result, Err(LogError::Config { .. })));
    }

    #[test]
    fn log_parameters_serialize_kebab_case() {
        let json = serde_json::to_value(LogParameters::current()).expect("to value");
        assert_eq!(json["log-version"], LOG_VERSION);
    }
}
