//! Redis 存储实现
//! Redis store implementation
//!
//! 基于单条多路复用连接实现键值存储，并由看门狗任务负责断线重连
//! Implements key-value storage over a single multiplexed connection, with a watchdog
//! task responsible for reconnecting after network loss

use crate::config::resolve_redis_url;
use crate::constants::{DEFAULT_PING_INTERVAL, DEFAULT_REDIS_URL, EVENT_CHANNEL_CAPACITY};
use crate::error::{Error, Result};
use crate::store::{Store, StoreEvent};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Redis 存储配置
/// Redis store configuration
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
  /// 连接地址，支持 `redis://host:port` 和 `redis+unix:///path` 两种形式
  /// Connection URL, in `redis://host:port` or `redis+unix:///path` form
  pub url: String,
  /// 看门狗检查间隔
  /// Watchdog check interval
  pub ping_interval: Duration,
  /// 是否启用看门狗
  /// Whether the watchdog is enabled
  pub watchdog: bool,
}

impl Default for RedisStoreConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_REDIS_URL.to_string(),
      ping_interval: DEFAULT_PING_INTERVAL,
      watchdog: true,
    }
  }
}

impl RedisStoreConfig {
  /// 从连接地址创建配置
  /// Create a configuration from a connection URL
  pub fn new<S: Into<String>>(url: S) -> Self {
    Self {
      url: url.into(),
      ..Self::default()
    }
  }

  /// 设置看门狗检查间隔
  /// Set the watchdog check interval
  pub fn with_ping_interval(mut self, interval: Duration) -> Self {
    self.ping_interval = interval;
    self
  }

  /// 开关看门狗
  /// Toggle the watchdog
  pub fn with_watchdog(mut self, enabled: bool) -> Self {
    self.watchdog = enabled;
    self
  }
}

/// Redis 存储
/// Redis store
///
/// 每个实例最多持有一条在途连接；连接句柄由实例独占，并在 `quit` 时释放一次
/// Each instance holds at most one outstanding connection; the handle is exclusively
/// owned by the instance and released exactly once on `quit`
pub struct RedisStore {
  client: Client,
  config: RedisStoreConfig,
  conn: Arc<RwLock<Option<MultiplexedConnection>>>,
  event_tx: broadcast::Sender<StoreEvent>,
  done: Arc<AtomicBool>,
  watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl RedisStore {
  /// 创建新的 Redis 存储实例
  /// Create a new Redis store instance
  ///
  /// 仅解析地址，不会建立连接
  /// Only parses the URL; no connection is opened yet
  pub fn new(config: RedisStoreConfig) -> Result<Self> {
    let client = Client::open(config.url.as_str())
      .map_err(|e| Error::config(format!("invalid redis url {}: {e}", config.url)))?;
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Ok(Self {
      client,
      config,
      conn: Arc::new(RwLock::new(None)),
      event_tx,
      done: Arc::new(AtomicBool::new(false)),
      watchdog: Mutex::new(None),
    })
  }

  /// 按环境变量优先级解析地址并创建实例
  /// Resolve the URL by environment variable precedence and create an instance
  pub fn from_env() -> Result<Self> {
    let resolved = resolve_redis_url();
    match resolved.source {
      Some(name) => {
        tracing::info!("discovered redis from {name} environment variable");
      }
      None => {
        tracing::info!("using default redis on localhost:6379");
      }
    }
    Self::new(RedisStoreConfig::new(resolved.url))
  }

  /// 当前是否持有活跃连接
  /// Whether a live connection is currently held
  pub async fn is_connected(&self) -> bool {
    self.conn.read().await.is_some()
  }

  /// 启动看门狗任务
  /// Start the watchdog task
  ///
  /// 周期性 PING 活跃连接；失败时丢弃句柄并在下一个周期尝试重连，
  /// 重连成功后再次发出 [`StoreEvent::Connected`]
  /// Periodically PINGs the live connection; on failure the handle is dropped and a
  /// reconnect is attempted on the next cycle, emitting [`StoreEvent::Connected`]
  /// again once it succeeds
  fn spawn_watchdog(&self) {
    if !self.config.watchdog {
      return;
    }
    let mut guard = self.watchdog.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handle) = guard.as_ref() {
      if !handle.is_finished() {
        return;
      }
    }

    let client = self.client.clone();
    let conn_slot = Arc::clone(&self.conn);
    let event_tx = self.event_tx.clone();
    let done = Arc::clone(&self.done);
    let interval = self.config.ping_interval;
    *guard = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      // 首次 tick 立即完成
      // The first tick completes immediately
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if done.load(Ordering::Relaxed) {
          tracing::debug!("watchdog: shutting down");
          break;
        }

        let current = conn_slot.read().await.clone();
        match current {
          Some(mut conn) => {
            let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            if let Err(e) = pong {
              let _ = event_tx.send(StoreEvent::Error(e.to_string()));
              *conn_slot.write().await = None;
            }
          }
          None => match client.get_multiplexed_async_connection().await {
            Ok(conn) => {
              *conn_slot.write().await = Some(conn);
              tracing::debug!("watchdog: reconnected to redis");
              let _ = event_tx.send(StoreEvent::Connected);
            }
            Err(e) => {
              let _ = event_tx.send(StoreEvent::Error(e.to_string()));
            }
          },
        }
      }
    }));
  }
}

#[async_trait]
impl Store for RedisStore {
  async fn connect(&self) -> Result<()> {
    self.done.store(false, Ordering::Relaxed);
    let result = match self.client.get_multiplexed_async_connection().await {
      Ok(conn) => {
        *self.conn.write().await = Some(conn);
        tracing::debug!("successfully connected to redis");
        let _ = self.event_tx.send(StoreEvent::Connected);
        Ok(())
      }
      Err(e) => {
        let _ = self.event_tx.send(StoreEvent::Error(e.to_string()));
        Err(e.into())
      }
    };
    // 即使首次连接失败也启动看门狗，以便稍后恢复
    // The watchdog starts even when the first connect fails, so a later recovery is possible
    self.spawn_watchdog();
    result
  }

  async fn get(&self, key: &str) -> Result<Option<String>> {
    let Some(mut conn) = self.conn.read().await.clone() else {
      return Err(Error::NotConnected);
    };
    match conn.get::<_, Option<String>>(key).await {
      Ok(reply) => Ok(reply),
      Err(e) => {
        let _ = self.event_tx.send(StoreEvent::Error(e.to_string()));
        Err(e.into())
      }
    }
  }

  async fn set(&self, key: &str, value: String) -> Result<()> {
    let Some(mut conn) = self.conn.read().await.clone() else {
      let _ = self
        .event_tx
        .send(StoreEvent::Error("store is not connected".to_string()));
      return Err(Error::NotConnected);
    };
    match conn.set::<_, _, ()>(key, value).await {
      Ok(()) => Ok(()),
      Err(e) => {
        let _ = self.event_tx.send(StoreEvent::Error(e.to_string()));
        Err(e.into())
      }
    }
  }

  async fn quit(&self) -> Result<()> {
    self.done.store(true, Ordering::Relaxed);
    if let Some(handle) = self
      .watchdog
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .take()
    {
      handle.abort();
    }
    if let Some(mut conn) = self.conn.write().await.take() {
      // 有序断开：先刷掉在途命令再让服务端关闭连接
      // Orderly disconnect: flush in-flight commands, then let the server close the connection
      let _: redis::RedisResult<()> = redis::cmd("QUIT").query_async(&mut conn).await;
    }
    tracing::debug!("redis connection closed");
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
    self.event_tx.subscribe()
  }
}
