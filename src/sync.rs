//! 同步模块
//! Sync module
//!
//! 持久化适配器：把大脑的生命周期事件桥接到远端存储。
//! 启动时把已持久化的状态加载进内存，每次保存事件把完整状态序列化写回。
//! The persistence adapter: bridges the brain's lifecycle events to the remote store.
//! On startup it loads previously persisted state into memory; on every save event
//! it serializes the entire state and writes it back.

use crate::brain::{Brain, BrainData, BrainEvent};
use crate::constants::{storage_key, DEFAULT_KEY_PREFIX};
use crate::error::Result;
use crate::store::{Store, StoreEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// 连接生命周期状态
/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  /// 初始态
  /// Initial state
  Disconnected,
  /// 正在建立连接
  /// Connection being established
  Connecting,
  /// 连接已建立
  /// Connection established
  Connected,
  /// 终态，不再发生任何转换
  /// Terminal state, no further transitions
  Closed,
}

impl SyncState {
  /// 状态名
  /// State name
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncState::Disconnected => "disconnected",
      SyncState::Connecting => "connecting",
      SyncState::Connected => "connected",
      SyncState::Closed => "closed",
    }
  }
}

/// 判断错误消息是否为连接被拒绝
/// Check whether an error message indicates a refused connection
///
/// 此类错误视为预期内的瞬态噪音（例如 Redis 重启期间），仅以 debug 级别记录
/// Such errors are treated as expected transient noise (e.g. during a Redis restart)
/// and logged at debug level only
pub fn is_connection_refused(message: &str) -> bool {
  let lower = message.to_lowercase();
  lower.contains("econnrefused") || lower.contains("connection refused")
}

/// 大脑同步适配器
/// Brain sync adapter
///
/// 单个事件循环驱动：大脑事件触发存储读写，存储连接事件触发重新加载。
/// 所有加载都在同一个循环里串行执行，重连触发的加载不会与在途加载竞争。
/// Driven by a single event loop: brain events trigger store reads/writes, store
/// connection events trigger reloads. All loads run serially inside the one loop,
/// so a reconnect-triggered load can never race an in-flight one.
pub struct BrainSync {
  brain: Arc<Brain>,
  store: Arc<dyn Store>,
  key: String,
  state: Mutex<SyncState>,
  done: Arc<AtomicBool>,
}

impl BrainSync {
  /// 创建新的同步适配器
  /// Create a new sync adapter
  pub fn new(brain: Arc<Brain>, store: Arc<dyn Store>) -> Self {
    Self {
      brain,
      store,
      key: storage_key(DEFAULT_KEY_PREFIX),
      state: Mutex::new(SyncState::Disconnected),
      done: Arc::new(AtomicBool::new(false)),
    }
  }

  /// 设置存储键前缀
  /// Set the storage key prefix
  pub fn with_key_prefix(mut self, prefix: &str) -> Self {
    self.key = storage_key(prefix);
    self
  }

  /// 完整存储键
  /// The full storage key
  pub fn storage_key(&self) -> &str {
    &self.key
  }

  /// 当前连接状态
  /// Current connection state
  pub fn state(&self) -> SyncState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, next: SyncState) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    // Closed 为终态
    // Closed is terminal
    if *state == SyncState::Closed || *state == next {
      return;
    }
    tracing::debug!("sync state {} -> {}", state.as_str(), next.as_str());
    *state = next;
  }

  /// 启动适配器
  /// Start the adapter
  ///
  /// 返回的句柄在大脑关闭或调用 [`shutdown`](Self::shutdown) 后以 `Ok(())` 结束；
  /// 加载持久化状态失败（读错误或损坏的 JSON）会终止任务并通过句柄返回 `Err`，
  /// 绝不把不可读的状态当作"没有数据"悄悄吞掉
  /// The returned handle resolves to `Ok(())` once the brain closes or
  /// [`shutdown`](Self::shutdown) is called; a failure to load persisted state (read
  /// error or corrupt JSON) aborts the task and surfaces as `Err` through the handle —
  /// unreadable state is never silently treated as "no data"
  pub fn start(self: Arc<Self>) -> JoinHandle<Result<()>> {
    tracing::info!("starting brain sync on key {}", self.key);
    tokio::spawn(async move {
      let result = self.run().await;
      self.done.store(true, Ordering::Relaxed);
      if let Err(e) = &result {
        tracing::error!("brain sync terminated: {e}");
      }
      result
    })
  }

  async fn run(&self) -> Result<()> {
    // 先订阅再连接，保证不错过首个连接事件
    // Subscribe before connecting so the first connection event is not missed
    let mut brain_rx = self.brain.subscribe();
    let mut store_rx = self.store.subscribe();

    // 首次加载完成前关闭自动保存，避免把空状态写回存储
    // Auto-save stays off until the first load completes, so an empty state is never
    // written back over real data
    self.brain.set_auto_save(false);

    self.set_state(SyncState::Connecting);
    if let Err(e) = self.store.connect().await {
      // 启动连接失败不致命；后续读写各自失败并被记录，等待看门狗恢复
      // A failed startup connect is not fatal; later reads/writes fail and get logged
      // until the watchdog recovers the connection
      tracing::error!("failed to connect to store: {e}");
    }

    loop {
      tokio::select! {
        event = brain_rx.recv() => match event {
          Ok(BrainEvent::Save(data)) => self.save_data(data).await,
          Ok(BrainEvent::Close) => {
            if let Err(e) = self.store.quit().await {
              tracing::error!("error closing store connection: {e}");
            }
            self.set_state(SyncState::Closed);
            break;
          }
          // 就绪信号由本适配器发出，这里无需处理
          // The ready signal is emitted by this adapter itself, nothing to handle here
          Ok(BrainEvent::Connected) => {}
          Err(broadcast::error::RecvError::Lagged(missed)) => {
            tracing::warn!("brain event stream lagged, {missed} events dropped");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        },
        event = store_rx.recv() => match event {
          Ok(StoreEvent::Connected) => {
            self.set_state(SyncState::Connected);
            self.get_data().await?;
          }
          Ok(StoreEvent::Error(message)) => self.handle_store_error(&message),
          Err(broadcast::error::RecvError::Lagged(missed)) => {
            tracing::warn!("store event stream lagged, {missed} events dropped");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        },
        _ = tokio::time::sleep(Duration::from_millis(100)) => {
          if self.done.load(Ordering::Relaxed) {
            tracing::debug!("brain sync: shutting down");
            break;
          }
        }
      }
    }
    Ok(())
  }

  /// 从存储加载状态并合并进大脑
  /// Load state from the store and merge it into the brain
  ///
  /// 每次连接建立后执行一次；合并完成后发出就绪信号并重新开启自动保存
  /// Runs once per established connection; after the merge completes the ready signal
  /// is emitted and auto-save is re-enabled
  async fn get_data(&self) -> Result<()> {
    match self.store.get(&self.key).await? {
      Some(reply) => {
        let loaded: BrainData = serde_json::from_str(&reply)?;
        tracing::info!("data for brain retrieved from store");
        self.brain.merge_data(loaded).await;
        self.brain.emit_connected();
      }
      None => {
        tracing::info!("initializing new data for brain");
        self.brain.merge_data(BrainData::new()).await;
        self.brain.emit_connected();
      }
    }
    self.brain.set_auto_save(true);
    Ok(())
  }

  /// 将快照序列化后写入存储
  /// Serialize the snapshot and write it to the store
  async fn save_data(&self, data: BrainData) {
    let payload = match serde_json::to_string(&data) {
      Ok(payload) => payload,
      Err(e) => {
        tracing::error!("failed to serialize brain data: {e}");
        return;
      }
    };
    // 即发即弃：写失败只通过存储的错误事件浮现，没有重试也没有确认
    // Fire and forget: a failed write only surfaces through the store's error events,
    // with no retry and no acknowledgment
    let _ = self.store.set(&self.key, payload).await;
  }

  fn handle_store_error(&self, message: &str) {
    if self.state() == SyncState::Connected {
      // 瞬态网络错误回到过渡态，重连由底层存储客户端自行处理
      // A transient network error returns to the transitional state; reconnection is
      // handled by the underlying store client
      self.set_state(SyncState::Connecting);
    }
    if is_connection_refused(message) {
      tracing::debug!("store connection refused: {message}");
    } else {
      tracing::error!("store error: {message}");
    }
  }

  /// 请求事件循环终止
  /// Request the termination of the event loop
  pub fn shutdown(&self) {
    self.done.store(true, Ordering::Relaxed);
  }

  /// 检查是否已停止
  /// Check if it has stopped
  pub fn is_done(&self) -> bool {
    self.done.load(Ordering::Relaxed)
  }
}
