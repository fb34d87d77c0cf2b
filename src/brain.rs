//! 大脑模块
//! Brain module
//!
//! 聊天框架的内存键值存储，带生命周期事件和自动保存机制
//! The chat framework's in-memory key-value store, with lifecycle events and an auto-save mechanism
//!
//! 持久化适配器只消费这里的事件并回写数据，不拥有大脑本身
//! The persistence adapter only consumes the events emitted here and writes data back; it does not own the brain

use crate::constants::{DEFAULT_SAVE_INTERVAL, EVENT_CHANNEL_CAPACITY};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// 大脑数据：任意嵌套的 JSON 映射
/// Brain data: an arbitrarily nested JSON mapping
pub type BrainData = serde_json::Map<String, Value>;

/// 大脑生命周期事件
/// Brain lifecycle event
#[derive(Debug, Clone)]
pub enum BrainEvent {
  /// 保存事件，携带当前状态的完整快照
  /// Save event, carrying a full snapshot of the current state
  Save(BrainData),
  /// 数据就绪事件，由持久化适配器在加载完成后发出
  /// Data-ready event, emitted by the persistence adapter once loading completes
  Connected,
  /// 关闭事件
  /// Close event
  Close,
}

/// 内存大脑
/// In-memory brain
///
/// 状态是一个不透明的 JSON 映射，由框架插件在运行时修改。
/// 启用自动保存后，后台任务按固定间隔广播 [`BrainEvent::Save`]。
/// The state is an opaque JSON mapping mutated by framework plugins at runtime.
/// With auto-save enabled, a background task broadcasts [`BrainEvent::Save`] at a fixed interval.
pub struct Brain {
  /// 内存状态
  /// In-memory state
  data: Arc<RwLock<BrainData>>,
  /// 生命周期事件发送器
  /// Lifecycle event sender
  event_tx: broadcast::Sender<BrainEvent>,
  /// 自动保存开关
  /// Auto-save flag
  auto_save: Arc<AtomicBool>,
  /// 自动保存间隔
  /// Auto-save interval
  save_interval: Duration,
  /// 自动保存任务句柄
  /// Auto-save task handle
  ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Brain {
  fn default() -> Self {
    Self::new()
  }
}

impl Brain {
  /// 创建新的大脑实例
  /// Create a new brain instance
  pub fn new() -> Self {
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      data: Arc::new(RwLock::new(BrainData::new())),
      event_tx,
      auto_save: Arc::new(AtomicBool::new(false)),
      save_interval: DEFAULT_SAVE_INTERVAL,
      ticker: Mutex::new(None),
    }
  }

  /// 设置自动保存间隔
  /// Set the auto-save interval
  pub fn with_save_interval(mut self, interval: Duration) -> Self {
    self.save_interval = interval;
    self
  }

  /// 订阅生命周期事件
  /// Subscribe to lifecycle events
  pub fn subscribe(&self) -> broadcast::Receiver<BrainEvent> {
    self.event_tx.subscribe()
  }

  /// 获取当前状态的快照
  /// Get a snapshot of the current state
  pub async fn data(&self) -> BrainData {
    self.data.read().await.clone()
  }

  /// 将给定映射浅合并进当前状态
  /// Shallow-merge the given mapping into the current state
  ///
  /// 已有的无关键保持不变；合并不会触发保存事件
  /// Unrelated existing keys are left untouched; merging never triggers a save event
  pub async fn merge_data(&self, other: BrainData) {
    let mut data = self.data.write().await;
    for (key, value) in other {
      data.insert(key, value);
    }
  }

  /// 读取单个键
  /// Read a single key
  pub async fn get(&self, key: &str) -> Option<Value> {
    self.data.read().await.get(key).cloned()
  }

  /// 写入单个键
  /// Write a single key
  pub async fn set<V: Into<Value>>(&self, key: &str, value: V) {
    self.data.write().await.insert(key.to_string(), value.into());
  }

  /// 删除单个键
  /// Remove a single key
  pub async fn remove(&self, key: &str) -> Option<Value> {
    self.data.write().await.remove(key)
  }

  /// 立即广播一次保存事件
  /// Broadcast a save event immediately
  pub async fn save(&self) {
    let snapshot = self.data().await;
    let _ = self.event_tx.send(BrainEvent::Save(snapshot));
  }

  /// 开关自动保存
  /// Toggle auto-save
  ///
  /// 启用后，后台任务每个间隔广播一次当前快照；
  /// 关闭后任务在下一个周期退出
  /// When enabled, a background task broadcasts the current snapshot once per interval;
  /// when disabled the task exits on its next cycle
  pub fn set_auto_save(&self, enabled: bool) {
    self.auto_save.store(enabled, Ordering::Relaxed);
    if !enabled {
      return;
    }

    let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handle) = ticker.as_ref() {
      if !handle.is_finished() {
        return;
      }
    }

    let data = Arc::clone(&self.data);
    let event_tx = self.event_tx.clone();
    let auto_save = Arc::clone(&self.auto_save);
    let interval = self.save_interval;
    *ticker = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      // 首次 tick 立即完成，跳过以保证第一次保存落在一个完整间隔之后
      // The first tick completes immediately; skip it so the first save lands after a full interval
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if !auto_save.load(Ordering::Relaxed) {
          break;
        }
        let snapshot = data.read().await.clone();
        let _ = event_tx.send(BrainEvent::Save(snapshot));
      }
    }));
  }

  /// 自动保存是否开启
  /// Whether auto-save is enabled
  pub fn auto_save_enabled(&self) -> bool {
    self.auto_save.load(Ordering::Relaxed)
  }

  /// 发出数据就绪事件
  /// Emit the data-ready event
  ///
  /// 由持久化适配器在初次加载或重载完成后调用
  /// Called by the persistence adapter once an initial load or a reload completes
  pub fn emit_connected(&self) {
    let _ = self.event_tx.send(BrainEvent::Connected);
  }

  /// 关闭大脑
  /// Close the brain
  ///
  /// 停止自动保存，广播最后一次保存事件，然后广播关闭事件
  /// Stops auto-save, broadcasts one final save event, then broadcasts the close event
  pub async fn close(&self) {
    self.auto_save.store(false, Ordering::Relaxed);
    if let Some(handle) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
      handle.abort();
    }
    self.save().await;
    let _ = self.event_tx.send(BrainEvent::Close);
  }
}
