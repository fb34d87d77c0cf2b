//! 内存存储实现
//! Memory store implementation
//!
//! 使用内存数据结构实现键值存储，不依赖任何外部服务，用于测试和演示
//! Implements key-value storage using in-memory data structures without any external
//! service dependencies, for tests and demos

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::Result;
use crate::store::{Store, StoreEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// 内存存储
/// Memory store
///
/// `connect` 永远成功并发出 [`StoreEvent::Connected`]；再次调用可模拟一次重连
/// `connect` always succeeds and emits [`StoreEvent::Connected`]; calling it again
/// models a reconnect
pub struct MemoryStore {
  /// 键值数据
  /// Key-value data
  entries: Arc<RwLock<HashMap<String, String>>>,
  /// 连接事件发送器
  /// Connection event sender
  event_tx: broadcast::Sender<StoreEvent>,
  /// 是否已断开
  /// Whether the store has been closed
  closed: AtomicBool,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  /// 创建新的内存存储实例
  /// Create a new memory store instance
  pub fn new() -> Self {
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      entries: Arc::new(RwLock::new(HashMap::new())),
      event_tx,
      closed: AtomicBool::new(false),
    }
  }

  /// 是否已调用过 `quit`
  /// Whether `quit` has been called
  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Relaxed)
  }

  /// 当前条目数
  /// Current number of entries
  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }

  /// 是否为空
  /// Whether the store is empty
  pub async fn is_empty(&self) -> bool {
    self.entries.read().await.is_empty()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn connect(&self) -> Result<()> {
    self.closed.store(false, Ordering::Relaxed);
    let _ = self.event_tx.send(StoreEvent::Connected);
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.entries.read().await.get(key).cloned())
  }

  async fn set(&self, key: &str, value: String) -> Result<()> {
    self.entries.write().await.insert(key.to_string(), value);
    Ok(())
  }

  async fn quit(&self) -> Result<()> {
    self.closed.store(true, Ordering::Relaxed);
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
    self.event_tx.subscribe()
  }
}
