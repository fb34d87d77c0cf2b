//! 存储模块
//! Store module
//!
//! 定义了与远端键值服务交互的抽象层
//! Defines the abstraction layer for interacting with the remote key-value service

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

pub mod memory_store;
pub mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

/// 存储连接事件
/// Store connection event
#[derive(Debug, Clone)]
pub enum StoreEvent {
  /// 连接建立（含重连）
  /// Connection established (including reconnects)
  Connected,
  /// 连接层错误，携带诊断消息
  /// Connection-level error, carrying the diagnostic message
  Error(String),
}

/// 存储特性，定义了与远端键值服务交互的接口
/// Store trait, defines the interface for interacting with the remote key-value service
///
/// 实现者持有唯一一条逻辑连接，连接生命周期事件通过广播通道暴露
/// Implementors own a single logical connection; connection lifecycle events are exposed
/// through a broadcast channel
#[async_trait]
pub trait Store: Send + Sync {
  /// 打开连接；成功后发出 [`StoreEvent::Connected`]
  /// Open the connection; emits [`StoreEvent::Connected`] on success
  async fn connect(&self) -> Result<()>;

  /// 读取键的原始值，键不存在时返回 `None`
  /// Read the raw value at a key, `None` when the key is absent
  async fn get(&self, key: &str) -> Result<Option<String>>;

  /// 写入键值，无条件覆盖旧内容
  /// Write a value, unconditionally overwriting prior content
  async fn set(&self, key: &str, value: String) -> Result<()>;

  /// 优雅断开连接，此后不再重连
  /// Disconnect gracefully; no reconnects afterwards
  async fn quit(&self) -> Result<()>;

  /// 订阅连接事件
  /// Subscribe to connection events
  fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
