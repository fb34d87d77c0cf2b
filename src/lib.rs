//! # hubot-redis-brain
//!
//! Redis-backed persistence for a chat bot's in-memory brain
//!
//! 本库把聊天机器人框架的内存键值状态（"大脑"）同步到 Redis 兼容的远端存储。
//! This library synchronizes a chat bot framework's in-memory key-value state (the "brain")
//! with a remote Redis-compatible store.
//! 启动时加载已持久化的状态，之后每次保存事件把完整状态写回单个键下。
//! Previously persisted state is loaded at startup; afterwards every save event writes the
//! entire state back under a single key.
//!
//! ## 特性
//! ## Features
//!
//! - 整个状态作为单键下的不透明 JSON 块持久化
//!   - The entire state persists as an opaque JSON blob under one key
//! - 按固定优先级从环境变量发现 Redis 地址
//!   - Redis URL discovery from environment variables in a fixed precedence order
//! - 加载完成前关闭自动保存，防止空状态覆盖真实数据
//!   - Auto-save is gated off until loading completes, so an empty state never overwrites real data
//! - 断线后由看门狗重连，重连自动触发重新加载
//!   - A watchdog reconnects after network loss, and reconnects automatically trigger a reload
//! - 连接被拒绝的瞬态噪音不会刷错误日志
//!   - Transient connection-refused noise never floods the error log
//! - 内存存储实现，无需真实 Redis 即可测试
//!   - A memory store implementation, testable without a real Redis
//!
//! ## 快速开始
//! ## Quick Start
//!
//! ```rust,no_run
//! use hubot_redis_brain::brain::Brain;
//! use hubot_redis_brain::store::RedisStore;
//! use hubot_redis_brain::sync::BrainSync;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 创建大脑和存储
//!     // Create the brain and the store
//!     let brain = Arc::new(Brain::new());
//!     let store = Arc::new(RedisStore::from_env()?);
//!
//!     // 启动同步适配器
//!     // Start the sync adapter
//!     let sync = Arc::new(BrainSync::new(Arc::clone(&brain), store));
//!     let handle = sync.clone().start();
//!
//!     // 框架插件正常读写大脑
//!     // Framework plugins read and write the brain as usual
//!     brain.set("users", serde_json::json!({})).await;
//!     brain.save().await;
//!
//!     // 关闭大脑即可优雅停机
//!     // Closing the brain shuts everything down gracefully
//!     brain.close().await;
//!     handle.await??;
//!     Ok(())
//! }
//! ```

pub mod brain;
pub mod config;
pub mod constants;
pub mod error;
pub mod store;
pub mod sync;
