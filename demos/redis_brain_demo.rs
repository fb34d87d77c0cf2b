//! Redis 大脑持久化演示
//! Redis brain persistence demo
//!
//! 运行前需要本地 Redis，或通过 REDIS_URL 等环境变量指定地址
//! Requires a local Redis, or a URL supplied via REDIS_URL and friends

use hubot_redis_brain::brain::{Brain, BrainEvent};
use hubot_redis_brain::store::RedisStore;
use hubot_redis_brain::sync::BrainSync;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// 插件存进大脑的典型记录
/// A typical record a plugin keeps in the brain
#[derive(Debug, Serialize)]
struct User {
  name: String,
  score: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
    .init();

  // 创建大脑和存储
  // Create the brain and the store
  let brain = Arc::new(Brain::new().with_save_interval(Duration::from_secs(2)));
  let store = Arc::new(RedisStore::from_env()?);

  // 先订阅就绪信号再启动适配器
  // Subscribe to the ready signal before starting the adapter
  let mut events = brain.subscribe();
  let sync = Arc::new(BrainSync::new(Arc::clone(&brain), store));
  let handle = sync.clone().start();

  // 等待持久化状态加载完成
  // Wait for persisted state to finish loading
  tokio::time::timeout(Duration::from_secs(5), async {
    loop {
      if let Ok(BrainEvent::Connected) = events.recv().await {
        break;
      }
    }
  })
  .await?;
  println!("brain ready: {:?}", brain.data().await);

  // 框架插件正常读写大脑，自动保存负责落盘
  // Framework plugins mutate the brain as usual; auto-save takes care of persistence
  let alice = User {
    name: "alice".to_string(),
    score: 7,
  };
  let bob = User {
    name: "bob".to_string(),
    score: 3,
  };
  brain
    .set(
      "users",
      serde_json::json!({"1": serde_json::to_value(&alice)?, "2": serde_json::to_value(&bob)?}),
    )
    .await;
  brain.save().await;
  tokio::time::sleep(Duration::from_millis(500)).await;

  // 关闭大脑即可优雅停机
  // Closing the brain shuts everything down gracefully
  brain.close().await;
  handle.await??;
  println!("done");
  Ok(())
}
