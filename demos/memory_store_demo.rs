//! 内存存储演示：无需真实 Redis，展示加载、保存与重连重载
//! Memory store demo: load, save, and reconnect-reload without a real Redis

use hubot_redis_brain::brain::{Brain, BrainEvent};
use hubot_redis_brain::store::{MemoryStore, Store};
use hubot_redis_brain::sync::BrainSync;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

async fn wait_ready(events: &mut tokio::sync::broadcast::Receiver<BrainEvent>) {
  tokio::time::timeout(Duration::from_secs(2), async {
    loop {
      if let Ok(BrainEvent::Connected) = events.recv().await {
        break;
      }
    }
  })
  .await
  .expect("brain never became ready");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
    .init();

  let store = Arc::new(MemoryStore::new());
  store
    .set("hubot:storage", r#"{"greeting":"hello again"}"#.to_string())
    .await?;

  let brain = Arc::new(Brain::new());
  let mut events = brain.subscribe();
  let sync = Arc::new(BrainSync::new(
    Arc::clone(&brain),
    Arc::clone(&store) as Arc<dyn Store>,
  ));
  let handle = sync.clone().start();

  wait_ready(&mut events).await;
  println!("loaded: {:?}", brain.data().await);

  brain.set("users", json!({"1": {"name": "alice"}})).await;
  brain.save().await;
  tokio::time::sleep(Duration::from_millis(100)).await;
  println!("persisted: {:?}", store.get("hubot:storage").await?);

  // 另一个写者更新了存储，重连会把新数据合并回大脑
  // Another writer updates the store; a reconnect merges the new data back into the brain
  store
    .set("hubot:storage", r#"{"greeting":"updated elsewhere"}"#.to_string())
    .await?;
  store.connect().await?;
  wait_ready(&mut events).await;
  println!("after reload: {:?}", brain.data().await);

  brain.close().await;
  handle.await??;
  Ok(())
}
