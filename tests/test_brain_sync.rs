// BrainSync 集成测试：用内存存储和桩存储驱动完整的事件循环
// BrainSync integration tests: drive the full event loop with memory and stub stores

use async_trait::async_trait;
use hubot_redis_brain::brain::{Brain, BrainEvent};
use hubot_redis_brain::error::{Error, Result};
use hubot_redis_brain::store::{MemoryStore, Store, StoreEvent};
use hubot_redis_brain::sync::{BrainSync, SyncState};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

const STORAGE_KEY: &str = "hubot:storage";

/// 等待大脑发出就绪信号
/// Wait for the brain to signal readiness
async fn wait_for_ready(rx: &mut broadcast::Receiver<BrainEvent>) {
  tokio::time::timeout(Duration::from_secs(2), async {
    loop {
      match rx.recv().await {
        Ok(BrainEvent::Connected) => break,
        Ok(_) => {}
        Err(e) => panic!("brain event stream ended: {e}"),
      }
    }
  })
  .await
  .expect("brain never became ready");
}

/// 轮询等待条件成立
/// Poll until the condition holds
async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
  tokio::time::timeout(Duration::from_secs(2), async {
    while !cond() {
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// 可编排的桩存储：连接、读取行为均可配置
/// Scriptable stub store with configurable connect and read behavior
struct StubStore {
  entries: RwLock<HashMap<String, String>>,
  event_tx: broadcast::Sender<StoreEvent>,
  fail_connect: bool,
  fail_reads: bool,
  emit_on_connect: bool,
}

impl StubStore {
  fn new() -> Self {
    let (event_tx, _) = broadcast::channel(16);
    Self {
      entries: RwLock::new(HashMap::new()),
      event_tx,
      fail_connect: false,
      fail_reads: false,
      emit_on_connect: true,
    }
  }

  fn failing_connect() -> Self {
    Self {
      fail_connect: true,
      ..Self::new()
    }
  }

  fn failing_reads() -> Self {
    Self {
      fail_reads: true,
      ..Self::new()
    }
  }

  fn manual_connect() -> Self {
    Self {
      emit_on_connect: false,
      ..Self::new()
    }
  }

  fn emit_connected(&self) {
    let _ = self.event_tx.send(StoreEvent::Connected);
  }

  fn emit_error(&self, message: &str) {
    let _ = self.event_tx.send(StoreEvent::Error(message.to_string()));
  }

  async fn len(&self) -> usize {
    self.entries.read().await.len()
  }
}

#[async_trait]
impl Store for StubStore {
  async fn connect(&self) -> Result<()> {
    if self.fail_connect {
      self.emit_error("Connection refused (os error 111)");
      return Err(Error::store("Connection refused (os error 111)"));
    }
    if self.emit_on_connect {
      self.emit_connected();
    }
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Option<String>> {
    if self.fail_reads {
      return Err(Error::store("storage backend exploded"));
    }
    Ok(self.entries.read().await.get(key).cloned())
  }

  async fn set(&self, key: &str, value: String) -> Result<()> {
    self.entries.write().await.insert(key.to_string(), value);
    Ok(())
  }

  async fn quit(&self) -> Result<()> {
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
    self.event_tx.subscribe()
  }
}

#[tokio::test]
async fn test_load_merges_stored_state_and_signals_ready() {
  let store = Arc::new(MemoryStore::new());
  store
    .set(
      STORAGE_KEY,
      r#"{"users":{"1":{"name":"alice"}}}"#.to_string(),
    )
    .await
    .unwrap();

  let brain = Arc::new(Brain::new());
  brain.set("keep", json!("me")).await;
  let mut events = brain.subscribe();

  let sync = Arc::new(BrainSync::new(Arc::clone(&brain), store));
  let _handle = sync.clone().start();
  wait_for_ready(&mut events).await;

  // 已有键保留，加载的键合并进来
  // Existing keys survive, loaded keys are merged in
  assert_eq!(brain.get("keep").await, Some(json!("me")));
  assert_eq!(
    brain.get("users").await,
    Some(json!({"1": {"name": "alice"}}))
  );
  assert!(brain.auto_save_enabled());
  assert_eq!(sync.state(), SyncState::Connected);
}

#[tokio::test]
async fn test_empty_store_leaves_state_unchanged_but_ready() {
  let store = Arc::new(MemoryStore::new());
  let brain = Arc::new(Brain::new());
  brain.set("a", json!(1)).await;
  let mut events = brain.subscribe();

  let sync = Arc::new(BrainSync::new(Arc::clone(&brain), store));
  let _handle = sync.clone().start();
  wait_for_ready(&mut events).await;

  let data = brain.data().await;
  assert_eq!(data.len(), 1);
  assert_eq!(data.get("a"), Some(&json!(1)));
  assert!(brain.auto_save_enabled());
}

#[tokio::test]
async fn test_auto_save_gated_until_first_load() {
  let store = Arc::new(StubStore::manual_connect());
  let brain = Arc::new(Brain::new());
  // 框架先行开启自动保存，适配器启动时必须关掉它
  // The framework enables auto-save first; the adapter must turn it off at startup
  brain.set_auto_save(true);
  let mut events = brain.subscribe();

  let sync = Arc::new(BrainSync::new(Arc::clone(&brain), Arc::clone(&store) as _));
  let _handle = sync.clone().start();

  {
    let brain = Arc::clone(&brain);
    wait_until("auto-save to be disabled", move || {
      !brain.auto_save_enabled()
    })
    .await;
  }
  // 就绪前不得有任何可观察的写入
  // No write may have an observable effect before readiness
  assert_eq!(store.len().await, 0);

  store.emit_connected();
  wait_for_ready(&mut events).await;
  assert!(brain.auto_save_enabled());
}

#[tokio::test]
async fn test_save_round_trip_across_adapter_instances() {
  let store = Arc::new(MemoryStore::new());

  let brain1 = Arc::new(Brain::new());
  let mut events1 = brain1.subscribe();
  let sync1 = Arc::new(BrainSync::new(
    Arc::clone(&brain1),
    Arc::clone(&store) as Arc<dyn Store>,
  ));
  let handle1 = sync1.clone().start();
  wait_for_ready(&mut events1).await;

  brain1
    .set(
      "users",
      json!({"1": {"name": "alice", "roles": ["admin"], "score": 4.5}}),
    )
    .await;
  brain1.set("enabled", json!(true)).await;
  brain1.set("nothing", json!(null)).await;
  let snapshot = brain1.data().await;
  brain1.close().await;
  handle1
    .await
    .unwrap()
    .expect("first adapter should close cleanly");

  // 新的适配器实例从同一个存储加载
  // A fresh adapter instance loads from the same store
  let brain2 = Arc::new(Brain::new());
  let mut events2 = brain2.subscribe();
  let sync2 = Arc::new(BrainSync::new(
    Arc::clone(&brain2),
    Arc::clone(&store) as Arc<dyn Store>,
  ));
  let _handle2 = sync2.clone().start();
  wait_for_ready(&mut events2).await;

  // JSON 往返保真：对象、数组、字符串、数字、布尔、null
  // JSON round-trip fidelity: objects, arrays, strings, numbers, booleans, null
  assert_eq!(brain2.data().await, snapshot);
}

#[tokio::test]
async fn test_reconnect_triggers_exactly_one_reload() {
  let store = Arc::new(MemoryStore::new());
  let brain = Arc::new(Brain::new());
  let mut events = brain.subscribe();

  let sync = Arc::new(BrainSync::new(
    Arc::clone(&brain),
    Arc::clone(&store) as Arc<dyn Store>,
  ));
  let _handle = sync.clone().start();
  wait_for_ready(&mut events).await;

  // 模拟掉线重连前，存储里的数据被另一个写者更新
  // Before the simulated drop-and-reconnect, another writer updates the stored data
  store
    .set(STORAGE_KEY, r#"{"reloaded":true}"#.to_string())
    .await
    .unwrap();
  store.connect().await.unwrap();

  wait_for_ready(&mut events).await;
  assert_eq!(brain.get("reloaded").await, Some(json!(true)));

  // 恰好一次额外的加载周期，不会有第三次就绪信号
  // Exactly one additional load cycle, no third ready signal
  let extra = tokio::time::timeout(Duration::from_millis(200), async {
    loop {
      match events.recv().await {
        Ok(BrainEvent::Connected) => break true,
        Ok(_) => {}
        Err(_) => break false,
      }
    }
  })
  .await;
  assert!(extra.is_err(), "unexpected extra reload");
}

#[tokio::test]
async fn test_read_error_is_fatal_to_the_adapter() {
  let store = Arc::new(StubStore::failing_reads());
  let brain = Arc::new(Brain::new());

  let sync = Arc::new(BrainSync::new(Arc::clone(&brain), store));
  let handle = sync.clone().start();

  let result = tokio::time::timeout(Duration::from_secs(2), handle)
    .await
    .expect("adapter should terminate on read error")
    .unwrap();
  assert!(matches!(result, Err(Error::Store { .. })));
  // 就绪信号从未发出，自动保存保持关闭
  // The ready signal never fired and auto-save stayed off
  assert!(!brain.auto_save_enabled());
}

#[tokio::test]
async fn test_corrupt_persisted_state_is_fatal() {
  let store = Arc::new(MemoryStore::new());
  store
    .set(STORAGE_KEY, "{definitely not json".to_string())
    .await
    .unwrap();

  let sync = Arc::new(BrainSync::new(Arc::new(Brain::new()), store));
  let handle = sync.clone().start();

  let result = tokio::time::timeout(Duration::from_secs(2), handle)
    .await
    .expect("adapter should terminate on corrupt state")
    .unwrap();
  assert!(matches!(result, Err(Error::Serialization(_))));
}

#[tokio::test]
async fn test_save_event_writes_snapshot_to_store() {
  let store = Arc::new(MemoryStore::new());
  let brain = Arc::new(Brain::new());
  let mut events = brain.subscribe();

  let sync = Arc::new(BrainSync::new(
    Arc::clone(&brain),
    Arc::clone(&store) as Arc<dyn Store>,
  ));
  let _handle = sync.clone().start();
  wait_for_ready(&mut events).await;

  brain.set("users", json!({"1": {"name": "alice"}})).await;
  brain.save().await;

  tokio::time::timeout(Duration::from_secs(2), async {
    loop {
      if let Some(raw) = store.get(STORAGE_KEY).await.unwrap() {
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        if value == json!({"users": {"1": {"name": "alice"}}}) {
          break;
        }
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .expect("save never reached the store");
}

#[tokio::test]
async fn test_store_errors_do_not_terminate_the_adapter() {
  let store = Arc::new(StubStore::new());
  let brain = Arc::new(Brain::new());
  let mut events = brain.subscribe();

  let sync = Arc::new(BrainSync::new(Arc::clone(&brain), Arc::clone(&store) as _));
  let _handle = sync.clone().start();
  wait_for_ready(&mut events).await;
  assert_eq!(sync.state(), SyncState::Connected);

  // 连接被拒绝与普通错误都只是日志，不会杀死循环
  // Refused connections and ordinary errors are log-only, the loop survives both
  store.emit_error("connect ECONNREFUSED 127.0.0.1:6379");
  store.emit_error("WRONGTYPE Operation against a key holding the wrong kind of value");

  {
    let sync = Arc::clone(&sync);
    wait_until("state to fall back to connecting", move || {
      sync.state() == SyncState::Connecting
    })
    .await;
  }
  assert!(!sync.is_done());

  // 错误后保存路径依旧可用
  // The save path still works after errors
  brain.set("alive", json!(true)).await;
  brain.save().await;
  {
    let store = Arc::clone(&store);
    tokio::time::timeout(Duration::from_secs(2), async move {
      while store.len().await == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
    })
    .await
    .expect("save after error never reached the store");
  }
}

#[tokio::test]
async fn test_failed_startup_connect_degrades_then_recovers() {
  let store = Arc::new(StubStore::failing_connect());
  let brain = Arc::new(Brain::new());
  let mut events = brain.subscribe();

  let sync = Arc::new(BrainSync::new(Arc::clone(&brain), Arc::clone(&store) as _));
  let _handle = sync.clone().start();

  // 适配器在降级状态下继续运行：未就绪、未退出
  // The adapter keeps running degraded: not ready, not terminated
  tokio::time::sleep(Duration::from_millis(100)).await;
  assert!(!sync.is_done());
  assert!(!brain.auto_save_enabled());
  assert_eq!(sync.state(), SyncState::Connecting);

  // 稍后的成功连接触发首次加载
  // A later successful connect triggers the first load
  store.emit_connected();
  wait_for_ready(&mut events).await;
  assert!(brain.auto_save_enabled());
  assert_eq!(sync.state(), SyncState::Connected);
}

#[tokio::test]
async fn test_brain_close_quits_store_and_ends_loop() {
  let store = Arc::new(MemoryStore::new());
  let brain = Arc::new(Brain::new());
  let mut events = brain.subscribe();

  let sync = Arc::new(BrainSync::new(
    Arc::clone(&brain),
    Arc::clone(&store) as Arc<dyn Store>,
  ));
  let handle = sync.clone().start();
  wait_for_ready(&mut events).await;

  brain.close().await;
  let result = tokio::time::timeout(Duration::from_secs(2), handle)
    .await
    .expect("event loop did not end on close")
    .unwrap();
  assert!(result.is_ok());
  assert!(store.is_closed());
  assert_eq!(sync.state(), SyncState::Closed);
}

#[tokio::test]
async fn test_custom_key_prefix_is_used_for_persistence() {
  let store = Arc::new(MemoryStore::new());
  let brain = Arc::new(Brain::new());
  let mut events = brain.subscribe();

  let sync = Arc::new(
    BrainSync::new(
      Arc::clone(&brain),
      Arc::clone(&store) as Arc<dyn Store>,
    )
    .with_key_prefix("acceptance"),
  );
  let _handle = sync.clone().start();
  wait_for_ready(&mut events).await;

  brain.set("a", json!(1)).await;
  brain.save().await;

  {
    let store = Arc::clone(&store);
    tokio::time::timeout(Duration::from_secs(2), async move {
      while store.get("acceptance:storage").await.unwrap().is_none() {
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
    })
    .await
    .expect("save never reached the custom key");
  }
  assert_eq!(store.get(STORAGE_KEY).await.unwrap(), None);
}
