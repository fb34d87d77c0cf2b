use std::time::Duration;

/// 默认存储键前缀
pub const DEFAULT_KEY_PREFIX: &str = "hubot";

/// 存储键后缀，完整键为 `<prefix>:storage`
pub const STORAGE_KEY_SUFFIX: &str = "storage";

/// 默认 Redis 地址
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// 按优先级排列的 Redis 地址环境变量
pub const REDIS_URL_ENV_VARS: [&str; 4] = [
  "REDISTOGO_URL",
  "REDISCLOUD_URL",
  "BOXEN_REDIS_URL",
  "REDIS_URL",
];

/// 默认自动保存间隔
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(5);

/// 默认连接看门狗检查间隔
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// 事件广播通道容量
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 组装存储键
/// Build the storage key for a given prefix
pub fn storage_key(prefix: &str) -> String {
  format!("{prefix}:{STORAGE_KEY_SUFFIX}")
}
