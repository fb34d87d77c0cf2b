//! 配置模块
//! Configuration module
//!
//! 按固定优先级从环境变量解析 Redis 连接地址
//! Resolves the Redis connection URL from environment variables in a fixed precedence order

use crate::constants::{DEFAULT_REDIS_URL, REDIS_URL_ENV_VARS};

/// 解析得到的 Redis 地址
/// A resolved Redis URL
///
/// `source` 记录地址来自哪个环境变量；使用默认地址时为 `None`
/// `source` records which environment variable supplied the URL; `None` when the default is used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRedisUrl {
  /// 连接地址
  /// Connection URL
  pub url: String,
  /// 地址来源的环境变量名
  /// Name of the environment variable the URL came from
  pub source: Option<&'static str>,
}

impl ResolvedRedisUrl {
  /// 是否使用了默认地址
  /// Whether the default URL is in use
  pub fn is_default(&self) -> bool {
    self.source.is_none()
  }
}

/// 从进程环境变量解析 Redis 地址
/// Resolve the Redis URL from the process environment
///
/// 依次检查 `REDISTOGO_URL`、`REDISCLOUD_URL`、`BOXEN_REDIS_URL`、`REDIS_URL`，
/// 第一个存在的变量胜出；全部缺失时使用默认本地地址。解析永不失败。
/// Checks `REDISTOGO_URL`, `REDISCLOUD_URL`, `BOXEN_REDIS_URL`, `REDIS_URL` in order;
/// the first variable present wins. Falls back to the default local endpoint when
/// none is set. Resolution never fails.
pub fn resolve_redis_url() -> ResolvedRedisUrl {
  resolve_redis_url_from(|name| std::env::var(name).ok())
}

/// 使用注入的查找函数解析 Redis 地址
/// Resolve the Redis URL using an injected lookup function
///
/// 纯优先级选择，不做配置合并
/// Pure precedence selection, no configuration merging
pub fn resolve_redis_url_from<F>(lookup: F) -> ResolvedRedisUrl
where
  F: Fn(&str) -> Option<String>,
{
  for name in REDIS_URL_ENV_VARS {
    if let Some(url) = lookup(name) {
      return ResolvedRedisUrl {
        url,
        source: Some(name),
      };
    }
  }
  ResolvedRedisUrl {
    url: DEFAULT_REDIS_URL.to_string(),
    source: None,
  }
}
