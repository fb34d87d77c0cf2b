//! 错误处理模块
//! Error handling module
//!
//! 定义了持久化适配器使用的各种错误类型
//! Defines the error types used by the persistence adapter

use thiserror::Error;

/// 本库的结果类型
/// Result type for this library
pub type Result<T> = std::result::Result<T, Error>;

/// 适配器错误类型
/// Adapter error type
#[derive(Error, Debug)]
pub enum Error {
  /// Redis connection error
  #[error("Redis connection error: {0}")]
  Redis(#[from] redis::RedisError),

  /// 序列化错误
  /// Serialization error
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// 存储尚未连接
  /// Store is not connected
  #[error("Store is not connected")]
  NotConnected,

  /// 配置错误
  /// Configuration error
  #[error("Configuration error: {message}")]
  Config { message: String },

  /// 存储错误
  /// Store error
  #[error("Store error: {message}")]
  Store { message: String },
}

impl Error {
  /// 创建配置错误
  /// Create a configuration error
  pub fn config<S: Into<String>>(message: S) -> Self {
    Self::Config {
      message: message.into(),
    }
  }

  /// 创建存储错误
  /// Create a store error
  pub fn store<S: Into<String>>(message: S) -> Self {
    Self::Store {
      message: message.into(),
    }
  }
}
