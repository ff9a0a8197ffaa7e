//! 统一错误类型定义.
//!
//! 所有 Luan crate 共用的错误类型, 支持跨模块传播.
//! 注意: `Eof` 不是故障 — 它是读取循环唯一的正常终止信号,
//! 调用方必须将其与其余错误条件区分开.

use thiserror::Error;

/// Luan 统一错误类型
#[derive(Debug, Error)]
pub enum LuanError {
    /// 无效参数 (错误的命令行组合、未知的故障方法、非法时长等)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的输入 (如 speed 方法下容器时长未知或为零)
    #[error("不支持的输入: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾 (正常终止信号, 非故障)
    #[error("已到达流末尾")]
    Eof,

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 无效数据 (损坏的容器结构等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Luan 统一 Result 类型
pub type LuanResult<T> = Result<T, LuanError>;
