//! 统一错误类型定义.
//!
//! 所有 avkit crate 共用的错误类型. 流结束 (`Eof`) 与取消 (`Aborted`)
//! 都是普通的变体, 调用方通过模式匹配区分, 不再比较负数错误码.

use thiserror::Error;

/// avkit 统一错误类型
#[derive(Debug, Error)]
pub enum AvError {
    /// 容器数据损坏或不合法 (头部解析失败对上下文是终止性的)
    #[error("无效数据: {0}")]
    DataInvalid(String),

    /// 当前格式插件不支持该操作 (如对无索引的流式格式做时间戳 seek)
    #[error("格式不支持该操作: {0}")]
    FormatNotSupport(String),

    /// 目标容器不接受该编解码器 (mux 打开时检查)
    #[error("容器不支持编解码器: {0}")]
    CodecNotSupport(String),

    /// 已到达流末尾, 不是失败
    #[error("已到达流末尾")]
    Eof,

    /// 调用方请求了取消
    #[error("操作已取消")]
    Aborted,

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 插件生命周期顺序错误 (如未 open 就读包)
    #[error("状态错误: {0}")]
    InvalidState(String),
}

impl AvError {
    /// 是否为流结束标记
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// 是否为取消
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// avkit 统一 Result 类型
pub type AvResult<T> = Result<T, AvError>;
