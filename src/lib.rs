//! # avkit
//!
//! 纯 Rust 实现的媒体容器解封装/封装引擎.
//!
//! 引擎负责所有容器格式共用的逻辑: 流参数探测、前瞻缓冲与带内参数修补、
//! 基于样本索引的交织读取与 seek、封装时的时间戳归一化. 具体格式通过
//! 实现 `Demuxer` / `Muxer` 插件接入.
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `avkit-core` | 错误类型、有理数、时间戳换算 |
//! | `avkit-codec` | 编解码器参数、数据包、探测解码器接口 |
//! | `avkit-format` | 字节流端口、流与上下文、解封装/封装引擎 |

/// 核心类型与工具
pub use avkit_core as core;

/// 编解码器参数与数据包
pub use avkit_codec as codec;

/// 容器格式框架
pub use avkit_format as format;

pub mod config;
pub mod logging;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
