//! # avkit-core
//!
//! avkit 媒体容器引擎核心库, 提供错误类型、有理数、时间戳换算等基础设施.
//!
//! 上层的 `avkit-codec` 与 `avkit-format` 都建立在这里的类型之上.

pub mod channel_layout;
pub mod error;
pub mod media_type;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use channel_layout::{ChannelLayout, ChannelMask};
pub use error::{AvError, AvResult};
pub use media_type::MediaType;
pub use rational::Rational;
pub use timestamp::{NOPTS_VALUE, Timestamp, rescale};
