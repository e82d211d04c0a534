//! # avkit-codec
//!
//! 容器层与编解码层之间交换的数据: 编解码器标识、编解码器参数、压缩数据包,
//! 以及探测阶段使用的轻量解码器接口.
//!
//! 本 crate 不做真正的解码, 解码能力由外部通过 [`DecoderProvider`] 注入.

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod packet;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{CodecParameters, ColorInfo, PROFILE_UNKNOWN};
pub use decoder::{DecoderProvider, FrameInfo, ProbeDecoder};
pub use packet::{Packet, PacketFlags, SideData, SideDataType};
