//! 探测解码器接口.
//!
//! 探测阶段 (analyze) 可以为每条流创建一个轻量解码器, 借由解码出的第一帧
//! 补全容器头部无法提供的参数 (像素/采样格式、色彩信息等).
//! 具体解码器属于外部能力, 通过 [`DecoderProvider`] 注入.

use avkit_core::{AvResult, Rational};

use crate::codec_parameters::{CodecParameters, ColorInfo};
use crate::packet::Packet;

/// 解码出的帧的描述信息 (不含像素/采样数据)
#[derive(Debug, Clone, PartialEq)]
pub enum FrameInfo {
    Video {
        /// 像素格式
        format: i32,
        width: u32,
        height: u32,
        sample_aspect_ratio: Rational,
        color: ColorInfo,
    },
    Audio {
        /// 采样格式
        format: i32,
        sample_rate: u32,
        channels: u32,
        nb_samples: u32,
    },
}

impl FrameInfo {
    /// 用帧信息补全编解码器参数, 已知的尺寸/采样率不会被覆盖
    pub fn apply_to(&self, params: &mut CodecParameters) {
        match *self {
            Self::Video {
                format,
                width,
                height,
                sample_aspect_ratio,
                color,
            } => {
                params.format = format;
                params.color = color;
                if params.width == 0 {
                    params.width = width;
                }
                if params.height == 0 {
                    params.height = height;
                }
                if !params.sample_aspect_ratio.is_nonzero() {
                    params.sample_aspect_ratio = sample_aspect_ratio;
                }
            }
            Self::Audio {
                format,
                sample_rate,
                channels,
                nb_samples,
            } => {
                params.format = format;
                if params.sample_rate == 0 {
                    params.sample_rate = sample_rate;
                }
                if params.channels == 0 {
                    params.channels = channels;
                }
                if params.frame_size == 0 {
                    params.frame_size = nb_samples;
                }
            }
        }
    }
}

/// 探测用解码器
///
/// 与完整解码器不同, 只需要报告第一帧的描述信息.
pub trait ProbeDecoder: Send {
    /// 使用流参数打开解码器
    fn open(&mut self, params: &CodecParameters) -> AvResult<()>;

    /// 送入一个数据包
    ///
    /// # 返回
    /// - `Ok(Some(info))`: 解码出一帧
    /// - `Ok(None)`: 需要更多数据
    /// - `Err(_)`: 解码失败, 调用方会放弃该流的解码探测
    fn decode(&mut self, packet: &Packet) -> AvResult<Option<FrameInfo>>;

    /// 释放解码器资源
    fn close(&mut self) {}
}

/// 探测解码器工厂
pub trait DecoderProvider: Send + Sync {
    /// 为指定流参数创建探测解码器, 不支持时返回 `None`
    fn create(&self, params: &CodecParameters) -> Option<Box<dyn ProbeDecoder>>;
}
