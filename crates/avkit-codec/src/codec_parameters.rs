//! 编解码器参数.
//!
//! 描述一条流交给解码器所需的全部配置, 由格式插件从容器头部解析,
//! 并可能在探测阶段被补全.

use avkit_core::{ChannelLayout, MediaType, Rational};
use bytes::Bytes;

use crate::codec_id::CodecId;

/// profile / level 未知
pub const PROFILE_UNKNOWN: i32 = -99;

/// 色彩描述, 取值遵循 ISO/IEC 23091-2 编码点 (2 表示未指定)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorInfo {
    pub range: u8,
    pub primaries: u8,
    pub transfer: u8,
    pub space: u8,
}

impl Default for ColorInfo {
    fn default() -> Self {
        Self {
            range: 0,
            primaries: 2,
            transfer: 2,
            space: 2,
        }
    }
}

/// 编解码器参数
///
/// 数值型字段以 0 表示"未知", `format` 以 -1 表示未知,
/// `profile`/`level` 以 [`PROFILE_UNKNOWN`] 表示未知.
#[derive(Debug, Clone)]
pub struct CodecParameters {
    /// 媒体类型
    pub codec_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 容器内的 fourcc / tag
    pub codec_tag: u32,
    /// 额外数据 (如 SPS/PPS, AudioSpecificConfig)
    pub extradata: Bytes,
    /// 码率 (bits/s)
    pub bit_rate: i64,
    pub profile: i32,
    pub level: i32,
    /// 像素格式或采样格式, 由探测解码器回填
    pub format: i32,

    // ========================
    // 视频
    // ========================
    pub width: u32,
    pub height: u32,
    /// 帧率
    pub frame_rate: Rational,
    /// 采样宽高比 (SAR)
    pub sample_aspect_ratio: Rational,
    /// 解码顺序与显示顺序之间的最大延迟帧数
    pub video_delay: u32,
    pub color: ColorInfo,

    // ========================
    // 音频
    // ========================
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 声道布局, 头部未给出时为未指定
    pub channel_layout: ChannelLayout,
    /// 每帧采样数
    pub frame_size: u32,
}

impl CodecParameters {
    /// 创建指定编解码器的参数, 媒体类型由编解码器推导
    pub fn new(codec_id: CodecId) -> Self {
        Self {
            codec_type: codec_id.media_type(),
            codec_id,
            ..Self::default()
        }
    }

    /// 视频流参数
    pub fn video(codec_id: CodecId, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::new(codec_id)
        }
    }

    /// 音频流参数
    pub fn audio(codec_id: CodecId, sample_rate: u32, channels: u32) -> Self {
        Self {
            sample_rate,
            channels,
            channel_layout: ChannelLayout::unspecified(channels),
            ..Self::new(codec_id)
        }
    }
}

impl Default for CodecParameters {
    fn default() -> Self {
        Self {
            codec_type: MediaType::Unknown,
            codec_id: CodecId::None,
            codec_tag: 0,
            extradata: Bytes::new(),
            bit_rate: 0,
            profile: PROFILE_UNKNOWN,
            level: PROFILE_UNKNOWN,
            format: -1,
            width: 0,
            height: 0,
            frame_rate: Rational::UNDEFINED,
            sample_aspect_ratio: Rational::UNDEFINED,
            video_delay: 0,
            color: ColorInfo::default(),
            sample_rate: 0,
            channels: 0,
            channel_layout: ChannelLayout::default(),
            frame_size: 0,
        }
    }
}
