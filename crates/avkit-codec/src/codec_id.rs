//! 编解码器标识符.

use avkit_core::MediaType;
use std::fmt;

/// 编解码器标识符
///
/// 唯一标识一种编解码算法, 与容器格式无关.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    #[default]
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// H.266 / VVC
    Vvc,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// MPEG-1 Video
    Mpeg1Video,
    /// MPEG-2 Video
    Mpeg2Video,
    /// MPEG-4 Part 2
    Mpeg4,
    /// Theora
    Theora,
    /// Motion JPEG
    Mjpeg,
    /// PNG (常见于封面)
    Png,

    // ========================
    // 音频编解码器
    // ========================
    /// AAC
    Aac,
    /// MP3
    Mp3,
    /// MP2
    Mp2,
    /// Opus
    Opus,
    /// Vorbis
    Vorbis,
    /// FLAC
    Flac,
    /// Apple Lossless
    Alac,
    /// Speex
    Speex,
    /// AC-3
    Ac3,
    /// E-AC-3
    Eac3,
    /// DTS
    Dts,
    /// PCM 有符号 16 位小端
    PcmS16le,
    /// PCM 有符号 16 位大端
    PcmS16be,
    /// PCM 有符号 24 位小端
    PcmS24le,
    /// PCM 有符号 32 位小端
    PcmS32le,
    /// PCM 32 位浮点小端
    PcmF32le,
    /// PCM 无符号 8 位
    PcmU8,
    /// G.711 A-law
    PcmAlaw,
    /// G.711 mu-law
    PcmMulaw,

    // ========================
    // 字幕编解码器
    // ========================
    /// SubRip / SRT
    Srt,
    /// ASS / SSA
    Ass,
    /// WebVTT
    Webvtt,
    /// MP4 内的 tx3g 文本
    MovText,
    /// TTML
    Ttml,
    /// DVD 位图字幕
    DvdSubtitle,
    /// HDMV PGS 字幕
    HdmvPgsSubtitle,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::None => MediaType::Unknown,

            Self::H264
            | Self::H265
            | Self::Vvc
            | Self::Vp8
            | Self::Vp9
            | Self::Av1
            | Self::Mpeg1Video
            | Self::Mpeg2Video
            | Self::Mpeg4
            | Self::Theora
            | Self::Mjpeg
            | Self::Png => MediaType::Video,

            Self::Aac
            | Self::Mp3
            | Self::Mp2
            | Self::Opus
            | Self::Vorbis
            | Self::Flac
            | Self::Alac
            | Self::Speex
            | Self::Ac3
            | Self::Eac3
            | Self::Dts
            | Self::PcmS16le
            | Self::PcmS16be
            | Self::PcmS24le
            | Self::PcmS32le
            | Self::PcmF32le
            | Self::PcmU8
            | Self::PcmAlaw
            | Self::PcmMulaw => MediaType::Audio,

            Self::Srt
            | Self::Ass
            | Self::Webvtt
            | Self::MovText
            | Self::Ttml
            | Self::DvdSubtitle
            | Self::HdmvPgsSubtitle => MediaType::Subtitle,
        }
    }

    /// 是否为 PCM 系列
    pub const fn is_pcm(&self) -> bool {
        matches!(
            self,
            Self::PcmS16le
                | Self::PcmS16be
                | Self::PcmS24le
                | Self::PcmS32le
                | Self::PcmF32le
                | Self::PcmU8
                | Self::PcmAlaw
                | Self::PcmMulaw
        )
    }

    /// 码流中可能带内更新 extradata 的编解码器 (NAL 单元类视频与 AAC)
    pub const fn has_in_band_extradata(&self) -> bool {
        matches!(self, Self::H264 | Self::H265 | Self::Vvc | Self::Aac)
    }

    /// 判断流参数是否完整时需要 profile/level 的视频编解码器
    pub const fn requires_profile_level(&self) -> bool {
        matches!(self, Self::H264 | Self::H265 | Self::Vvc | Self::Mpeg4)
    }

    /// 获取编解码器的名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Vvc => "vvc",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Mpeg1Video => "mpeg1video",
            Self::Mpeg2Video => "mpeg2video",
            Self::Mpeg4 => "mpeg4",
            Self::Theora => "theora",
            Self::Mjpeg => "mjpeg",
            Self::Png => "png",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Mp2 => "mp2",
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Flac => "flac",
            Self::Alac => "alac",
            Self::Speex => "speex",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::Dts => "dts",
            Self::PcmS16le => "pcm_s16le",
            Self::PcmS16be => "pcm_s16be",
            Self::PcmS24le => "pcm_s24le",
            Self::PcmS32le => "pcm_s32le",
            Self::PcmF32le => "pcm_f32le",
            Self::PcmU8 => "pcm_u8",
            Self::PcmAlaw => "pcm_alaw",
            Self::PcmMulaw => "pcm_mulaw",
            Self::Srt => "srt",
            Self::Ass => "ass",
            Self::Webvtt => "webvtt",
            Self::MovText => "mov_text",
            Self::Ttml => "ttml",
            Self::DvdSubtitle => "dvd_subtitle",
            Self::HdmvPgsSubtitle => "hdmv_pgs_subtitle",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_媒体类型() {
        assert_eq!(CodecId::Vvc.media_type(), MediaType::Video);
        assert_eq!(CodecId::PcmAlaw.media_type(), MediaType::Audio);
        assert_eq!(CodecId::MovText.media_type(), MediaType::Subtitle);
        assert_eq!(CodecId::None.media_type(), MediaType::Unknown);
    }

    #[test]
    fn test_codec_分类() {
        assert!(CodecId::PcmMulaw.is_pcm());
        assert!(!CodecId::Flac.is_pcm());
        assert!(CodecId::Aac.has_in_band_extradata());
        assert!(!CodecId::Opus.has_in_band_extradata());
        assert!(CodecId::Mpeg4.requires_profile_level());
        assert!(!CodecId::Vp9.requires_profile_level());
        assert_eq!(CodecId::H265.to_string(), "hevc");
    }
}
