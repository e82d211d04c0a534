//! 容器格式标识符.

use std::fmt;

/// 容器格式标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    // ========================
    // 视频容器
    // ========================
    /// ISO 基础媒体文件格式 (MP4 / MOV)
    Mp4,
    /// Matroska (MKV)
    Matroska,
    /// WebM (Matroska 子集)
    Webm,
    /// Audio Video Interleave (AVI)
    Avi,
    /// Flash Video (FLV)
    Flv,
    /// MPEG Transport Stream (TS)
    MpegTs,
    /// MPEG Program Stream (PS)
    MpegPs,
    /// Ogg
    Ogg,
    /// IVF (VP8/VP9 裸帧容器)
    Ivf,

    // ========================
    // 纯音频容器
    // ========================
    /// WAV (RIFF WAVE)
    Wav,
    /// FLAC 原生容器
    Flac,
    /// 裸 MPEG Audio
    Mp3,
    /// AAC ADTS
    Aac,

    // ========================
    // 字幕
    // ========================
    WebVtt,
    Ass,
    SubRip,
    Ttml,

    // ========================
    // 裸码流
    // ========================
    H264,
    Hevc,
    Vvc,
}

impl FormatId {
    /// 获取格式名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mp4 => "mov,mp4",
            Self::Matroska => "matroska",
            Self::Webm => "webm",
            Self::Avi => "avi",
            Self::Flv => "flv",
            Self::MpegTs => "mpegts",
            Self::MpegPs => "mpeg",
            Self::Ogg => "ogg",
            Self::Ivf => "ivf",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::WebVtt => "webvtt",
            Self::Ass => "ass",
            Self::SubRip => "srt",
            Self::Ttml => "ttml",
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Vvc => "vvc",
        }
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
