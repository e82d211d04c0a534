//! 封装器 (Muxer) trait 定义与各输出格式支持的编码.

use async_trait::async_trait;
use avkit_codec::{CodecId, Packet};
use avkit_core::AvResult;

use crate::context::FormatContext;
use crate::format_id::FormatId;

/// 封装器 trait
///
/// 将压缩数据包写入容器格式, 由 [`crate::mux::MuxEngine`] 驱动.
///
/// 使用流程:
/// 1. 调用方在上下文中配置好输出流
/// 2. `init()` 安装私有状态
/// 3. `write_header()` 写入容器头部
/// 4. 循环 `write_packet()`, 可穿插 `flush()`
/// 5. `write_trailer()` 写入容器尾部
#[async_trait]
pub trait Muxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str {
        self.format_id().name()
    }

    fn init(&mut self, _ctx: &mut FormatContext) -> AvResult<()> {
        Ok(())
    }

    /// 写入容器头部
    async fn write_header(&mut self, ctx: &mut FormatContext) -> AvResult<()>;

    /// 写入一个数据包, 时间戳已由引擎归一化
    async fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> AvResult<()>;

    /// 写入容器尾部, 完成封装
    async fn write_trailer(&mut self, ctx: &mut FormatContext) -> AvResult<()>;

    /// 把缓存的数据写出
    async fn flush(&mut self, ctx: &mut FormatContext) -> AvResult<()> {
        ctx.io.flush().await
    }

    async fn destroy(&mut self, _ctx: &mut FormatContext) {}
}

/// 输出格式支持的编码列表
///
/// WAV 接受任意 PCM 编码, 不在此列出; 返回 `None` 表示该格式不做限制.
pub fn supported_codecs(format: FormatId) -> Option<&'static [CodecId]> {
    if format == FormatId::Wav {
        return None;
    }
    Some(codec_table(format))
}

fn codec_table(format: FormatId) -> &'static [CodecId] {
    use CodecId::*;
    match format {
        FormatId::Aac => &[Aac],
        FormatId::Avi => &[Mp3, Ac3, Aac, Mpeg4, H264],
        FormatId::Flac => &[Flac],
        FormatId::Flv => &[
            Mp3, Aac, Speex, PcmAlaw, PcmMulaw, Ac3, Eac3, Opus, Flac, Mpeg4, H264, H265, Av1,
            Vp9, Vp8, Vvc,
        ],
        FormatId::Ivf => &[Vp8, Vp9],
        FormatId::Matroska => &[
            Vorbis, Opus, Aac, Mp3, Flac, Alac, Dts, Eac3, Ac3, PcmF32le, PcmS16be, PcmS16le,
            Vp8, Vp9, Av1, H264, H265, Vvc, Mpeg4, Theora, Webvtt, Ass, Srt,
        ],
        FormatId::Webm => &[Vorbis, Opus, Vp8, Vp9, Av1, Webvtt],
        FormatId::Mp4 => &[
            Vorbis, Opus, Aac, Mp3, Flac, Speex, Ac3, Eac3, Vp9, Av1, H264, H265, Vvc, Mpeg4,
            Webvtt, MovText,
        ],
        FormatId::Mp3 => &[Mp3],
        FormatId::MpegTs => &[Opus, Aac, Mp3, Ac3, Dts, Eac3, Mpeg4, Av1, H264, H265, Vvc],
        FormatId::MpegPs => &[Mp2, Mp3, Ac3, Dts, Mpeg2Video, Mpeg4, H264, H265, Vvc],
        FormatId::Ogg => &[Vorbis, Opus, Flac, Speex],
        FormatId::WebVtt => &[Webvtt],
        FormatId::Ass => &[Ass],
        FormatId::SubRip => &[Srt],
        FormatId::Ttml => &[Ttml],
        FormatId::H264 => &[H264],
        FormatId::Hevc => &[H265],
        FormatId::Vvc => &[Vvc],
        FormatId::Wav => &[],
    }
}

/// 输出格式能否封装该编码
pub fn is_codec_supported(format: FormatId, codec_id: CodecId) -> bool {
    if format == FormatId::Wav {
        return codec_id.is_pcm();
    }
    supported_codecs(format).is_none_or(|codecs| codecs.contains(&codec_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_编码白名单() {
        assert!(is_codec_supported(FormatId::Mp4, CodecId::H264));
        assert!(is_codec_supported(FormatId::Webm, CodecId::Vp9));
        assert!(!is_codec_supported(FormatId::Webm, CodecId::H264));
        assert!(!is_codec_supported(FormatId::Ivf, CodecId::Av1));
        assert!(is_codec_supported(FormatId::MpegPs, CodecId::Mpeg2Video));
        assert!(!is_codec_supported(FormatId::MpegTs, CodecId::Mpeg2Video));
    }

    #[test]
    fn test_wav_接受任意_pcm() {
        assert!(supported_codecs(FormatId::Wav).is_none());
        assert!(is_codec_supported(FormatId::Wav, CodecId::PcmS24le));
        assert!(is_codec_supported(FormatId::Wav, CodecId::PcmMulaw));
        assert!(!is_codec_supported(FormatId::Wav, CodecId::Aac));
    }
}
