//! 基于样本索引的读包与 seek.
//!
//! ISOBMFF、AVI 这类在头部就给出完整样本表的格式, 读包和 seek 的做法完全一致:
//! 读包时用选择器在解码顺序样本表上挑样本、定位、按大小读取; seek 时在主流的
//! pts 索引上查找落点, 映射回解码顺序表的游标, 再把其余流按换算后的时间戳
//! 重新定位. 插件在 `read_header` 中用 [`Stream::add_sample`] 登记各流的样本后,
//! 直接在 `read_packet`/`seek` 中调用这里的函数即可.

use avkit_codec::Packet;
use avkit_core::{AvError, AvResult, MediaType, rescale};
use log::debug;

use crate::context::FormatContext;
use crate::demuxer::SeekFlags;
use crate::sample_index::Sample;
use crate::selector::{SelectorPolicy, next_sample};
use crate::stream::Stream;

/// 按选择器策略读取下一个样本
///
/// 所有流的游标都走到末尾时返回 `AvError::Eof`.
pub async fn read_indexed_packet(
    ctx: &mut FormatContext,
    policy: &SelectorPolicy,
) -> AvResult<Packet> {
    let io_flags = ctx.io.flags();
    let io_pos = ctx.io.position();
    let selection =
        next_sample(&mut ctx.streams, io_flags, io_pos, policy).ok_or(AvError::Eof)?;
    let sample = selection.sample;
    let stream = &ctx.streams[selection.stream_position];
    let (stream_index, time_base) = (stream.index, stream.time_base);

    if sample.pos < 0 {
        return Err(AvError::DataInvalid(format!(
            "流 {stream_index} 的样本没有字节位置"
        )));
    }
    let pos = sample.pos as u64;
    if ctx.io.position() != pos {
        ctx.io.seek(pos).await?;
    }
    let data = ctx.io.read_bytes(sample.size as usize).await?;

    let mut packet = Packet::from_data(data);
    packet.stream_index = stream_index;
    packet.pts = sample.pts;
    packet.dts = sample.dts;
    packet.duration = sample.duration;
    packet.time_base = time_base;
    packet.pos = sample.pos;
    packet.flags = sample.flags;
    Ok(packet)
}

/// 该流 seek 时是否必须落在关键帧上
fn keyframe_only(stream: &Stream, flags: SeekFlags) -> bool {
    stream.media_type() == MediaType::Video && !flags.contains(SeekFlags::ANY)
}

/// 关键帧推断同时作用于 seek 索引和解码顺序表
fn deduce_keyframes(stream: &mut Stream) {
    if stream.sample_index.deduce_keyframes() {
        stream.sample_table.mark_all_keyframes();
    }
}

/// 在 pts 索引上查找落点, 并把解码顺序表的游标放到对应样本
///
/// 返回落点样本; 找不到时不移动游标.
fn position_stream(stream: &mut Stream, timestamp: i64, key_only: bool) -> Option<Sample> {
    if key_only {
        deduce_keyframes(stream);
    }
    let target = stream.sample_index.seek_target(timestamp, key_only)?;
    let landing = *stream.sample_index.get(target)?;
    let cursor = stream.sample_table.locate(&landing);
    stream.sample_table.reset_cursor(cursor);
    Some(landing)
}

/// 在样本索引上定位所有流
///
/// # 参数
/// - `stream_index`: 主流
/// - `timestamp`: 主流时间基下的目标时间戳
/// - `flags`: Seek 标志, 不支持 `BYTE`
///
/// # 返回
/// 定位前的读位置
pub async fn seek_indexed(
    ctx: &mut FormatContext,
    stream_index: usize,
    timestamp: i64,
    flags: SeekFlags,
) -> AvResult<i64> {
    if flags.contains(SeekFlags::BYTE) {
        return Err(AvError::FormatNotSupport(
            "样本索引不支持按字节 seek".into(),
        ));
    }
    let pos_before = ctx.io.position() as i64;
    let primary = ctx
        .stream_position(stream_index)
        .ok_or(AvError::StreamNotFound(stream_index))?;

    let (landing_pts, primary_time_base) = {
        let stream = &mut ctx.streams[primary];
        let key_only = keyframe_only(stream, flags);
        let landing = position_stream(stream, timestamp, key_only).ok_or_else(|| {
            AvError::DataInvalid(format!("流 {stream_index} 找不到 seek 落点 {timestamp}"))
        })?;
        (landing.pts, stream.time_base)
    };

    for (position, stream) in ctx.streams.iter_mut().enumerate() {
        if position == primary {
            continue;
        }
        let target_ts = rescale(landing_pts, primary_time_base, stream.time_base);
        let key_only = keyframe_only(stream, flags);
        if position_stream(stream, target_ts, key_only).is_none() {
            stream.sample_table.finish();
        }
    }

    debug!(
        "索引 seek: 流 {stream_index}, 目标 {timestamp}, 落点 pts {landing_pts}"
    );
    Ok(pos_before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::IoContext;
    use avkit_codec::{CodecId, CodecParameters, PacketFlags};
    use avkit_core::Rational;

    /// 两条流交替存放, 每个样本 4 字节, 内容为样本序号
    fn build_context() -> FormatContext {
        let data: Vec<u8> = (0u8..8).flat_map(|i| [i; 4]).collect();
        let mut ctx = FormatContext::new(IoContext::from_memory(data));

        let video = ctx.create_stream();
        video.codecpar = CodecParameters::video(CodecId::H264, 320, 240);
        video.time_base = Rational::new(1, 90000);
        for i in 0..4i64 {
            let mut s = Sample::new(i * 3000, i * 3000, i * 8, 4);
            if i % 2 == 0 {
                s.flags = PacketFlags::KEY;
            }
            video.add_sample(s);
        }

        let audio = ctx.create_stream();
        audio.codecpar = CodecParameters::audio(CodecId::Aac, 48000, 2);
        audio.time_base = Rational::new(1, 48000);
        for i in 0..4i64 {
            audio.add_sample(Sample::new(i * 1600, i * 1600, i * 8 + 4, 4));
        }
        ctx
    }

    #[tokio::test]
    async fn test_按索引顺序读包() {
        let mut ctx = build_context();
        let mut bytes = Vec::new();
        loop {
            match read_indexed_packet(&mut ctx, &SelectorPolicy::ISOBMFF).await {
                Ok(p) => {
                    assert_eq!(p.size(), 4);
                    bytes.push(p.data[0]);
                }
                Err(e) => {
                    assert!(e.is_eof());
                    break;
                }
            }
        }
        assert_eq!(bytes, (0u8..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_seek_视频落在关键帧_音频跟随() {
        let mut ctx = build_context();
        // 目标 7000 (约 77.8ms), 落在 pts=6000 的关键帧
        seek_indexed(&mut ctx, 0, 7000, SeekFlags::TIMESTAMP)
            .await
            .unwrap();
        assert_eq!(ctx.streams[0].sample_table.cursor(), 2);
        // 6000/90000 秒 = 3200/48000, 音频落在 pts=3200
        assert_eq!(ctx.streams[1].sample_table.cursor(), 2);

        let packet = read_indexed_packet(&mut ctx, &SelectorPolicy::ISOBMFF)
            .await
            .unwrap();
        assert_eq!(packet.stream_index, 0);
        assert_eq!(packet.pts, 6000);
        assert!(packet.is_keyframe());
    }

    /// 一条带 B 帧的 H.264 流, 两个 GOP, 样本按解码顺序存放
    ///
    /// `(dts, pts, 关键帧)`, 每个样本 4 字节, 内容为解码序号.
    fn build_reordered_context() -> FormatContext {
        const GOP: [(i64, i64, bool); 8] = [
            (0, 3000, true),
            (3000, 12000, false),
            (6000, 6000, false),
            (9000, 9000, false),
            (12000, 15000, true),
            (15000, 24000, false),
            (18000, 18000, false),
            (21000, 21000, false),
        ];
        let data: Vec<u8> = (0u8..8).flat_map(|i| [i; 4]).collect();
        let mut ctx = FormatContext::new(IoContext::from_memory(data));
        let video = ctx.create_stream();
        video.codecpar = CodecParameters::video(CodecId::H264, 320, 240);
        video.time_base = Rational::new(1, 90000);
        for (i, &(dts, pts, key)) in GOP.iter().enumerate() {
            let mut s = Sample::new(pts, dts, i as i64 * 4, 4);
            if key {
                s.flags = PacketFlags::KEY;
            }
            video.add_sample(s);
        }
        ctx
    }

    async fn read_all_dts(ctx: &mut FormatContext) -> Vec<i64> {
        let mut dts = Vec::new();
        while let Ok(packet) = read_indexed_packet(ctx, &SelectorPolicy::ISOBMFF).await {
            assert_eq!(packet.data[0] as i64, packet.pos / 4);
            dts.push(packet.dts);
        }
        dts
    }

    #[tokio::test]
    async fn test_b_帧按解码顺序交付() {
        let mut ctx = build_reordered_context();
        let dts = read_all_dts(&mut ctx).await;
        assert_eq!(dts, vec![0, 3000, 6000, 9000, 12000, 15000, 18000, 21000]);
        // seek 索引仍按 pts 排序
        let pts: Vec<i64> = ctx.streams[0]
            .sample_index
            .samples()
            .iter()
            .map(|s| s.pts)
            .collect();
        assert!(pts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_b_帧_seek_落点映射回解码顺序() {
        let mut ctx = build_reordered_context();
        // pts 20000 之前最近的关键帧是 pts=15000 (解码序号 4)
        seek_indexed(&mut ctx, 0, 20000, SeekFlags::TIMESTAMP)
            .await
            .unwrap();
        assert_eq!(ctx.streams[0].sample_table.cursor(), 4);
        let dts = read_all_dts(&mut ctx).await;
        assert_eq!(dts, vec![12000, 15000, 18000, 21000]);

        // 回到开头; 返回的是定位前的读位置 (最后一个样本之后)
        let pos_before = seek_indexed(&mut ctx, 0, 0, SeekFlags::TIMESTAMP)
            .await
            .unwrap();
        assert_eq!(pos_before, 32);
        assert_eq!(read_all_dts(&mut ctx).await.len(), 8);
    }

    #[tokio::test]
    async fn test_seek_任意帧() {
        let mut ctx = build_context();
        seek_indexed(&mut ctx, 0, 9000, SeekFlags::TIMESTAMP | SeekFlags::ANY)
            .await
            .unwrap();
        assert_eq!(ctx.streams[0].sample_table.cursor(), 3);
    }

    #[tokio::test]
    async fn test_seek_不支持按字节() {
        let mut ctx = build_context();
        let err = seek_indexed(&mut ctx, 0, 16, SeekFlags::BYTE)
            .await
            .unwrap_err();
        assert!(matches!(err, AvError::FormatNotSupport(_)));
        let err = seek_indexed(&mut ctx, 9, 0, SeekFlags::TIMESTAMP)
            .await
            .unwrap_err();
        assert!(matches!(err, AvError::StreamNotFound(9)));
    }
}
