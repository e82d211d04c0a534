//! 下一个样本选择器 (交织策略).
//!
//! 基于索引的格式在每条流的解码顺序样本表上各有一个读游标. 每次读包前,
//! 选择器在所有流的待读样本中挑出一个: 按字节位置最小的候选能减少物理
//! seek, 按解码时间最小的候选能保持交织顺序. 两者差距不大时优先位置.

use avkit_core::{Rational, rescale};
use log::trace;

use crate::io::IoFlags;
use crate::sample_index::Sample;
use crate::stream::{Discard, Stream};

/// 选择策略, 按格式族配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorPolicy {
    /// 两个候选解码时间差 (微秒) 小于该窗口时优先按位置读取
    pub window_us: i64,
    /// 窗口内改为比较两个候选与当前读位置的距离, 取较近者
    pub prefer_nearest: bool,
    /// 片段和网络来源也总是按位置读取 (不可 seek 的来源一律按位置)
    pub position_on_streaming: bool,
    /// 遵从流的 [`Discard`] 设置
    pub honor_discard: bool,
}

impl SelectorPolicy {
    /// ISO 基础媒体文件格式: 1 秒窗口
    pub const ISOBMFF: Self = Self {
        window_us: 1_000_000,
        prefer_nearest: false,
        position_on_streaming: true,
        honor_discard: true,
    };

    /// RIFF/AVI: 5 秒窗口, 窗口内取离读位置较近的候选
    pub const RIFF: Self = Self {
        window_us: 5_000_000,
        prefer_nearest: true,
        position_on_streaming: false,
        honor_discard: false,
    };

    fn reads_by_position(&self, io_flags: IoFlags) -> bool {
        !io_flags.contains(IoFlags::SEEKABLE)
            || (self.position_on_streaming
                && io_flags.intersects(IoFlags::SLICE | IoFlags::NETWORK))
    }
}

/// 选择结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// 被选中的流在 `streams` 中的下标
    pub stream_position: usize,
    /// 被选中的样本
    pub sample: Sample,
}

/// 候选样本的解码时间 (微秒)
fn decode_time_us(stream: &Stream, sample: &Sample) -> i64 {
    rescale(sample.decode_time(), stream.time_base, Rational::MICRO)
}

/// 挑出下一个要读取的流, 不移动游标
///
/// # 参数
/// - `streams`: 所有流
/// - `io_flags`: 字节流能力标志
/// - `io_pos`: 当前读位置
/// - `policy`: 格式族策略
pub fn pick_next(
    streams: &[Stream],
    io_flags: IoFlags,
    io_pos: u64,
    policy: &SelectorPolicy,
) -> Option<usize> {
    // (流下标, 样本, 解码时间微秒)
    let mut pos_best: Option<(usize, &Sample, i64)> = None;
    let mut dts_best: Option<(usize, &Sample, i64)> = None;

    for (i, stream) in streams.iter().enumerate() {
        if policy.honor_discard && stream.discard == Discard::All {
            continue;
        }
        let Some(sample) = stream.sample_table.current() else {
            continue;
        };
        let dts_us = decode_time_us(stream, sample);
        if pos_best.is_none_or(|(_, best, _)| sample.pos < best.pos) {
            pos_best = Some((i, sample, dts_us));
        }
        if dts_best.is_none_or(|(_, _, best_us)| dts_us < best_us) {
            dts_best = Some((i, sample, dts_us));
        }
    }

    let chosen = match (pos_best, dts_best) {
        (Some(by_pos), Some(by_dts)) => {
            let diff = by_pos.2.abs_diff(by_dts.2);
            if policy.reads_by_position(io_flags) {
                by_pos.0
            } else if diff < policy.window_us.unsigned_abs() {
                if policy.prefer_nearest {
                    let pos_diff = by_pos.1.pos.abs_diff(io_pos as i64);
                    let dts_diff = by_dts.1.pos.abs_diff(io_pos as i64);
                    if pos_diff > dts_diff { by_dts.0 } else { by_pos.0 }
                } else {
                    by_pos.0
                }
            } else {
                by_dts.0
            }
        }
        (Some(only), None) | (None, Some(only)) => only.0,
        (None, None) => return None,
    };
    trace!("选择器: 选中流下标 {chosen}");
    Some(chosen)
}

/// 挑出下一个样本并推进该流的游标
///
/// 策略遵从丢弃设置时, 只保留关键帧的流先把游标移到下一个关键帧.
/// 所有流都已读完时返回 `None`.
pub fn next_sample(
    streams: &mut [Stream],
    io_flags: IoFlags,
    io_pos: u64,
    policy: &SelectorPolicy,
) -> Option<Selection> {
    if policy.honor_discard {
        for stream in streams.iter_mut() {
            if stream.discard == Discard::NonKey {
                stream.sample_table.skip_to_keyframe();
            }
        }
    }
    let position = pick_next(streams, io_flags, io_pos, policy)?;
    let table = &mut streams[position].sample_table;
    let sample = *table.current()?;
    table.advance();
    Some(Selection {
        stream_position: position,
        sample,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_index::Sample;

    fn stream_with(index: usize, time_base: Rational, samples: &[(i64, i64)]) -> Stream {
        let mut stream = Stream::new(index, index as u32 + 1);
        stream.time_base = time_base;
        for &(dts, pos) in samples {
            stream.add_sample(Sample::new(dts, dts, pos, 10));
        }
        stream
    }

    #[test]
    fn test_时间差超出窗口_按解码时间() {
        // 流 0: pos=100, dts=0; 流 1: pos=50, dts=2s
        let streams = vec![
            stream_with(0, Rational::MILLI, &[(0, 100)]),
            stream_with(1, Rational::MILLI, &[(2000, 50)]),
        ];
        let chosen = pick_next(&streams, IoFlags::SEEKABLE, 0, &SelectorPolicy::ISOBMFF);
        assert_eq!(chosen, Some(0));
    }

    #[test]
    fn test_时间差在窗口内_按位置() {
        let streams = vec![
            stream_with(0, Rational::MILLI, &[(0, 100)]),
            stream_with(1, Rational::new(1, 90000), &[(45000, 50)]),
        ];
        let chosen = pick_next(&streams, IoFlags::SEEKABLE, 0, &SelectorPolicy::ISOBMFF);
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_流式来源总是按位置() {
        let streams = vec![
            stream_with(0, Rational::MILLI, &[(0, 100)]),
            stream_with(1, Rational::MILLI, &[(2000, 50)]),
        ];
        for flags in [
            IoFlags::empty(),
            IoFlags::SEEKABLE | IoFlags::NETWORK,
            IoFlags::SEEKABLE | IoFlags::SLICE,
        ] {
            let chosen = pick_next(&streams, flags, 0, &SelectorPolicy::ISOBMFF);
            assert_eq!(chosen, Some(1));
        }
    }

    #[test]
    fn test_riff_片段来源仍按时间窗口() {
        let streams = vec![
            stream_with(0, Rational::MILLI, &[(0, 100)]),
            stream_with(1, Rational::MILLI, &[(6000, 50)]),
        ];
        // 只有不可 seek 时才强制按位置
        for flags in [
            IoFlags::SEEKABLE | IoFlags::SLICE,
            IoFlags::SEEKABLE | IoFlags::NETWORK,
        ] {
            assert_eq!(pick_next(&streams, flags, 0, &SelectorPolicy::RIFF), Some(0));
        }
        assert_eq!(
            pick_next(&streams, IoFlags::empty(), 0, &SelectorPolicy::RIFF),
            Some(1)
        );
    }

    #[test]
    fn test_丢弃设置() {
        let mut video = stream_with(0, Rational::MILLI, &[]);
        for (dts, key) in [(0, true), (40, false), (80, false), (120, true), (160, false)] {
            let mut sample = Sample::new(dts, dts, dts, 10);
            if key {
                sample.flags = avkit_codec::PacketFlags::KEY;
            }
            video.add_sample(sample);
        }
        video.discard = Discard::NonKey;
        let mut audio = stream_with(1, Rational::MILLI, &[(20, 20), (100, 100)]);
        audio.discard = Discard::All;
        let mut streams = vec![video, audio];

        let mut order = Vec::new();
        while let Some(sel) =
            next_sample(&mut streams, IoFlags::SEEKABLE, 0, &SelectorPolicy::ISOBMFF)
        {
            order.push((sel.stream_position, sel.sample.dts));
        }
        assert_eq!(order, vec![(0, 0), (0, 120)]);
        // 被整条丢弃的流游标不动
        assert_eq!(streams[1].sample_table.cursor(), 0);
    }

    #[test]
    fn test_riff_不遵从丢弃设置() {
        let mut stream = stream_with(0, Rational::MILLI, &[(0, 0), (40, 10)]);
        stream.discard = Discard::All;
        let mut streams = vec![stream];
        let sel = next_sample(&mut streams, IoFlags::SEEKABLE, 0, &SelectorPolicy::RIFF);
        assert_eq!(sel.map(|s| s.sample.dts), Some(0));
    }

    #[test]
    fn test_riff_窗口内取离读位置近者() {
        // 位置候选是流 1 (pos=50), 解码时间候选是流 0 (pos=100)
        let streams = vec![
            stream_with(0, Rational::MILLI, &[(0, 100)]),
            stream_with(1, Rational::MILLI, &[(2000, 50)]),
        ];
        assert_eq!(
            pick_next(&streams, IoFlags::SEEKABLE, 95, &SelectorPolicy::RIFF),
            Some(0)
        );
        assert_eq!(
            pick_next(&streams, IoFlags::SEEKABLE, 40, &SelectorPolicy::RIFF),
            Some(1)
        );
    }

    #[test]
    fn test_游标推进直到全部结束() {
        let mut streams = vec![
            stream_with(0, Rational::MILLI, &[(0, 0), (40, 20)]),
            stream_with(1, Rational::MILLI, &[(20, 10)]),
            stream_with(2, Rational::MILLI, &[]),
        ];
        let mut order = Vec::new();
        while let Some(sel) =
            next_sample(&mut streams, IoFlags::SEEKABLE, 0, &SelectorPolicy::ISOBMFF)
        {
            order.push(sel.sample.pos);
        }
        assert_eq!(order, vec![0, 10, 20]);
        assert!(streams.iter().all(|s| s.sample_table.is_ended()));
    }
}
