//! 流参数探测与时长估算.
//!
//! 探测阶段读取一段包, 从中推算头部没有给出的参数 (帧率、音频帧大小、
//! 码率、起始时间), 可选地用探测解码器补全像素/采样格式.
//! 读到的包全部缓存, 探测结束后按原顺序放回前瞻缓冲区, 调用方随后
//! 读包时不会丢失任何数据.
//!
//! 只有 pts 的流在探测结束时估出重排序延迟并补全缓存包的 dts,
//! 之后的读包由 [`crate::dts::DtsQueue`] 接着补全.

use std::collections::HashMap;

use avkit_codec::{Packet, ProbeDecoder};
use avkit_core::{AvError, AvResult, ChannelLayout, MediaType, NOPTS_VALUE, Rational, rescale};
use log::{debug, info, warn};

use crate::demux::DemuxEngine;
use crate::demuxer::SeekFlags;
use crate::dts::{DtsQueue, MAX_VIDEO_DELAY, guess_delay_from_pts, guess_dts_from_pts};
use crate::stream::Stream;

/// 每条流累计到该数量的 pts 时计算一次参数
const ANALYZE_SAMPLE_COUNT: usize = 12;

/// 流数量不足时, 最多探测这么久 (毫秒)
const ANALYZE_FALLBACK_DURATION_MS: i64 = 15_000;

/// 时长估算: 首次从文件尾部向前读取的字节数, 每次重试翻倍
const DURATION_MAX_READ_SIZE: u64 = 250_000;

const DURATION_MAX_RETRY: u32 = 4;

/// 时长估算中允许的最大增量 (毫秒)
const DURATION_MAX_GAP_MS: i64 = 60_000;

/// 单条流的探测状态
#[derive(Default)]
struct StreamProbe {
    first_got: bool,
    dts: Vec<i64>,
    pts: Vec<i64>,
    bytes: u64,
    decoder: Option<Box<dyn ProbeDecoder>>,
    decoder_tried: bool,
    picture_got: bool,
}

impl StreamProbe {
    fn close_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }
    }
}

/// 检查流参数是否已经齐全
///
/// - 音频: 声道数、采样率、帧大小均已知, 码率不为 0
/// - 视频: 帧率、宽高均已知, 码率不为 0, 需要 profile/level 的编码已给出
pub fn check_stream_parameters(streams: &[Stream]) -> bool {
    streams.iter().all(|stream| {
        let par = &stream.codecpar;
        match stream.media_type() {
            MediaType::Audio => {
                par.channels > 0 && par.sample_rate > 0 && par.frame_size > 0 && par.bit_rate != 0
            }
            MediaType::Video => {
                let profile_ok = !par.codec_id.requires_profile_level()
                    || (par.profile != avkit_codec::PROFILE_UNKNOWN
                        && par.level != avkit_codec::PROFILE_UNKNOWN);
                par.frame_rate.is_nonzero()
                    && par.width > 0
                    && par.height > 0
                    && par.bit_rate != 0
                    && profile_ok
            }
            _ => true,
        }
    })
}

/// 用已收集的时间戳推算一条流的参数
fn calculate(stream: &mut Stream, probe: &StreamProbe) {
    let list: Vec<i64> = if probe.dts.is_empty() {
        let mut pts = probe.pts.clone();
        pts.sort_unstable();
        pts
    } else {
        probe.dts.clone()
    };
    let n = list.len();
    if n < 2 {
        return;
    }
    let (first, last) = (list[0], list[n - 1]);
    let count = last - first;
    let time_base = stream.time_base;
    if !time_base.is_nonzero() {
        return;
    }
    let tb = time_base.to_f64();
    let par = &mut stream.codecpar;

    match par.codec_type {
        MediaType::Audio if par.sample_rate > 0 && par.frame_size == 0 => {
            let frame_size =
                (count as f64 / (n - 1) as f64 * tb * f64::from(par.sample_rate)).round();
            if frame_size > 0.0 {
                par.frame_size = frame_size as u32;
            }
        }
        MediaType::Video if count > 0 => {
            let rate = f64::from(time_base.den) * (n - 1) as f64
                / (count as f64 * f64::from(time_base.num));
            par.frame_rate = Rational::from_f64(rate, i32::MAX).snap_to_standard_frame_rate();
        }
        _ => {}
    }

    let start = if stream.start_time != NOPTS_VALUE {
        stream.start_time
    } else {
        first
    };
    let seconds = (last - start) as f64 * tb;
    if seconds > 0.0 {
        stream.codecpar.bit_rate = (probe.bytes as f64 * 8.0 / seconds) as i64;
    }
}

/// 为只有 pts 的流重建 dts
///
/// 延迟取估计值与头部给出的 `video_delay` 中较大者, 不超过 16.
/// 缓存中该流的包按顺序分配 dts, 样本索引里对应条目一并补全.
/// 返回之后读包时继续补全用的队列.
fn reconstruct_dts(
    stream: &mut Stream,
    probe: &mut StreamProbe,
    cache: &mut [Packet],
) -> Option<DtsQueue> {
    if !probe.dts.is_empty() || probe.pts.is_empty() {
        return None;
    }
    let delay = guess_delay_from_pts(&probe.pts)
        .max(stream.codecpar.video_delay)
        .min(MAX_VIDEO_DELAY);
    let dts = guess_dts_from_pts(delay, &probe.pts);

    let index = stream.index;
    let pending = cache.iter_mut().filter(|p| {
        p.stream_index == index && !p.is_empty() && p.pts != NOPTS_VALUE && p.dts == NOPTS_VALUE
    });
    for (packet, &value) in pending.zip(&dts) {
        packet.dts = value;
        if packet.pos >= 0 {
            stream.sample_index.fill_unknown_dts(packet.pos, value);
        }
    }
    if stream.first_dts == NOPTS_VALUE {
        stream.first_dts = dts[0];
    }
    stream.codecpar.video_delay = delay;
    debug!("流 {index} 只有 pts, 估计延迟 {delay} 帧");

    let mut queue = DtsQueue::new(delay);
    queue.seed(&probe.pts);
    probe.dts = dts;
    Some(queue)
}

/// 只知道声道数的单声道和立体声补成标准布局
fn finalize_channel_layout(stream: &mut Stream) {
    let par = &mut stream.codecpar;
    if par.codec_type != MediaType::Audio || !par.channel_layout.is_unspecified() {
        return;
    }
    if let Some(layout) = ChannelLayout::native_for(par.channels) {
        par.channel_layout = layout;
    }
}

impl DemuxEngine {
    /// 探测流参数
    ///
    /// 读取一段包推算参数, 满足以下任一条件时结束:
    /// - 快速打开模式下所需流都已出现且参数齐全
    /// - 探测时长超过上限, 且流数量满足 (或已超过 15 秒), 且探测解码器都已出帧
    /// - 读到 EOF (视为成功)
    ///
    /// 探测期间读到的包全部按原顺序放回前瞻缓冲区.
    pub async fn analyze_streams(&mut self) -> AvResult<()> {
        self.ensure_readable()?;
        let need = self.demuxer.analyze_streams_count();
        let fast_open = self.options.fast_open;
        let max_ms = self.options.max_analyze_duration_ms as i64;

        let mut probes: HashMap<usize, StreamProbe> = HashMap::new();
        let mut cache: Vec<Packet> = Vec::new();

        let result = loop {
            if self.ctx.streams.len() >= need
                && fast_open
                && check_stream_parameters(&self.ctx.streams)
            {
                debug!("快速打开: 流参数已齐全");
                break Ok(());
            }
            if self.ctx.io.is_aborted() {
                break Err(AvError::Aborted);
            }

            let packet = match self.read_packet().await {
                Ok(packet) => packet,
                Err(e) => break Err(e),
            };
            let index = packet.stream_index;
            let Some(stream) = self.ctx.stream_by_index_mut(index) else {
                continue;
            };
            let probe = probes.entry(index).or_default();

            if !packet.is_empty() {
                if !probe.first_got {
                    probe.first_got = true;
                    stream.first_dts = packet.dts;
                    stream.start_time = packet.pts;
                } else if packet.pts != NOPTS_VALUE
                    && (stream.start_time == NOPTS_VALUE || packet.pts < stream.start_time)
                {
                    stream.start_time = packet.pts;
                }
                if packet.dts != NOPTS_VALUE {
                    probe.dts.push(packet.dts);
                }
                if packet.pts != NOPTS_VALUE {
                    probe.pts.push(packet.pts);
                }
                probe.bytes += packet.size() as u64;

                if !fast_open {
                    if let Some(provider) = &self.decoder_provider {
                        if !probe.decoder_tried {
                            probe.decoder_tried = true;
                            probe.decoder = provider.create(&stream.codecpar);
                            if let Some(decoder) = probe.decoder.as_mut() {
                                if let Err(e) = decoder.open(&stream.codecpar) {
                                    warn!("流 {index} 探测解码器打开失败: {e}");
                                    probe.picture_got = true;
                                }
                            }
                        }
                        if !probe.picture_got {
                            if let Some(decoder) = probe.decoder.as_mut() {
                                match decoder.decode(&packet) {
                                    Ok(Some(info)) => {
                                        info.apply_to(&mut stream.codecpar);
                                        probe.picture_got = true;
                                    }
                                    Ok(None) => {}
                                    Err(e) => {
                                        warn!("流 {index} 探测解码失败: {e}");
                                        probe.picture_got = true;
                                    }
                                }
                            }
                        }
                    }
                }

                if probe.pts.len() == ANALYZE_SAMPLE_COUNT {
                    calculate(stream, probe);
                }
            }

            let elapsed = if packet.pts != NOPTS_VALUE && stream.start_time != NOPTS_VALUE {
                packet.pts - stream.start_time
            } else {
                NOPTS_VALUE
            };
            let time_base = stream.time_base;
            cache.push(packet);

            if elapsed == NOPTS_VALUE {
                continue;
            }
            let over_max = elapsed > rescale(max_ms, Rational::MILLI, time_base);
            let streams_ready = self.ctx.streams.len() >= need
                || elapsed > rescale(ANALYZE_FALLBACK_DURATION_MS, Rational::MILLI, time_base);
            let pictures_ready = self.decoder_provider.is_none()
                || probes
                    .values()
                    .all(|p| p.decoder.is_none() || p.picture_got);
            if over_max && streams_ready && pictures_ready {
                debug!("探测时长达到上限 {max_ms}ms");
                break Ok(());
            }
        };

        self.dts_queues.clear();
        for (index, probe) in probes.iter_mut() {
            if let Some(stream) = self.ctx.stream_by_index_mut(*index) {
                if let Some(queue) = reconstruct_dts(stream, probe, &mut cache) {
                    self.dts_queues.insert(*index, queue);
                }
                calculate(stream, probe);
            }
            probe.close_decoder();
        }
        for stream in self.ctx.streams.iter_mut() {
            finalize_channel_layout(stream);
        }

        let buffer = &mut self.ctx.interval.packet_buffer;
        for packet in cache.into_iter().rev() {
            buffer.push_front(packet);
        }

        match result {
            Ok(()) => {}
            Err(AvError::Eof) => debug!("探测阶段读到文件末尾"),
            Err(e) => return Err(e),
        }
        info!(
            "{}: 探测完成, {} 条流",
            self.demuxer.name(),
            self.ctx.streams.len()
        );

        if self.demuxer.needs_duration_estimate() && self.ctx.io.is_seekable() {
            if let Err(e) = self.estimate_duration().await {
                warn!("估算时长失败: {e}");
            }
        }
        Ok(())
    }

    /// 从文件尾部读取包来估算各流时长
    ///
    /// 从尾部向前 250000 字节处开始读, 不够时每次把距离翻倍, 最多 4 次.
    /// 定位失败的一轮视为没有找到. 插件在读包时放进前瞻缓冲区的包也参与统计.
    /// 结束后恢复前瞻缓冲区和读位置.
    pub async fn estimate_duration(&mut self) -> AvResult<()> {
        let file_size = match self.ctx.io.file_size().await? {
            Some(size) if size > 0 => size,
            _ => return Ok(()),
        };
        let cached: Vec<Packet> = self.ctx.interval.packet_buffer.drain(..).collect();
        let start_pos = self.ctx.io.position() as i64;
        // 第一次成功定位前插件报告的读位置
        let mut before_seek: Option<i64> = None;

        for retry in 0..DURATION_MAX_RETRY {
            if self.ctx.io.is_aborted() {
                break;
            }
            let offset = file_size.saturating_sub(DURATION_MAX_READ_SIZE << retry) as i64;
            match self
                .demuxer
                .seek(&mut self.ctx, None, offset, SeekFlags::BYTE)
                .await
            {
                Ok(prev) => {
                    if before_seek.is_none() && prev >= 0 {
                        before_seek = Some(prev);
                    }
                }
                Err(e) => {
                    debug!("时长估算第 {retry} 次定位到 {offset} 失败: {e}");
                    continue;
                }
            }
            self.ctx.interval.packet_buffer.clear();

            let mut updated: Vec<usize> = Vec::new();
            loop {
                let packet = match self.ctx.interval.packet_buffer.pop_front() {
                    Some(packet) => packet,
                    None => match self.demuxer.read_packet(&mut self.ctx).await {
                        Ok(packet) => packet,
                        Err(_) if !self.ctx.interval.packet_buffer.is_empty() => continue,
                        Err(_) => break,
                    },
                };
                self.update_duration(&packet, &mut updated);
            }

            if self.ctx.streams.iter().all(|s| s.duration != NOPTS_VALUE) {
                break;
            }
            debug!("时长估算第 {retry} 次未覆盖所有流");
        }

        self.ctx.interval.packet_buffer.clear();
        self.ctx.interval.packet_buffer.extend(cached);
        let restore_pos = before_seek.unwrap_or(start_pos);
        self.demuxer
            .seek(&mut self.ctx, None, restore_pos, SeekFlags::BYTE)
            .await?;
        debug!("时长估算完成, 恢复读位置 {restore_pos}");
        Ok(())
    }

    /// 用尾部扫描读到的一个包更新所属流的时长
    ///
    /// 每一轮里流第一次出现时直接采用; 之后只接受增长且增量小于 60 秒的值.
    fn update_duration(&mut self, packet: &Packet, updated: &mut Vec<usize>) {
        if packet.pts == NOPTS_VALUE {
            return;
        }
        let Some(stream) = self.ctx.stream_by_index_mut(packet.stream_index) else {
            return;
        };
        let start = if stream.start_time != NOPTS_VALUE {
            stream.start_time
        } else {
            stream.first_dts
        };
        if start == NOPTS_VALUE {
            return;
        }
        let duration = packet.pts - start;
        if duration <= 0 {
            return;
        }
        let first_in_pass = !updated.contains(&stream.index);
        let max_gap = rescale(DURATION_MAX_GAP_MS, Rational::MILLI, stream.time_base);
        if stream.duration == NOPTS_VALUE
            || first_in_pass
            || (duration > stream.duration && duration - stream.duration < max_gap)
        {
            stream.duration = duration;
            if first_in_pass {
                updated.push(stream.index);
            }
        }
    }
}
