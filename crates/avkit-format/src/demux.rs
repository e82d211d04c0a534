//! 解封装引擎.
//!
//! 驱动一个 [`Demuxer`] 插件, 负责所有格式共用的逻辑:
//! - 打开: 合并格式相关的探测时长下限, 解析头部
//! - 读包: 先消耗前瞻缓冲区, 再向插件要包; 修补带内 extradata 更新;
//!   为只有 pts 的流补全 dts; 在可 seek 的来源上顺带增长样本索引
//! - seek: 选定目标流, 毫秒换算到流时间基, 成功后清空前瞻缓冲区并重新估算 dts
//!
//! 探测 (`analyze_streams`) 在 [`crate::analyze`] 中实现.

use std::collections::HashMap;
use std::sync::Arc;

use avkit_codec::{DecoderProvider, Packet, PacketFlags, SideDataType};
use avkit_core::{AvError, AvResult, MediaType, NOPTS_VALUE, Rational, rescale};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::context::{ErrorFlags, FormatContext};
use crate::demuxer::{Demuxer, PluginState, SeekFlags};
use crate::dts::{DTS_REPRIME_SAMPLES, DtsQueue, guess_dts_from_pts};
use crate::io::{AbortHandle, IoContext, IoFlags};
use crate::sample_index::Sample;
use crate::stream::Stream;

/// 解封装选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxOptions {
    /// 所有流参数齐全后立即结束探测
    pub fast_open: bool,
    /// 最大探测时长 (毫秒)
    pub max_analyze_duration_ms: u64,
    /// 音频样本索引的最小时间间隔 (毫秒)
    pub sample_index_step_ms: u64,
}

impl Default for DemuxOptions {
    fn default() -> Self {
        Self {
            fast_open: false,
            max_analyze_duration_ms: 15_000,
            sample_index_step_ms: 10_000,
        }
    }
}

/// 修补带内 extradata 标记包的结果
enum Patched {
    /// 标记包已与同流负载合并, 可以交付
    Merged(Packet),
    /// 插件读取失败, 改为重新处理缓冲区头部的包 (标记包被丢弃)
    Replaced(Packet),
}

/// 解封装引擎
pub struct DemuxEngine {
    pub(crate) ctx: FormatContext,
    pub(crate) demuxer: Box<dyn Demuxer>,
    pub(crate) options: DemuxOptions,
    pub(crate) state: PluginState,
    pub(crate) decoder_provider: Option<Arc<dyn DecoderProvider>>,
    /// 只有 pts 的流的 dts 重建队列, 探测阶段建立
    pub(crate) dts_queues: HashMap<usize, DtsQueue>,
}

impl DemuxEngine {
    /// 用字节流端口和格式插件创建引擎
    pub fn new(io: IoContext, demuxer: Box<dyn Demuxer>) -> Self {
        Self {
            ctx: FormatContext::new(io),
            demuxer,
            options: DemuxOptions::default(),
            state: PluginState::Uninitialized,
            decoder_provider: None,
            dts_queues: HashMap::new(),
        }
    }

    pub fn context(&self) -> &FormatContext {
        &self.ctx
    }

    /// 可变上下文, 调用方不得在操作进行中修改
    pub fn context_mut(&mut self) -> &mut FormatContext {
        &mut self.ctx
    }

    pub fn streams(&self) -> &[Stream] {
        &self.ctx.streams
    }

    pub fn options(&self) -> &DemuxOptions {
        &self.options
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// 安装探测解码器工厂, 非快速打开模式下探测阶段会使用
    pub fn set_decoder_provider(&mut self, provider: Arc<dyn DecoderProvider>) {
        self.decoder_provider = Some(provider);
    }

    /// 取消句柄, 可在其他任务中触发
    pub fn abort_handle(&self) -> AbortHandle {
        self.ctx.io.abort_handle()
    }

    /// 打开输入并解析头部
    ///
    /// 头部解析失败对该引擎是终止性的: 已创建的流被清除, 之后只能 `close`.
    pub async fn open(&mut self, mut options: DemuxOptions) -> AvResult<()> {
        if self.state != PluginState::Uninitialized {
            return Err(AvError::InvalidState(format!(
                "open 只能调用一次, 当前状态 {:?}",
                self.state
            )));
        }
        let min_duration = self.demuxer.min_analyze_duration_ms();
        options.max_analyze_duration_ms = options.max_analyze_duration_ms.max(min_duration);
        self.options = options;
        self.ctx.format = Some(self.demuxer.format_id());

        if let Err(e) = self.demuxer.init(&mut self.ctx) {
            self.fail_header(&e);
            return Err(e);
        }
        self.state = PluginState::Initialized;

        match self.demuxer.read_header(&mut self.ctx).await {
            Ok(()) => {
                self.state = PluginState::HeaderRead;
                debug!(
                    "{}: 头部解析完成, {} 条流",
                    self.demuxer.name(),
                    self.ctx.streams.len()
                );
                Ok(())
            }
            Err(e) => {
                self.fail_header(&e);
                Err(e)
            }
        }
    }

    fn fail_header(&mut self, e: &AvError) {
        error!("{}: 头部解析失败: {e}", self.demuxer.name());
        self.state = PluginState::Failed;
        self.ctx.error_flag |= ErrorFlags::HEADER;
        self.ctx.streams.clear();
        self.ctx.interval.packet_buffer.clear();
    }

    pub(crate) fn ensure_readable(&self) -> AvResult<()> {
        match self.state {
            PluginState::HeaderRead | PluginState::Streaming => Ok(()),
            state => Err(AvError::InvalidState(format!(
                "当前状态 {state:?} 不能读包或 seek"
            ))),
        }
    }

    /// 向插件要一个包, 记录 I/O 错误与取消
    async fn read_from_plugin(&mut self) -> AvResult<Packet> {
        let result = self.demuxer.read_packet(&mut self.ctx).await;
        if let Err(e) = &result {
            match e {
                AvError::Io(_) => self.ctx.error_flag |= ErrorFlags::IO,
                AvError::Aborted => self.ctx.error_flag |= ErrorFlags::ABORTED,
                _ => {}
            }
        }
        result
    }

    /// 读取下一个包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取
    /// - `Err(AvError::Eof)`: 已读完, 之后仍可 seek
    pub async fn read_packet(&mut self) -> AvResult<Packet> {
        self.ensure_readable()?;
        self.state = PluginState::Streaming;

        let mut packet = self.next_packet().await?;
        self.fill_dts(&mut packet);
        if self.ctx.io.is_seekable() {
            self.index_packet(&packet);
        }
        if packet.is_empty() {
            debug!("流 {} 交付零长度信令包", packet.stream_index);
        }
        Ok(packet)
    }

    /// 取下一个包并修补带内 extradata, 不补全 dts, 不增长索引
    async fn next_packet(&mut self) -> AvResult<Packet> {
        let mut pending: Option<Packet> = None;
        loop {
            let mut packet = match pending.take() {
                Some(packet) => packet,
                None => match self.ctx.interval.packet_buffer.pop_front() {
                    Some(packet) => packet,
                    None => self.read_from_plugin().await?,
                },
            };

            let Some(stream) = self.ctx.stream_by_index(packet.stream_index) else {
                warn!("丢弃孤立包: 流 {} 已不存在", packet.stream_index);
                continue;
            };

            if stream.codecpar.codec_id.has_in_band_extradata() && packet.is_empty() {
                if packet.side_data(SideDataType::NewExtradata).is_some() {
                    match self.complete_extradata_marker(packet).await? {
                        Patched::Merged(merged) => packet = merged,
                        Patched::Replaced(cached) => {
                            pending = Some(cached);
                            continue;
                        }
                    }
                } else if packet.flags.contains(PacketFlags::END) {
                    continue;
                }
            }
            return Ok(packet);
        }
    }

    /// 用探测阶段建立的队列为 dts 未知的包补全 dts
    fn fill_dts(&mut self, packet: &mut Packet) {
        if packet.dts != NOPTS_VALUE || packet.pts == NOPTS_VALUE {
            return;
        }
        if let Some(queue) = self.dts_queues.get_mut(&packet.stream_index) {
            if let Some(dts) = queue.push(packet.pts) {
                packet.dts = dts;
            }
        }
    }

    /// 为零长度的 extradata 标记包找到同流的真实负载
    ///
    /// 期间读到的其他流的包进入前瞻缓冲区; 若缓冲区里该流最后一个包
    /// 也是空包, 就地替换或补上负载.
    async fn complete_extradata_marker(&mut self, mut marker: Packet) -> AvResult<Patched> {
        loop {
            let next = match self.read_from_plugin().await {
                Ok(next) => next,
                Err(e) => {
                    return match self.ctx.interval.packet_buffer.pop_front() {
                        Some(cached) => {
                            warn!(
                                "流 {} 的 extradata 标记包没有等到负载 ({e}), 已丢弃",
                                marker.stream_index
                            );
                            Ok(Patched::Replaced(cached))
                        }
                        None => Err(e),
                    };
                }
            };

            if next.stream_index == marker.stream_index {
                if !next.is_empty() {
                    marker.merge_payload_from(&next);
                    return Ok(Patched::Merged(marker));
                }
                // 更新的标记包替换旧的, 其余空包丢弃
                if next.side_data(SideDataType::NewExtradata).is_some() {
                    marker = next;
                }
                continue;
            }

            let buffer = &mut self.ctx.interval.packet_buffer;
            let slot = buffer
                .iter()
                .rposition(|p| p.stream_index == next.stream_index);
            match slot {
                Some(i) if buffer[i].is_empty() && next.is_empty() => buffer[i] = next,
                Some(i) if buffer[i].is_empty() => buffer[i].merge_payload_from(&next),
                _ => buffer.push_back(next),
            }
        }
    }

    /// 在可 seek 的来源上顺带增长样本索引
    ///
    /// 视频只索引关键帧; 音频只在与最近的已有条目相距不小于
    /// `sample_index_step_ms` 时才索引.
    fn index_packet(&mut self, packet: &Packet) {
        if packet.pos < 0 || packet.pts == NOPTS_VALUE {
            return;
        }
        let step_ms = self.options.sample_index_step_ms as i64;
        let Some(stream) = self.ctx.stream_by_index_mut(packet.stream_index) else {
            return;
        };
        if stream.sample_index.contains_pos(packet.pos) {
            return;
        }
        let sample = Sample {
            dts: packet.dts,
            pts: packet.pts,
            pos: packet.pos,
            size: packet.size() as u32,
            duration: packet.duration,
            flags: packet.flags,
        };
        match stream.media_type() {
            MediaType::Video => {
                if packet.is_keyframe() {
                    stream.sample_index.insert(sample);
                }
            }
            MediaType::Audio => {
                let time_base = if packet.time_base.is_nonzero() {
                    packet.time_base
                } else {
                    stream.time_base
                };
                let index = &stream.sample_index;
                let at = index.lower_bound(packet.pts);
                let far_enough = |neighbour: Option<&Sample>| {
                    neighbour.is_none_or(|s| {
                        rescale((packet.pts - s.pts).abs(), time_base, Rational::MILLI) >= step_ms
                    })
                };
                let prev = at.checked_sub(1).and_then(|i| index.get(i));
                if far_enough(prev) && far_enough(index.get(at)) {
                    stream.sample_index.insert(sample);
                }
            }
            _ => {}
        }
    }

    /// 定位
    ///
    /// # 参数
    /// - `stream_index`: 目标流; `None` 或不存在时依次退到第一条视频、音频、字幕流
    /// - `timestamp`: 毫秒时间戳; 带 `BYTE` 标志时为字节偏移
    /// - `flags`: Seek 标志
    ///
    /// 失败时前瞻缓冲区保持原样.
    pub async fn seek(
        &mut self,
        stream_index: Option<usize>,
        timestamp: i64,
        flags: SeekFlags,
    ) -> AvResult<()> {
        self.ensure_readable()?;
        let (index, time_base, media_type) = {
            let stream = self.resolve_seek_stream(stream_index)?;
            (stream.index, stream.time_base, stream.media_type())
        };
        let target = if flags.contains(SeekFlags::BYTE) {
            timestamp
        } else {
            rescale(timestamp, Rational::MILLI, time_base)
        };
        debug!("seek {media_type} 流 {index}: {timestamp} -> {target}, 标志 {flags:?}");

        let pos_before = self
            .demuxer
            .seek(&mut self.ctx, Some(index), target, flags)
            .await?;
        debug!("seek 完成, 定位前位置 {pos_before}");

        self.discard_lookahead();
        self.state = PluginState::Streaming;
        self.reprime_dts().await;
        Ok(())
    }

    /// seek 之后重新估算 dts
    ///
    /// 有重排序延迟的流各读取至少 16 个 dts 未知的包, 按原延迟重新分配 dts,
    /// 再用剩余的 pts 预填队列. 读到的包按原顺序放回前瞻缓冲区.
    async fn reprime_dts(&mut self) {
        let primed: Vec<usize> = self
            .dts_queues
            .iter()
            .filter(|(_, queue)| queue.delay() > 0)
            .map(|(index, _)| *index)
            .collect();
        if primed.is_empty() {
            return;
        }
        for queue in self.dts_queues.values_mut() {
            queue.clear();
        }

        let needs_dts = |p: &Packet| {
            primed.contains(&p.stream_index) && p.dts == NOPTS_VALUE && p.pts != NOPTS_VALUE
        };
        let mut cache: Vec<Packet> = Vec::new();
        let mut counts: HashMap<usize, usize> = HashMap::new();
        while primed
            .iter()
            .any(|i| counts.get(i).copied().unwrap_or(0) < DTS_REPRIME_SAMPLES)
        {
            match self.next_packet().await {
                Ok(packet) => {
                    if needs_dts(&packet) {
                        *counts.entry(packet.stream_index).or_default() += 1;
                    }
                    cache.push(packet);
                }
                Err(e) => {
                    debug!("seek 后重新估算 dts 提前结束: {e}");
                    break;
                }
            }
        }

        for &index in &primed {
            let Some(queue) = self.dts_queues.get_mut(&index) else {
                continue;
            };
            let pts: Vec<i64> = cache
                .iter()
                .filter(|p| p.stream_index == index && needs_dts(p))
                .map(|p| p.pts)
                .collect();
            let dts = guess_dts_from_pts(queue.delay(), &pts);
            for (packet, dts) in cache
                .iter_mut()
                .filter(|p| p.stream_index == index && needs_dts(p))
                .zip(dts)
            {
                packet.dts = dts;
            }
            queue.seed(&pts);
        }

        let buffer = &mut self.ctx.interval.packet_buffer;
        for packet in cache.into_iter().rev() {
            buffer.push_front(packet);
        }
    }

    fn resolve_seek_stream(&self, stream_index: Option<usize>) -> AvResult<&Stream> {
        if let Some(stream) = stream_index.and_then(|i| self.ctx.stream_by_index(i)) {
            return Ok(stream);
        }
        [MediaType::Video, MediaType::Audio, MediaType::Subtitle]
            .into_iter()
            .find_map(|media_type| self.ctx.stream_by_media_type(media_type))
            .ok_or_else(|| AvError::InvalidArgument("没有可用于 seek 的流".into()))
    }

    /// 清空前瞻缓冲区
    ///
    /// 片段来源上, 被丢弃的包带有的新 extradata 会保存到对应流上 (仅当流还没有).
    fn discard_lookahead(&mut self) {
        let slice = self.ctx.io.flags().contains(IoFlags::SLICE);
        let discarded: Vec<Packet> = self.ctx.interval.packet_buffer.drain(..).collect();
        if !slice {
            return;
        }
        for packet in discarded {
            let Some(extradata) = packet.side_data(SideDataType::NewExtradata) else {
                continue;
            };
            if let Some(stream) = self.ctx.stream_by_index_mut(packet.stream_index) {
                if stream.side_data(SideDataType::NewExtradata).is_none() {
                    stream.add_side_data(SideDataType::NewExtradata, extradata.clone());
                }
            }
        }
    }

    /// 销毁插件并释放缓冲的包, 可重复调用
    pub async fn close(&mut self) {
        if matches!(
            self.state,
            PluginState::Uninitialized | PluginState::Destroyed
        ) {
            return;
        }
        self.demuxer.destroy(&mut self.ctx).await;
        self.ctx.interval.packet_buffer.clear();
        self.state = PluginState::Destroyed;
        debug!("{}: 已关闭", self.demuxer.name());
    }
}
