//! 集成测试公用的插件与辅助函数.
//!
//! - `ScriptedDemuxer`: 按预先编排的时间线交付包, 可注入读包与 seek 错误
//! - `IndexedDemuxer`: 头部里给出完整样本表, 读包与 seek 交给索引辅助函数
//! - `RecordingMuxer`: 记录写入的包并把负载写到字节流
//! - `FakeDecoderProvider`: 第 N 个包解出一帧

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use avkit::codec::{
    CodecId, CodecParameters, DecoderProvider, FrameInfo, Packet, PacketFlags, ProbeDecoder,
};
use avkit::core::{AvError, AvResult, NOPTS_VALUE, Rational};
use avkit::format::{
    Demuxer, FormatContext, FormatId, Muxer, Sample, SeekFlags, SelectorPolicy,
    read_indexed_packet, seek_indexed,
};

/// 初始化测试日志, 多次调用无副作用
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 构造一个带负载的包
pub fn packet(stream_index: usize, pts: i64, size: usize) -> Packet {
    let mut packet = Packet::from_data(vec![stream_index as u8; size]);
    packet.stream_index = stream_index;
    packet.pts = pts;
    packet.dts = pts;
    packet
}

/// 流描述: 编解码器参数与时间基
#[derive(Clone)]
pub struct StreamSpec {
    pub codecpar: CodecParameters,
    pub time_base: Rational,
}

impl StreamSpec {
    pub fn new(codecpar: CodecParameters, time_base: Rational) -> Self {
        Self {
            codecpar,
            time_base,
        }
    }

    pub fn h264() -> Self {
        Self::new(
            CodecParameters::video(CodecId::H264, 1280, 720),
            Rational::new(1, 90000),
        )
    }

    pub fn aac() -> Self {
        Self::new(
            CodecParameters::audio(CodecId::Aac, 48000, 2),
            Rational::new(1, 48000),
        )
    }
}

/// 时间线上的一步
#[derive(Clone)]
pub enum Step {
    Packet(Packet),
    /// 插件把这个包放进前瞻缓冲区, 本次调用交付下一步
    Buffered(Packet),
    /// 读到这一步时返回 `DataInvalid`
    Fail,
}

/// 插件调用记录, 插件被装箱后测试仍能查看
#[derive(Default)]
pub struct Journal {
    pub seeks: Mutex<Vec<(Option<usize>, i64, SeekFlags)>>,
    pub destroyed: AtomicUsize,
}

impl Journal {
    pub fn seeks(&self) -> Vec<(Option<usize>, i64, SeekFlags)> {
        self.seeks.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// 按时间线交付包的插件
///
/// 字节 seek 把读位置移到第一个 `pos` 不小于目标的包; 时间戳 seek 移到
/// 目标流第一个 `pts` 不小于目标的包.
pub struct ScriptedDemuxer {
    pub streams: Vec<StreamSpec>,
    pub timeline: Vec<Step>,
    pub cursor: usize,
    pub fail_header: bool,
    pub analyze_count: usize,
    pub min_analyze_ms: u64,
    pub estimate_duration: bool,
    /// 前 N 次 seek 记录后返回错误
    pub fail_seeks: usize,
    pub journal: Arc<Journal>,
}

impl ScriptedDemuxer {
    pub fn new(streams: Vec<StreamSpec>, packets: Vec<Packet>) -> Self {
        Self::with_steps(streams, packets.into_iter().map(Step::Packet).collect())
    }

    pub fn with_steps(streams: Vec<StreamSpec>, timeline: Vec<Step>) -> Self {
        Self {
            streams,
            timeline,
            cursor: 0,
            fail_header: false,
            analyze_count: 0,
            min_analyze_ms: 0,
            estimate_duration: false,
            fail_seeks: 0,
            journal: Arc::new(Journal::default()),
        }
    }
}

#[async_trait]
impl Demuxer for ScriptedDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::MpegTs
    }

    async fn read_header(&mut self, ctx: &mut FormatContext) -> AvResult<()> {
        for spec in &self.streams {
            let stream = ctx.create_stream();
            stream.codecpar = spec.codecpar.clone();
            stream.time_base = spec.time_base;
        }
        if self.fail_header {
            return Err(AvError::DataInvalid("脚本: 头部损坏".into()));
        }
        Ok(())
    }

    async fn read_packet(&mut self, ctx: &mut FormatContext) -> AvResult<Packet> {
        loop {
            let step = self.timeline.get(self.cursor).cloned().ok_or(AvError::Eof)?;
            self.cursor += 1;
            match step {
                Step::Packet(packet) => return Ok(packet),
                Step::Buffered(packet) => ctx.interval.packet_buffer.push_back(packet),
                Step::Fail => return Err(AvError::DataInvalid("脚本: 读包失败".into())),
            }
        }
    }

    async fn seek(
        &mut self,
        _ctx: &mut FormatContext,
        stream_index: Option<usize>,
        timestamp: i64,
        flags: SeekFlags,
    ) -> AvResult<i64> {
        self.journal
            .seeks
            .lock()
            .unwrap()
            .push((stream_index, timestamp, flags));
        if self.fail_seeks > 0 {
            self.fail_seeks -= 1;
            return Err(AvError::DataInvalid("脚本: seek 失败".into()));
        }
        let pos_before = self
            .timeline
            .get(self.cursor)
            .and_then(|step| match step {
                Step::Packet(p) | Step::Buffered(p) if p.pos != NOPTS_VALUE => Some(p.pos),
                _ => None,
            })
            .unwrap_or(0);
        let target = self.timeline.iter().position(|step| match step {
            Step::Packet(p) | Step::Buffered(p) if flags.contains(SeekFlags::BYTE) => {
                p.pos != NOPTS_VALUE && p.pos >= timestamp
            }
            Step::Packet(p) | Step::Buffered(p) => {
                Some(p.stream_index) == stream_index && p.pts >= timestamp
            }
            Step::Fail => false,
        });
        self.cursor = target.unwrap_or(self.timeline.len());
        Ok(pos_before)
    }

    fn analyze_streams_count(&self) -> usize {
        self.analyze_count
    }

    fn min_analyze_duration_ms(&self) -> u64 {
        self.min_analyze_ms
    }

    fn needs_duration_estimate(&self) -> bool {
        self.estimate_duration
    }

    async fn destroy(&mut self, _ctx: &mut FormatContext) {
        self.journal.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// 头部携带完整样本表的插件
///
/// 样本按 `(流下标, pts, 关键帧)` 顺序依次排布在字节流中, 每个样本
/// `sample_size` 字节, 内容为样本序号.
pub struct IndexedDemuxer {
    pub streams: Vec<StreamSpec>,
    pub layout: Vec<(usize, i64, bool)>,
    pub sample_size: u32,
    pub policy: SelectorPolicy,
}

impl IndexedDemuxer {
    /// 与布局对应的字节流内容
    pub fn payload(&self) -> Vec<u8> {
        (0..self.layout.len())
            .flat_map(|i| vec![i as u8; self.sample_size as usize])
            .collect()
    }
}

#[async_trait]
impl Demuxer for IndexedDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Mp4
    }

    async fn read_header(&mut self, ctx: &mut FormatContext) -> AvResult<()> {
        for spec in &self.streams {
            let stream = ctx.create_stream();
            stream.codecpar = spec.codecpar.clone();
            stream.time_base = spec.time_base;
        }
        for (i, &(stream_index, pts, key)) in self.layout.iter().enumerate() {
            let pos = i as i64 * i64::from(self.sample_size);
            let mut sample = Sample::new(pts, pts, pos, self.sample_size);
            if key {
                sample.flags = PacketFlags::KEY;
            }
            let stream = ctx
                .stream_by_index_mut(stream_index)
                .ok_or(AvError::StreamNotFound(stream_index))?;
            stream.add_sample(sample);
        }
        Ok(())
    }

    async fn read_packet(&mut self, ctx: &mut FormatContext) -> AvResult<Packet> {
        read_indexed_packet(ctx, &self.policy).await
    }

    async fn seek(
        &mut self,
        ctx: &mut FormatContext,
        stream_index: Option<usize>,
        timestamp: i64,
        flags: SeekFlags,
    ) -> AvResult<i64> {
        let stream_index = stream_index.ok_or_else(|| {
            AvError::FormatNotSupport("样本索引 seek 需要目标流".into())
        })?;
        seek_indexed(ctx, stream_index, timestamp, flags).await
    }
}

/// 记录写入情况的封装插件
#[derive(Default)]
pub struct MuxRecord {
    pub header_written: bool,
    pub trailer_written: bool,
    /// `(流下标, dts, pts)`
    pub packets: Vec<(usize, i64, i64)>,
}

pub struct RecordingMuxer {
    pub format: FormatId,
    pub record: Arc<Mutex<MuxRecord>>,
}

impl RecordingMuxer {
    pub fn new(format: FormatId) -> Self {
        Self {
            format,
            record: Arc::new(Mutex::new(MuxRecord::default())),
        }
    }
}

#[async_trait]
impl Muxer for RecordingMuxer {
    fn format_id(&self) -> FormatId {
        self.format
    }

    async fn write_header(&mut self, ctx: &mut FormatContext) -> AvResult<()> {
        ctx.io.write_tag(b"AVKT").await?;
        ctx.io.write_u32(ctx.streams.len() as u32).await?;
        self.record.lock().unwrap().header_written = true;
        Ok(())
    }

    async fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> AvResult<()> {
        ctx.io.write_u32(packet.size() as u32).await?;
        ctx.io.write_all(&packet.data).await?;
        self.record
            .lock()
            .unwrap()
            .packets
            .push((packet.stream_index, packet.dts, packet.pts));
        Ok(())
    }

    async fn write_trailer(&mut self, ctx: &mut FormatContext) -> AvResult<()> {
        ctx.io.write_tag(b"END ").await?;
        self.record.lock().unwrap().trailer_written = true;
        Ok(())
    }
}

/// 第 `frame_after` 个包 (从 1 计) 解出一帧的探测解码器
pub struct FakeDecoder {
    frame_after: usize,
    seen: usize,
    info: FrameInfo,
}

impl ProbeDecoder for FakeDecoder {
    fn open(&mut self, _params: &CodecParameters) -> AvResult<()> {
        Ok(())
    }

    fn decode(&mut self, _packet: &Packet) -> AvResult<Option<FrameInfo>> {
        self.seen += 1;
        if self.seen >= self.frame_after {
            return Ok(Some(self.info.clone()));
        }
        Ok(None)
    }
}

pub struct FakeDecoderProvider {
    pub frame_after: usize,
    pub created: AtomicUsize,
}

impl FakeDecoderProvider {
    pub fn new(frame_after: usize) -> Self {
        Self {
            frame_after,
            created: AtomicUsize::new(0),
        }
    }
}

impl DecoderProvider for FakeDecoderProvider {
    fn create(&self, params: &CodecParameters) -> Option<Box<dyn ProbeDecoder>> {
        let info = match params.codec_id {
            CodecId::H264 => FrameInfo::Video {
                format: 0,
                width: params.width,
                height: params.height,
                sample_aspect_ratio: Rational::new(1, 1),
                color: Default::default(),
            },
            CodecId::Aac => FrameInfo::Audio {
                format: 8,
                sample_rate: params.sample_rate,
                channels: params.channels,
                nb_samples: 1024,
            },
            _ => return None,
        };
        self.created.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(FakeDecoder {
            frame_after: self.frame_after,
            seen: 0,
            info,
        }))
    }
}

/// 带新 extradata 的零长度标记包
pub fn extradata_marker(stream_index: usize, extradata: &'static [u8]) -> Packet {
    let mut packet = Packet::empty();
    packet.stream_index = stream_index;
    packet.add_side_data(
        avkit::codec::SideDataType::NewExtradata,
        Bytes::from_static(extradata),
    );
    packet
}
