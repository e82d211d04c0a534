//! 流信息定义.
//!
//! 描述容器中的一条音视频/字幕流. 静态参数来自容器头部,
//! 时长、码率等在探测阶段逐步补全.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use avkit_codec::{CodecParameters, SideData, SideDataType};
use avkit_core::{MediaType, NOPTS_VALUE, Rational};
use bitflags::bitflags;
use bytes::Bytes;

use crate::sample_index::{Sample, SampleIndex};
use crate::sample_table::SampleTable;

bitflags! {
    /// 流的处置标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Disposition: u32 {
        const DEFAULT = 1 << 0;
        const DUB = 1 << 1;
        const ORIGINAL = 1 << 2;
        const COMMENT = 1 << 3;
        const LYRICS = 1 << 4;
        const KARAOKE = 1 << 5;
        const FORCED = 1 << 6;
        const HEARING_IMPAIRED = 1 << 7;
        const VISUAL_IMPAIRED = 1 << 8;
        /// 封面等附带图片, 不参与正常的流选择
        const ATTACHED_PIC = 1 << 10;
    }
}

/// 读包时丢弃哪些样本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discard {
    /// 不丢弃
    #[default]
    Default,
    /// 只保留关键帧
    NonKey,
    /// 整条流都不读取
    All,
}

/// 流信息
///
/// `priv_data` 由拥有该流的格式插件存放私有解析状态,
/// 只应在该插件内部按具体类型取回.
pub struct Stream {
    /// 流索引 (在上下文中唯一)
    pub index: usize,
    /// 流 id (在进程内唯一)
    pub id: u32,
    /// 编解码器参数
    pub codecpar: CodecParameters,
    /// 时间基
    pub time_base: Rational,
    /// 流时长 (以 time_base 为单位, `NOPTS_VALUE` 表示未知)
    pub duration: i64,
    /// 起始时间 (以 time_base 为单位)
    pub start_time: i64,
    /// 第一个 dts
    pub first_dts: i64,
    /// 总帧数 (0 表示未知)
    pub nb_frames: u64,
    pub disposition: Disposition,
    /// 元数据 (标题, 语言等)
    pub metadata: HashMap<String, String>,
    /// 流级附加数据
    pub side_data: Vec<SideData>,
    /// 按 pts 排序的 seek 索引
    pub sample_index: SampleIndex,
    /// 按解码顺序排列的样本表 (基于索引的格式使用), 读游标在此
    pub sample_table: SampleTable,
    pub discard: Discard,
    priv_data: Option<Box<dyn Any + Send>>,
}

impl Stream {
    pub fn new(index: usize, id: u32) -> Self {
        Self {
            index,
            id,
            codecpar: CodecParameters::default(),
            time_base: Rational::UNDEFINED,
            duration: NOPTS_VALUE,
            start_time: NOPTS_VALUE,
            first_dts: NOPTS_VALUE,
            nb_frames: 0,
            disposition: Disposition::empty(),
            metadata: HashMap::new(),
            side_data: Vec::new(),
            sample_index: SampleIndex::new(),
            sample_table: SampleTable::new(),
            discard: Discard::Default,
            priv_data: None,
        }
    }

    /// 媒体类型
    pub fn media_type(&self) -> MediaType {
        self.codecpar.codec_type
    }

    pub fn is_attached_pic(&self) -> bool {
        self.disposition.contains(Disposition::ATTACHED_PIC)
    }

    /// 登记一个容器样本表中的样本: 同时进入解码顺序表和 seek 索引
    pub fn add_sample(&mut self, sample: Sample) {
        self.sample_table.insert(sample);
        self.sample_index.insert(sample);
    }

    /// 安装插件私有状态, 替换已有状态
    pub fn set_priv_data<T: Any + Send>(&mut self, data: T) {
        self.priv_data = Some(Box::new(data));
    }

    /// 按具体类型取回插件私有状态
    pub fn priv_data<T: Any>(&self) -> Option<&T> {
        self.priv_data.as_deref()?.downcast_ref::<T>()
    }

    pub fn priv_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.priv_data.as_deref_mut()?.downcast_mut::<T>()
    }

    pub fn clear_priv_data(&mut self) {
        self.priv_data = None;
    }

    /// 按类型查找流级附加数据
    pub fn side_data(&self, kind: SideDataType) -> Option<&Bytes> {
        self.side_data
            .iter()
            .find(|sd| sd.kind == kind)
            .map(|sd| &sd.data)
    }

    /// 添加流级附加数据, 同类型已存在时替换
    pub fn add_side_data(&mut self, kind: SideDataType, data: impl Into<Bytes>) {
        let data = data.into();
        match self.side_data.iter_mut().find(|sd| sd.kind == kind) {
            Some(existing) => existing.data = data,
            None => self.side_data.push(SideData { kind, data }),
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("codec_id", &self.codecpar.codec_id)
            .field("time_base", &self.time_base)
            .field("duration", &self.duration)
            .field("start_time", &self.start_time)
            .field("disposition", &self.disposition)
            .field("samples", &self.sample_table.len())
            .field("index_entries", &self.sample_index.len())
            .field("discard", &self.discard)
            .field("has_priv_data", &self.priv_data.is_some())
            .finish()
    }
}
