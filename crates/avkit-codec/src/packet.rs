//! 压缩数据包 (Packet).
//!
//! 容器层与编解码层之间交换的最小单位. 负载使用 [`Bytes`] 引用计数句柄,
//! 克隆一个包只复制句柄, 最后一个持有者释放时才回收内存.

use avkit_core::{NOPTS_VALUE, Rational};
use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    /// 数据包标志位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        /// 关键帧
        const KEY = 1 << 0;
        /// 负载为 H.26x Annex B 起始码格式
        const H26X_ANNEXB = 1 << 1;
        /// 逻辑单元结束
        const END = 1 << 2;
    }
}

/// 附加数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideDataType {
    /// 带内更新的 extradata
    NewExtradata,
    /// 调色板
    Palette,
    /// 加密初始化信息
    EncryptionInitInfo,
    /// WebVTT cue 标识
    WebvttIdentifier,
    /// WebVTT cue 设置
    WebvttSettings,
    /// Matroska BlockAdditions
    MatroskaBlockAdditional,
}

/// 一条附加数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideData {
    pub kind: SideDataType,
    pub data: Bytes,
}

/// 压缩数据包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 解码时间戳 (DTS)
    pub dts: i64,
    /// 数据包时长 (以 time_base 为单位)
    pub duration: i64,
    /// 时间基
    pub time_base: Rational,
    /// 所属流的索引
    pub stream_index: usize,
    pub flags: PacketFlags,
    /// 在容器中的字节偏移量 (`NOPTS_VALUE` 表示未知)
    pub pos: i64,
    /// 附加数据列表
    pub side_data: Vec<SideData>,
}

impl Packet {
    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            duration: 0,
            time_base: Rational::UNDEFINED,
            stream_index: 0,
            flags: PacketFlags::empty(),
            pos: NOPTS_VALUE,
            side_data: Vec::new(),
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否没有负载 (纯附加数据信令包)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    /// 按类型查找附加数据
    pub fn side_data(&self, kind: SideDataType) -> Option<&Bytes> {
        self.side_data
            .iter()
            .find(|sd| sd.kind == kind)
            .map(|sd| &sd.data)
    }

    /// 添加附加数据, 同类型已存在时替换
    pub fn add_side_data(&mut self, kind: SideDataType, data: impl Into<Bytes>) {
        let data = data.into();
        match self.side_data.iter_mut().find(|sd| sd.kind == kind) {
            Some(existing) => existing.data = data,
            None => self.side_data.push(SideData { kind, data }),
        }
    }

    /// 用另一个包的负载与时间信息覆盖本包, 保留本包已有的附加数据
    ///
    /// 来源包的附加数据中本包没有的类型会被追加.
    pub fn merge_payload_from(&mut self, other: &Packet) {
        self.data = other.data.clone();
        self.pts = other.pts;
        self.dts = other.dts;
        self.duration = other.duration;
        self.pos = other.pos;
        self.time_base = other.time_base;
        self.flags |= other.flags;
        for sd in &other.side_data {
            if self.side_data(sd.kind).is_none() {
                self.side_data.push(sd.clone());
            }
        }
    }
}
