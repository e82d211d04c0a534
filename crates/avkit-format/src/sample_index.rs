//! 样本索引.
//!
//! 每条流维护一张按 pts 排序的索引, seek 在其上做二分查找.
//! 索引可能在读包过程中逐步增长. 读取顺序由解码顺序样本表
//! ([`crate::sample_table`]) 决定, 与这里无关.

use std::collections::HashMap;

use avkit_codec::PacketFlags;
use avkit_core::NOPTS_VALUE;

/// 样本索引条目
///
/// 加入索引后除 `flags` 与未知的 `dts` 之外不再修改.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub dts: i64,
    pub pts: i64,
    /// 样本在文件中的字节偏移
    pub pos: i64,
    /// 样本大小 (字节)
    pub size: u32,
    pub duration: i64,
    pub flags: PacketFlags,
}

impl Sample {
    pub fn new(pts: i64, dts: i64, pos: i64, size: u32) -> Self {
        Self {
            dts,
            pts,
            pos,
            size,
            duration: 0,
            flags: PacketFlags::empty(),
        }
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    /// 解码时间, dts 未知时退回 pts
    pub fn decode_time(&self) -> i64 {
        if self.dts != NOPTS_VALUE {
            self.dts
        } else {
            self.pts
        }
    }
}

/// 一条流的样本索引
///
/// 不变量: `samples` 任何时刻都按 pts 升序排列.
#[derive(Debug, Default)]
pub struct SampleIndex {
    samples: Vec<Sample>,
    /// 字节位置 -> 样本下标
    pos_map: HashMap<i64, usize>,
    /// 关键帧推断已执行过
    keyframes_deduced: bool,
}

impl SampleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// 按 pts 有序插入, 返回插入下标
    ///
    /// pts 相同的样本保持插入顺序.
    pub fn insert(&mut self, sample: Sample) -> usize {
        let index = self.samples.partition_point(|s| s.pts <= sample.pts);
        if index < self.samples.len() {
            for slot in self.pos_map.values_mut() {
                if *slot >= index {
                    *slot += 1;
                }
            }
        }
        self.samples.insert(index, sample);
        if sample.pos != NOPTS_VALUE {
            self.pos_map.insert(sample.pos, index);
        }
        index
    }

    /// 是否已有位于该字节位置的样本
    pub fn contains_pos(&self, pos: i64) -> bool {
        self.pos_map.contains_key(&pos)
    }

    /// 查找位于该字节位置的样本下标
    pub fn index_of_pos(&self, pos: i64) -> Option<usize> {
        self.pos_map.get(&pos).copied()
    }

    /// 为该字节位置上 dts 未知的条目补上重建出的 dts
    pub fn fill_unknown_dts(&mut self, pos: i64, dts: i64) {
        if let Some(&index) = self.pos_map.get(&pos) {
            let sample = &mut self.samples[index];
            if sample.dts == NOPTS_VALUE {
                sample.dts = dts;
            }
        }
    }

    /// 插入点: 第一个 pts 不小于 `pts` 的条目下标
    pub fn lower_bound(&self, pts: i64) -> usize {
        self.samples.partition_point(|s| s.pts < pts)
    }

    /// 二分查找目标时间戳对应的条目
    ///
    /// 先找第一个 `pts >= target` 的条目; 若不是精确命中则退到前一个条目,
    /// 使落点不晚于目标. 目标早于所有条目时返回 0, 索引为空时返回 `None`.
    pub fn search(&self, target: i64) -> Option<usize> {
        if self.samples.is_empty() {
            return None;
        }
        let index = self.lower_bound(target);
        if index < self.samples.len() && self.samples[index].pts == target {
            return Some(index);
        }
        Some(index.saturating_sub(1))
    }

    /// 计算 seek 落点
    ///
    /// `keyframe_only` 为真时从查找结果向前回溯到最近的关键帧,
    /// 回溯不到关键帧时返回 `None`.
    pub fn seek_target(&self, target: i64, keyframe_only: bool) -> Option<usize> {
        let index = self.search(target)?;
        if !keyframe_only {
            return Some(index);
        }
        self.samples[..=index].iter().rposition(Sample::is_keyframe)
    }

    /// 没有任何样本被标记为关键帧时, 把所有样本标为关键帧
    ///
    /// 每条流只执行一次. 返回本次是否做了标记.
    pub fn deduce_keyframes(&mut self) -> bool {
        if self.keyframes_deduced {
            return false;
        }
        self.keyframes_deduced = true;
        if self.samples.iter().any(Sample::is_keyframe) {
            return false;
        }
        for sample in &mut self.samples {
            sample.flags |= PacketFlags::KEY;
        }
        true
    }
}
