//! 解码顺序样本表.
//!
//! 基于索引的格式为每条流保存一张按解码顺序排列的样本表, 选择器的读游标
//! 在这张表上移动. 带 B 帧的视频里解码顺序与 pts 顺序不同, 因此按 pts 排序的
//! [`crate::sample_index::SampleIndex`] 只用于 seek 查找, 两张表通过字节位置对应.

use std::collections::HashMap;

use avkit_codec::PacketFlags;
use avkit_core::NOPTS_VALUE;

use crate::sample_index::Sample;

/// 一条流按解码顺序排列的样本表, 带读游标
///
/// 不变量: `samples` 按 `(解码时间, 字节位置)` 升序排列; `cursor <= samples.len()`.
#[derive(Debug, Default)]
pub struct SampleTable {
    samples: Vec<Sample>,
    /// 字节位置 -> 样本下标
    pos_map: HashMap<i64, usize>,
    /// 下一个待读取的样本下标, 等于长度时表示已读完
    cursor: usize,
}

impl SampleTable {
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

    /// 按解码顺序插入, 返回插入下标
    ///
    /// 插在游标之前的样本视为已经越过, 游标随之后移, 仍指向原来的样本.
    pub fn insert(&mut self, sample: Sample) -> usize {
        let key = (sample.decode_time(), sample.pos);
        let index = self
            .samples
            .partition_point(|s| (s.decode_time(), s.pos) <= key);
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
        if index < self.cursor {
            self.cursor += 1;
        }
        index
    }

    /// 查找位于该字节位置的样本下标
    pub fn index_of_pos(&self, pos: i64) -> Option<usize> {
        self.pos_map.get(&pos).copied()
    }

    /// 与索引条目对应的样本下标
    ///
    /// 先按字节位置对应; 位置未知时取第一个解码时间不早于该条目的样本.
    pub fn locate(&self, sample: &Sample) -> usize {
        if let Some(index) = self.index_of_pos(sample.pos) {
            return index;
        }
        let decode_time = sample.decode_time();
        self.samples
            .partition_point(|s| s.decode_time() < decode_time)
    }

    /// 把所有样本标为关键帧
    pub fn mark_all_keyframes(&mut self) {
        for sample in &mut self.samples {
            sample.flags |= PacketFlags::KEY;
        }
    }

    // ========================
    // 读游标
    // ========================

    /// 游标指向的样本, 已读完时返回 `None`
    pub fn current(&self) -> Option<&Sample> {
        self.samples.get(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 游标前进一步
    pub fn advance(&mut self) {
        if self.cursor < self.samples.len() {
            self.cursor += 1;
        }
    }

    /// 把游标前移到下一个关键帧, 返回是否还有可读样本
    pub fn skip_to_keyframe(&mut self) -> bool {
        while self.current().is_some_and(|s| !s.is_keyframe()) {
            self.cursor += 1;
        }
        self.cursor < self.samples.len()
    }

    /// 把游标放到指定下标, 超出末尾时视为已读完
    pub fn reset_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.samples.len());
    }

    /// 把游标放到末尾
    pub fn finish(&mut self) {
        self.cursor = self.samples.len();
    }

    pub fn is_ended(&self) -> bool {
        self.cursor >= self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dts: i64, pts: i64, pos: i64) -> Sample {
        Sample::new(pts, dts, pos, 4)
    }

    #[test]
    fn test_按解码顺序排列() {
        let mut table = SampleTable::new();
        // I P B B, 到达顺序打乱
        for s in [
            sample(6000, 6000, 8),
            sample(0, 3000, 0),
            sample(9000, 9000, 12),
            sample(3000, 12000, 4),
        ] {
            table.insert(s);
        }
        let dts: Vec<i64> = table.samples().iter().map(|s| s.dts).collect();
        assert_eq!(dts, vec![0, 3000, 6000, 9000]);
        assert_eq!(table.index_of_pos(4), Some(1));
        assert_eq!(table.index_of_pos(12), Some(3));
    }

    #[test]
    fn test_插入不打乱游标() {
        let mut table = SampleTable::new();
        table.insert(sample(0, 0, 0));
        table.insert(sample(2000, 2000, 20));
        table.advance();
        assert_eq!(table.current().map(|s| s.pos), Some(20));

        // 插在游标处: 新样本尚未交付且解码更早, 下一个读到它
        table.insert(sample(1000, 1000, 10));
        assert_eq!(table.cursor(), 1);
        assert_eq!(table.current().map(|s| s.pos), Some(10));

        // 插在游标之前: 游标仍指向原样本, 不会重复交付
        table.insert(sample(500, 500, 5));
        assert_eq!(table.cursor(), 2);
        assert_eq!(table.current().map(|s| s.pos), Some(10));

        table.advance();
        table.advance();
        assert!(table.is_ended());
        // 读完后在末尾追加的样本仍可读到
        table.insert(sample(3000, 3000, 30));
        assert!(!table.is_ended());
        assert_eq!(table.current().map(|s| s.pos), Some(30));
    }

    #[test]
    fn test_按索引条目定位() {
        let mut table = SampleTable::new();
        table.insert(sample(0, 3000, 0));
        table.insert(sample(3000, 12000, 4));
        table.insert(sample(6000, 6000, 8));
        assert_eq!(table.locate(&sample(3000, 12000, 4)), 1);
        // 没有字节位置时按解码时间定位
        assert_eq!(table.locate(&sample(5000, 5000, NOPTS_VALUE)), 2);
    }

    #[test]
    fn test_跳到关键帧() {
        let mut table = SampleTable::new();
        let mut key = sample(2000, 2000, 2);
        key.flags = PacketFlags::KEY;
        table.insert(sample(0, 0, 0));
        table.insert(sample(1000, 1000, 1));
        table.insert(key);
        assert!(table.skip_to_keyframe());
        assert_eq!(table.cursor(), 2);
        table.advance();
        assert!(!table.skip_to_keyframe());
        table.reset_cursor(99);
        assert!(table.is_ended());
    }
}
