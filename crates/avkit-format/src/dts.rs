//! 只有 pts 的流的 dts 重建.
//!
//! 有些容器只给出 pts. 带重排序帧的视频里 pts 不单调, 解码顺序下第 k 个包的
//! dts 取"到目前为止见过、尚未用作 dts 的最小 pts", 前提是重排序深度
//! (延迟帧数) 已知. 探测阶段从前若干个包的 pts 估出延迟, 之后读包时用
//! [`DtsQueue`] 逐包补全.

use std::collections::VecDeque;

/// 延迟帧数上限
pub const MAX_VIDEO_DELAY: u32 = 16;

/// seek 之后重新估算 dts 时, 每条流至少收集这么多个包
pub const DTS_REPRIME_SAMPLES: usize = 16;

/// 从解码顺序的 pts 列表估计重排序延迟
///
/// 第 k 个包在排序后的位置为 r, 用作 dts 的值必须不晚于其 pts,
/// 因此延迟至少为 `k - r`. 返回所有包中的最大值.
pub fn guess_delay_from_pts(pts: &[i64]) -> u32 {
    let mut order: Vec<usize> = (0..pts.len()).collect();
    order.sort_by_key(|&i| (pts[i], i));
    order
        .iter()
        .enumerate()
        .map(|(rank, &k)| k.saturating_sub(rank))
        .max()
        .unwrap_or(0) as u32
}

/// 按给定延迟为解码顺序的 pts 列表生成 dts
///
/// 第 k 个 dts 为排序后第 `k - delay` 个 pts; 开头不足的部分按平均帧间隔向前外推.
pub fn guess_dts_from_pts(delay: u32, pts: &[i64]) -> Vec<i64> {
    let mut sorted = pts.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n == 0 {
        return Vec::new();
    }
    let delay = delay as usize;
    let step = if n > 1 {
        (sorted[n - 1] - sorted[0]) / (n - 1) as i64
    } else {
        0
    };
    (0..n)
        .map(|k| {
            if k >= delay {
                sorted[k - delay]
            } else {
                sorted[0] - (delay - k) as i64 * step
            }
        })
        .collect()
}

/// 读包时逐包补全 dts 的队列
///
/// 队列按升序保存尚未用作 dts 的 pts, 长度超过延迟时弹出最小值作为 dts.
#[derive(Debug, Clone, Default)]
pub struct DtsQueue {
    delay: u32,
    pending: VecDeque<i64>,
}

impl DtsQueue {
    pub fn new(delay: u32) -> Self {
        Self {
            delay,
            pending: VecDeque::new(),
        }
    }

    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// 用一段已经分配过 dts 的 pts 预填队列
    ///
    /// 按 [`guess_dts_from_pts`] 分配后, 最大的 `delay` 个 pts 尚未被用作 dts.
    pub fn seed(&mut self, pts: &[i64]) {
        let mut sorted = pts.to_vec();
        sorted.sort_unstable();
        let keep = sorted.len().min(self.delay as usize);
        self.pending = sorted[sorted.len() - keep..].iter().copied().collect();
    }

    /// 送入一个包的 pts, 返回该包的 dts; 队列尚未填满时返回 `None`
    pub fn push(&mut self, pts: i64) -> Option<i64> {
        if self.delay == 0 {
            return Some(pts);
        }
        let at = self.pending.partition_point(|&v| v <= pts);
        self.pending.insert(at, pts);
        if self.pending.len() > self.delay as usize {
            return self.pending.pop_front();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// I P B B P B B, 每帧 3000
    const IPBB: [i64; 7] = [0, 9000, 3000, 6000, 18000, 12000, 15000];

    #[test]
    fn test_估计延迟() {
        assert_eq!(guess_delay_from_pts(&[0, 3000, 6000, 9000]), 0);
        assert_eq!(guess_delay_from_pts(&IPBB), 1);
        // I P b B b (金字塔 B 帧)
        assert_eq!(guess_delay_from_pts(&[0, 12000, 6000, 3000, 9000]), 2);
        assert_eq!(guess_delay_from_pts(&[]), 0);
    }

    #[test]
    fn test_生成_dts_不晚于_pts() {
        let dts = guess_dts_from_pts(1, &IPBB);
        assert_eq!(dts, vec![-3000, 0, 3000, 6000, 9000, 12000, 15000]);
        assert!(dts.iter().zip(IPBB.iter()).all(|(d, p)| d <= p));
        assert!(dts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(guess_dts_from_pts(0, &[0, 3000]), vec![0, 3000]);
    }

    #[test]
    fn test_队列逐包补全() {
        let dts = guess_dts_from_pts(1, &IPBB);
        assert_eq!(dts.len(), IPBB.len());
        let mut queue = DtsQueue::new(1);
        queue.seed(&IPBB);
        assert_eq!(queue.len(), 1);
        // 下一个 GOP: P B B
        let next: Vec<Option<i64>> = [27000, 21000, 24000]
            .into_iter()
            .map(|pts| queue.push(pts))
            .collect();
        assert_eq!(next, vec![Some(18000), Some(21000), Some(24000)]);
    }

    #[test]
    fn test_队列未填满时不给出_dts() {
        let mut queue = DtsQueue::new(2);
        assert_eq!(queue.push(6000), None);
        assert_eq!(queue.push(0), None);
        assert_eq!(queue.push(3000), Some(0));
        assert!(!queue.is_empty());
        queue.clear();
        assert!(queue.is_empty());

        let mut passthrough = DtsQueue::new(0);
        assert_eq!(passthrough.push(42), Some(42));
    }
}
