//! 时间戳与时间基换算.
//!
//! 所有 pts/dts 都是某个时间基下的 64 位整数刻度, [`NOPTS_VALUE`] 表示未知.

use crate::rational::Rational;
use std::fmt;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 把 `value` 从时间基 `from` 换算到时间基 `to`, 就近取整 (中点远离 0).
///
/// 通过 i128 交叉乘法避免溢出与浮点误差:
/// `value * from.num * to.den / (from.den * to.num)`.
/// `NOPTS_VALUE` 或无效时间基原样返回 `NOPTS_VALUE`.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    if value == NOPTS_VALUE || !from.is_valid() || !to.is_nonzero() {
        return NOPTS_VALUE;
    }
    let num = i128::from(value) * i128::from(from.num) * i128::from(to.den);
    let den = i128::from(from.den) * i128::from(to.num);
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };
    rounded.clamp(i128::from(i64::MIN + 1), i128::from(i64::MAX)) as i64
}

/// 带时间基的时间戳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// 时间戳值, `NOPTS_VALUE` 表示未定义
    pub value: i64,
    /// 时间基
    pub time_base: Rational,
}

impl Timestamp {
    pub const fn new(value: i64, time_base: Rational) -> Self {
        Self { value, time_base }
    }

    /// 创建未定义的时间戳
    pub const fn none() -> Self {
        Self {
            value: NOPTS_VALUE,
            time_base: Rational::UNDEFINED,
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.value != NOPTS_VALUE && self.time_base.is_valid()
    }

    /// 换算到毫秒, 无效时返回 `NOPTS_VALUE`
    pub fn to_millis(&self) -> i64 {
        rescale(self.value, self.time_base, Rational::MILLI)
    }

    /// 将时间戳重缩放到新的时间基
    pub fn rescale(&self, new_time_base: Rational) -> Self {
        if !self.is_valid() {
            return Self::none();
        }
        Self {
            value: rescale(self.value, self.time_base, new_time_base),
            time_base: new_time_base,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "NOPTS")
        } else {
            write!(f, "{}@{}", self.value, self.time_base)
        }
    }
}
