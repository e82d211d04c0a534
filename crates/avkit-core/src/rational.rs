//! 有理数类型, 用于时间基 (time_base)、帧率、宽高比.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 时间基 1/90000 表示 90kHz 时钟, 帧率 30000/1001 表示 29.97fps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

/// 探测阶段会把估算出的帧率吸附到这些常见值上
const STANDARD_FRAME_RATES: [(i32, i32); 13] = [
    (24000, 1001),
    (24, 1),
    (25, 1),
    (30000, 1001),
    (30, 1),
    (48, 1),
    (50, 1),
    (60000, 1001),
    (60, 1),
    (12, 1),
    (15, 1),
    (100, 1),
    (120, 1),
];

impl Rational {
    /// 创建新的有理数
    ///
    /// # 参数
    /// - `num`: 分子
    /// - `den`: 分母 (为 0 时表示未定义)
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 零值
    pub const ZERO: Self = Self { num: 0, den: 1 };

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 微秒时间基, 选择器比较解码时间时使用
    pub const MICRO: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    /// 毫秒时间基, 引擎对外的 seek 时间单位
    pub const MILLI: Self = Self { num: 1, den: 1_000 };

    /// 判断是否有效 (分母不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// 分子分母均非 0
    pub const fn is_nonzero(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// 转换为 f64, 分母为 0 时返回 `f64::NAN`
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 用连分数逼近一个浮点数, 分子分母的绝对值都不超过 `max`
    ///
    /// NaN 返回 [`Rational::UNDEFINED`], 无穷大返回 `±1/0`.
    pub fn from_f64(value: f64, max: i32) -> Self {
        if value.is_nan() {
            return Self::UNDEFINED;
        }
        if value.is_infinite() {
            return Self::new(if value > 0.0 { 1 } else { -1 }, 0);
        }
        let sign: i64 = if value < 0.0 { -1 } else { 1 };
        let limit = i64::from(max.max(1));
        let mut x = value.abs();
        if x > limit as f64 {
            return Self::new((sign * limit) as i32, 1);
        }

        // 收敛子 p/q 的前两项
        let (mut p0, mut q0, mut p1, mut q1) = (0i64, 1i64, 1i64, 0i64);
        for _ in 0..64 {
            let a = x.floor() as i64;
            let p2 = a * p1 + p0;
            let q2 = a * q1 + q0;
            if p2 > limit || q2 > limit {
                break;
            }
            (p0, q0, p1, q1) = (p1, q1, p2, q2);
            let frac = x - a as f64;
            if frac < 1e-12 {
                break;
            }
            x = 1.0 / frac;
        }
        if q1 == 0 {
            return Self::new((sign * limit) as i32, 1);
        }
        Self::new((sign * p1) as i32, q1 as i32)
    }

    /// 把接近常见帧率的值吸附到该帧率 (相对误差小于 0.1%)
    pub fn snap_to_standard_frame_rate(self) -> Self {
        if !self.is_nonzero() {
            return self;
        }
        let value = self.to_f64();
        STANDARD_FRAME_RATES
            .iter()
            .map(|&(num, den)| Self::new(num, den))
            .find(|rate| ((rate.to_f64() - value) / rate.to_f64()).abs() < 0.001)
            .unwrap_or(self)
    }

    /// 对有理数进行约分
    pub fn reduce(self) -> Self {
        if self.den == 0 {
            return self;
        }
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs());
        if g == 0 {
            return self;
        }
        let g = g as i32;
        // 保证分母为正
        let sign = if self.den < 0 { -1 } else { 1 };
        Self {
            num: sign * self.num / g,
            den: sign * self.den / g,
        }
    }

    /// 求倒数
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl std::ops::Mul for Rational {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        let num = i64::from(self.num) * i64::from(other.num);
        let den = i64::from(self.den) * i64::from(other.den);
        let g = gcd64(num.unsigned_abs(), den.unsigned_abs()).max(1) as i64;
        Self {
            num: (num / g) as i32,
            den: (den / g) as i32,
        }
        .reduce()
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self { num, den }
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn gcd64(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
