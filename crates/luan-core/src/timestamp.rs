//! 时间戳类型与时间基换算.
//!
//! 对标 FFmpeg 中基于 `time_base` 的时间戳系统.
//!
//! 重封装路径对换算有两点额外要求 (`av_rescale_q_rnd` 的语义):
//! - 四舍五入采用"远离零"方向, 而非单纯截断;
//! - `NOPTS_VALUE` 等哨兵值原样传递, "未知"时间戳不能变成虚假的有限值.

use crate::rational::Rational;
use std::fmt;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 将时间戳从一个时间基换算到另一个时间基 (四舍五入, 远离零)
///
/// 哨兵值 (`NOPTS_VALUE` 和 `i64::MAX`) 原样传递, 不参与换算.
/// 任一时间基无效时返回 `NOPTS_VALUE`.
pub fn rescale_rnd(value: i64, from: Rational, to: Rational) -> i64 {
    if value == NOPTS_VALUE || value == i64::MAX {
        return value;
    }
    rescale_q(value, from, to)
}

/// 将数值从一个时间基换算到另一个时间基 (四舍五入, 远离零)
///
/// 不处理哨兵值, 适用于时长等保持量级的换算.
/// 通过 i128 交叉乘法避免中间溢出与浮点精度损失.
pub fn rescale_q(value: i64, from: Rational, to: Rational) -> i64 {
    if !from.is_valid() || !to.is_valid() {
        return NOPTS_VALUE;
    }
    let num = i128::from(value) * i128::from(from.num) * i128::from(to.den);
    let den = i128::from(from.den) * i128::from(to.num);
    if den == 0 {
        return NOPTS_VALUE;
    }
    let negative = (num < 0) != (den < 0);
    let (n, d) = (num.unsigned_abs(), den.unsigned_abs());
    let q = (n + d / 2) / d;
    let q = q as i64;
    if negative { -q } else { q }
}

/// 时间戳
///
/// 包含一个整数值和对应的时间基 (time_base).
/// 实际时间 (秒) = pts * time_base.num / time_base.den.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// 时间戳值, `NOPTS_VALUE` 表示未定义
    pub pts: i64,
    /// 时间基
    pub time_base: Rational,
}

impl Timestamp {
    /// 创建新的时间戳
    pub const fn new(pts: i64, time_base: Rational) -> Self {
        Self { pts, time_base }
    }

    /// 创建未定义的时间戳
    pub const fn none() -> Self {
        Self {
            pts: NOPTS_VALUE,
            time_base: Rational::UNDEFINED,
        }
    }

    /// 判断时间戳是否有效 (非 NOPTS_VALUE)
    pub const fn is_valid(&self) -> bool {
        self.pts != NOPTS_VALUE && self.time_base.is_valid()
    }

    /// 转换为秒 (f64)
    ///
    /// 无效时间戳返回 `f64::NAN`.
    pub fn to_seconds(&self) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        self.pts as f64 * self.time_base.to_f64()
    }

    /// 将时间戳重缩放到新的时间基
    pub fn rescale(&self, new_time_base: Rational) -> Self {
        if !self.is_valid() || !new_time_base.is_valid() {
            return Self::none();
        }
        Self {
            pts: rescale_rnd(self.pts, self.time_base, new_time_base),
            time_base: new_time_base,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "NOPTS")
        } else {
            write!(f, "{:.6}s", self.to_seconds())
        }
    }
}
