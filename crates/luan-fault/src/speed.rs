//! 全局速度缩放变换器.
//!
//! 在重封装循环开始之前, 用目标时长与容器总时长算出一个全局缩放
//! 因子, 此后对每一个数据包的 PTS/DTS 做乘法缩放. 数据包的时长字段
//! 保持原样 —— 时间戳与时长由此产生的不一致正是本工具要制造的缺陷.
//!
//! 因子经由双精度浮点计算并向下取整 (floor), 与原始工具保持一致.

use log::info;
use luan_codec::Packet;
use luan_core::timestamp::NOPTS_VALUE;
use luan_core::{LuanError, LuanResult};

/// 速度缩放变换器
#[derive(Debug, Clone, Copy)]
pub struct SpeedScaler {
    /// 全局缩放因子 = 目标时长 / 容器时长
    scale: f64,
}

impl SpeedScaler {
    /// 由目标时长与容器时长构造
    ///
    /// # 参数
    /// - `target_secs`: 目标时长 (秒, 必须 > 0, 由计划层保证)
    /// - `input_secs`: 容器总时长 (秒), `None` 表示容器未携带
    ///
    /// # 错误
    /// 容器时长未知或不为正时无法得到有限的缩放因子, 返回 `Unsupported`.
    pub fn from_durations(target_secs: i64, input_secs: Option<f64>) -> LuanResult<Self> {
        let input_secs = input_secs.ok_or_else(|| {
            LuanError::Unsupported("speed 方法要求容器携带总时长信息".into())
        })?;
        if !input_secs.is_finite() || input_secs <= 0.0 {
            return Err(LuanError::Unsupported(format!(
                "容器时长无效 ({input_secs}s), 无法计算缩放因子"
            )));
        }

        let scale = target_secs as f64 / input_secs;
        info!("speed: 容器时长 {input_secs:.3}s → 目标 {target_secs}s, 缩放因子 {scale:.6}");
        Ok(Self { scale })
    }

    /// 全局缩放因子
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// 对已换算到输出时间基的数据包应用缩放
    ///
    /// `new_ts = floor(old_ts * scale)`; 未定义的时间戳保持未定义;
    /// 时长字段不参与缩放.
    pub fn apply(&self, packet: &mut Packet) {
        if packet.pts != NOPTS_VALUE {
            packet.pts = (packet.pts as f64 * self.scale).floor() as i64;
        }
        if packet.dts != NOPTS_VALUE {
            packet.dts = (packet.dts as f64 * self.scale).floor() as i64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet(pts: i64, dts: i64, duration: i64) -> Packet {
        let mut pkt = Packet::from_data(vec![0u8; 4]);
        pkt.pts = pts;
        pkt.dts = dts;
        pkt.duration = duration;
        pkt
    }

    #[test]
    fn test_因子计算() {
        let scaler = SpeedScaler::from_durations(5, Some(10.0)).unwrap();
        assert!((scaler.scale() - 0.5).abs() < f64::EPSILON);

        let scaler = SpeedScaler::from_durations(20, Some(10.0)).unwrap();
        assert!((scaler.scale() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_时长未知报错() {
        assert!(matches!(
            SpeedScaler::from_durations(5, None),
            Err(LuanError::Unsupported(_))
        ));
    }

    #[test]
    fn test_时长为零或非法报错() {
        assert!(SpeedScaler::from_durations(5, Some(0.0)).is_err());
        assert!(SpeedScaler::from_durations(5, Some(-3.0)).is_err());
        assert!(SpeedScaler::from_durations(5, Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_缩放向下取整() {
        let scaler = SpeedScaler::from_durations(1, Some(2.0)).unwrap(); // 0.5
        let mut pkt = make_packet(3, 1, 40);
        scaler.apply(&mut pkt);
        // 3 * 0.5 = 1.5 → floor → 1; 1 * 0.5 = 0.5 → floor → 0
        assert_eq!(pkt.pts, 1);
        assert_eq!(pkt.dts, 0);
    }

    #[test]
    fn test_时长字段不受缩放影响() {
        let scaler = SpeedScaler::from_durations(1, Some(2.0)).unwrap();
        let mut pkt = make_packet(100, 100, 40);
        scaler.apply(&mut pkt);
        assert_eq!(pkt.pts, 50);
        assert_eq!(pkt.duration, 40, "时长字段必须保持原样");
    }

    #[test]
    fn test_未定义时间戳保持未定义() {
        let scaler = SpeedScaler::from_durations(2, Some(1.0)).unwrap();
        let mut pkt = make_packet(NOPTS_VALUE, NOPTS_VALUE, 0);
        scaler.apply(&mut pkt);
        assert_eq!(pkt.pts, NOPTS_VALUE);
        assert_eq!(pkt.dts, NOPTS_VALUE);
    }

    #[test]
    fn test_负时间戳向下取整() {
        let scaler = SpeedScaler::from_durations(1, Some(2.0)).unwrap();
        let mut pkt = make_packet(-3, -3, 0);
        scaler.apply(&mut pkt);
        // -3 * 0.5 = -1.5 → floor → -2
        assert_eq!(pkt.pts, -2);
    }
}
