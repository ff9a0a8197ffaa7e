//! 压缩数据包 (Packet).
//!
//! 对标 FFmpeg 的 `AVPacket`, 表示从容器格式中读取的一帧压缩数据.
//! 重封装管线中 Packet 是瞬态值: 由解封装器产出, 由核心就地改写时间戳
//! (或克隆出一份扣留副本), 再由封装器消费. 只有扣留缓冲中的副本
//! 会跨越单次循环迭代存活.

use bytes::Bytes;
use luan_core::Rational;

/// 压缩数据包
///
/// 从容器格式中读取的一帧压缩数据. 负载与边带数据均为不可变字节块,
/// `clone()` 产生的两个句柄各自独立持有、独立释放 (引用计数),
/// 改写一个副本的时间戳字段不会影响另一个副本.
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据 (不透明负载, 核心从不检视其内容)
    pub data: Bytes,
    /// 边带数据 (如流中途更新的编解码器配置), 无则为 None
    pub side_data: Option<Bytes>,
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
    /// 是否为关键帧
    pub is_keyframe: bool,
    /// 在容器中的字节偏移量 (-1 表示未知)
    pub pos: i64,
}

impl Packet {
    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            side_data: None,
            pts: luan_core::timestamp::NOPTS_VALUE,
            dts: luan_core::timestamp::NOPTS_VALUE,
            duration: 0,
            time_base: Rational::UNDEFINED,
            stream_index: 0,
            is_keyframe: false,
            pos: -1,
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

    /// 是否为空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luan_core::timestamp::NOPTS_VALUE;

    #[test]
    fn test_空包默认值() {
        let pkt = Packet::empty();
        assert_eq!(pkt.pts, NOPTS_VALUE);
        assert_eq!(pkt.dts, NOPTS_VALUE);
        assert_eq!(pkt.pos, -1);
        assert!(pkt.side_data.is_none());
        assert!(pkt.is_empty());
    }

    #[test]
    fn test_克隆副本独立改写() {
        let mut live = Packet::from_data(vec![1u8, 2, 3]);
        live.pts = 100;
        live.dts = 90;
        live.side_data = Some(Bytes::from_static(&[0xAB]));

        let mut held = live.clone();
        held.pts += 5000;
        held.dts += 5000;

        // 时间戳各自独立, 数据句柄指向同一字节块
        assert_eq!(live.pts, 100);
        assert_eq!(held.pts, 5100);
        assert_eq!(live.data, held.data);
        assert_eq!(live.side_data, held.side_data);

        // 释放一个副本不影响另一个
        drop(live);
        assert_eq!(held.size(), 3);
    }
}
