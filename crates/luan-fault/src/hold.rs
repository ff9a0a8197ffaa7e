//! 选择性数据包扣留器.
//!
//! 对目标角色 (视频/音频/两者) 的每条流, 拦截按读取顺序数起的前
//! *配额* 个数据包: 克隆一份副本, 把副本的 PTS/DTS 整体前移
//! "目标时长" (换算到该流输出时间基的 tick 数) 后放入扣留缓冲;
//! 原数据包不加改动地留在实时输出流中, 保证主时间线局部单调.
//!
//! 每条流的状态机: `Counting (seen < quota)` → `Passthrough`.
//! 计数只看本流自己的读取顺序, 与其他流的交错无关.
//!
//! 输入耗尽后、写容器尾部之前, 扣留缓冲按流索引顺序、流内按
//! 原始扣留顺序一次性冲洗到输出 —— 损坏的副本落在文件逻辑末尾,
//! 其时间戳相对已写出的正常数据指向过去或空洞, 从而制造
//! 时长/检索表不一致.

use log::debug;
use luan_codec::Packet;
use luan_core::timestamp::{NOPTS_VALUE, rescale_q};
use luan_core::{LuanResult, Rational};
use std::collections::HashMap;

use luan_format::Stream;

use crate::plan::FaultPlan;

/// 单条目标流的扣留状态
struct StreamHold {
    /// 扣留配额
    quota: usize,
    /// 已计数的数据包数 (seen == quota 后进入直通状态)
    seen: usize,
    /// 扣留缓冲, 按扣留顺序排列
    held: Vec<Packet>,
    /// 时间戳前移量 (目标时长换算到输出时间基的 tick 数)
    shift_ticks: i64,
}

/// 选择性数据包扣留器
pub struct HoldBackCorruptor {
    /// 流索引 → 扣留状态 (只包含目标流)
    holds: HashMap<usize, StreamHold>,
    /// 冲洗顺序: 目标流索引升序
    flush_order: Vec<usize>,
}

impl HoldBackCorruptor {
    /// 按计划为输出流列表构造扣留器
    ///
    /// 只有计划的目标角色流会建立扣留状态, 其余流全程直通.
    pub fn new(plan: &FaultPlan, output_streams: &[Stream]) -> Self {
        let mut holds = HashMap::new();
        let mut flush_order = Vec::new();

        for stream in output_streams {
            let Some(quota) = plan.quota_for(stream.media_type) else {
                continue;
            };
            // 目标时长 (秒) → 该流输出时间基的 tick 数
            let shift_ticks = rescale_q(
                plan.duration_secs(),
                Rational::new(1, 1),
                stream.time_base,
            );
            debug!(
                "hold: 流 #{} ({}) 配额={} 前移={} ticks",
                stream.index, stream.media_type, quota, shift_ticks
            );
            holds.insert(
                stream.index,
                StreamHold {
                    quota,
                    seen: 0,
                    held: Vec::with_capacity(quota),
                    shift_ticks,
                },
            );
            flush_order.push(stream.index);
        }
        flush_order.sort_unstable();

        Self { holds, flush_order }
    }

    /// 处理一个已换算到输出时间基的数据包
    ///
    /// 若该包被计数, 克隆出扣留副本并前移其时间戳; 调用方随后把
    /// *原样未动* 的数据包写入实时输出.
    pub fn process(&mut self, packet: &Packet) {
        let Some(hold) = self.holds.get_mut(&packet.stream_index) else {
            return; // 非目标流
        };
        if hold.seen >= hold.quota {
            return; // Passthrough 状态
        }
        hold.seen += 1;

        let mut held = packet.clone();
        if held.pts != NOPTS_VALUE {
            held.pts += hold.shift_ticks;
        }
        if held.dts != NOPTS_VALUE {
            held.dts += hold.shift_ticks;
        }
        debug!(
            "hold: 流 #{} 扣留第 {}/{} 个包, pts {} → {}",
            packet.stream_index, hold.seen, hold.quota, packet.pts, held.pts
        );
        hold.held.push(held);
    }

    /// 当前扣留的数据包总数
    pub fn held_count(&self) -> usize {
        self.holds.values().map(|h| h.held.len()).sum()
    }

    /// 输入耗尽后冲洗全部扣留包
    ///
    /// 按流索引顺序、流内按原始扣留顺序逐包交给 `write` 回调;
    /// 每个包写出后立即释放. 回调返回错误时中止剩余冲洗.
    pub fn flush(
        &mut self,
        mut write: impl FnMut(&Packet) -> LuanResult<()>,
    ) -> LuanResult<usize> {
        let mut flushed = 0usize;
        for &stream_index in &self.flush_order {
            let Some(hold) = self.holds.get_mut(&stream_index) else {
                continue;
            };
            for pkt in hold.held.drain(..) {
                write(&pkt)?;
                flushed += 1;
            }
        }
        Ok(flushed)
    }
}
