//! 重封装会话: 读取 → 换算 → 分发 → 写出.
//!
//! 策略无关的主循环: 从输入逐包读取, 把时间戳换算到输出流的
//! 时间基, 交给当前激活的唯一策略处理, 再写入输出. 每次运行
//! 恰好激活 {速度缩放, 选择性扣留} 之一, 由计划层选定.
//!
//! 终止与收尾:
//! - `Eof` 是唯一的正常终止信号, 触发扣留缓冲冲洗 + 尾部写入;
//! - 任何读/写故障立即中止循环和剩余冲洗, 但尾部写入与资源
//!   回收仍尽力执行, 让半成品输出尽可能完整; 首个错误保留上抛.

use log::{debug, info, trace, warn};
use luan_codec::Packet;
use luan_core::timestamp::rescale_rnd;
use luan_core::{LuanError, LuanResult, Timestamp};
use luan_format::{Demuxer, IoContext, Muxer, Stream};

use crate::hold::HoldBackCorruptor;
use crate::plan::{FaultMethod, FaultPlan};
use crate::speed::SpeedScaler;

/// 单次重封装运行的统计
#[derive(Debug, Default, Clone, Copy)]
pub struct RemuxStats {
    /// 写出的数据包数 (含扣留重注入)
    pub packets_written: u64,
    /// 写出的负载字节数
    pub bytes_written: u64,
    /// 末尾重注入的扣留包数
    pub held_back: u64,
}

/// 激活的故障策略 (每次运行恰好一个)
enum ActiveFault {
    Speed(SpeedScaler),
    Hold(HoldBackCorruptor),
}

/// 执行一次完整的重封装+故障注入
///
/// 输出流按输入流枚举顺序一一克隆, 流索引在两侧保持一致
/// (实现捷径, 此处显式断言而非逐包重推导).
pub fn run(
    demuxer: &mut dyn Demuxer,
    input_io: &mut IoContext,
    muxer: &mut dyn Muxer,
    output_io: &mut IoContext,
    plan: &FaultPlan,
) -> LuanResult<RemuxStats> {
    let input_streams: Vec<Stream> = demuxer.streams().to_vec();
    if input_streams.is_empty() {
        return Err(LuanError::InvalidData("输入文件中没有找到任何流".into()));
    }

    // 输出流 = 输入流按序克隆 (流参数直接复制, 不转码)
    let output_streams = input_streams.clone();
    for (i, stream) in output_streams.iter().enumerate() {
        if stream.index != i {
            return Err(LuanError::Internal(format!(
                "流索引不一致: 第 {i} 条流的索引为 {}",
                stream.index
            )));
        }
    }

    // 选定唯一的激活策略; speed 的缩放因子在循环开始前一次算出
    let mut fault = match plan.method() {
        FaultMethod::Speed => {
            ActiveFault::Speed(SpeedScaler::from_durations(
                plan.duration_secs(),
                demuxer.duration(),
            )?)
        }
        _ => ActiveFault::Hold(HoldBackCorruptor::new(plan, &output_streams)),
    };

    muxer.write_header(output_io, &output_streams)?;
    info!(
        "开始重封装: {} 条流, 方法 {}",
        output_streams.len(),
        plan.method().name()
    );

    let mut stats = RemuxStats::default();
    // 首个致命错误; Eof 不算
    let mut failure: Option<LuanError> = None;

    loop {
        let mut packet = match demuxer.read_packet(input_io) {
            Ok(pkt) => pkt,
            Err(LuanError::Eof) => break,
            Err(e) => {
                warn!("读取数据包失败: {e}");
                failure = Some(e);
                break;
            }
        };

        let idx = packet.stream_index;
        if idx >= input_streams.len() {
            debug!("丢弃未知流 #{idx} 的数据包");
            continue;
        }
        let in_stream = &input_streams[idx];
        let out_stream = &output_streams[idx];

        trace!(
            "in:  流 #{idx} pts={} dts={} dur={}",
            Timestamp::new(packet.pts, in_stream.time_base),
            Timestamp::new(packet.dts, in_stream.time_base),
            packet.duration
        );

        // 换算到输出流时间基; 文件位置在新容器中无意义, 清除
        packet.pts = rescale_rnd(packet.pts, in_stream.time_base, out_stream.time_base);
        packet.dts = rescale_rnd(packet.dts, in_stream.time_base, out_stream.time_base);
        packet.duration =
            luan_core::timestamp::rescale_q(packet.duration, in_stream.time_base, out_stream.time_base);
        packet.time_base = out_stream.time_base;
        packet.pos = -1;

        // 单一分发点: 策略处理
        match fault {
            ActiveFault::Speed(ref scaler) => scaler.apply(&mut packet),
            ActiveFault::Hold(ref mut corruptor) => corruptor.process(&packet),
        }

        trace!(
            "out: 流 #{idx} pts={} dts={} dur={}",
            Timestamp::new(packet.pts, out_stream.time_base),
            Timestamp::new(packet.dts, out_stream.time_base),
            packet.duration
        );

        if let Err(e) = muxer.write_packet(output_io, &packet) {
            warn!("写入数据包失败: {e}");
            failure = Some(e);
            break;
        }
        stats.packets_written += 1;
        stats.bytes_written += packet.size() as u64;
    }

    // 正常到达流末尾: 在尾部之前冲洗扣留缓冲
    if failure.is_none() {
        if let ActiveFault::Hold(ref mut corruptor) = fault {
            let result = corruptor.flush(|pkt: &Packet| {
                muxer.write_packet(output_io, pkt)?;
                stats.packets_written += 1;
                stats.bytes_written += pkt.size() as u64;
                stats.held_back += 1;
                Ok(())
            });
            if let Err(e) = result {
                warn!("冲洗扣留数据包失败: {e}");
                failure = Some(e);
            }
        }
    }

    // 尾部写入尽力而为, 即便之前已经失败
    if let Err(e) = muxer.write_trailer(output_io) {
        if failure.is_none() {
            failure = Some(e);
        } else {
            warn!("写入尾部失败 (已有先前错误): {e}");
        }
    }

    match failure {
        Some(e) => Err(e),
        None => {
            info!(
                "重封装完成: {} 个数据包, {} 字节, 其中末尾重注入 {} 个",
                stats.packets_written, stats.bytes_written, stats.held_back
            );
            Ok(stats)
        }
    }
}
