//! 封装器 (Muxer) trait 定义.
//!
//! 对标 FFmpeg 的 `AVOutputFormat`, 定义了将数据包写入容器格式的接口.

use luan_codec::Packet;
use luan_core::LuanResult;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 封装器 trait
///
/// 将压缩数据包写入容器格式. 所有格式的封装器都实现此 trait.
///
/// 使用流程:
/// 1. 配置输出流信息
/// 2. 调用 `write_header()` 写入容器头部
/// 3. 循环调用 `write_packet()` 写入数据包
/// 4. 调用 `write_trailer()` 写入容器尾部并完成封装
pub trait Muxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 写入容器头部
    ///
    /// # 参数
    /// - `streams`: 输出流信息列表
    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> LuanResult<()>;

    /// 写入一个数据包
    ///
    /// 封装器按数据包自带的时间戳写入, 不做任何单调性检查 —
    /// 产生非规范的时间元数据正是上层工具的目的.
    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> LuanResult<()>;

    /// 写入容器尾部, 完成封装
    fn write_trailer(&mut self, io: &mut IoContext) -> LuanResult<()>;
}
