//! 解封装器 (Demuxer) trait 定义.
//!
//! 对标 FFmpeg 的 `AVInputFormat`, 定义了从容器格式中读取数据包的接口.
//! 重封装是线性单遍读取, 不需要定位能力.

use luan_codec::Packet;
use luan_core::LuanResult;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 从容器格式中读取压缩数据包. 所有格式的解封装器都实现此 trait.
///
/// 使用流程:
/// 1. 调用 `open()` 打开容器并解析头部
/// 2. 调用 `streams()` 获取流信息
/// 3. 循环调用 `read_packet()` 读取数据包, 直到 `Err(LuanError::Eof)`
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 打开容器并解析头部信息
    ///
    /// 读取容器头部, 解析出所有流的信息.
    fn open(&mut self, io: &mut IoContext) -> LuanResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(LuanError::Eof)`: 已到达文件末尾 (唯一的正常终止信号)
    fn read_packet(&mut self, io: &mut IoContext) -> LuanResult<Packet>;

    /// 获取容器时长 (秒), None 表示未知
    ///
    /// speed 故障方法依赖此值计算全局缩放因子.
    fn duration(&self) -> Option<f64>;
}
