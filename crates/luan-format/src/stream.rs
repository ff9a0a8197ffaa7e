//! 流信息定义.
//!
//! 对标 FFmpeg 的 `AVStream`, 描述容器中的一条音视频流.
//! 重封装按枚举顺序将输入流一一映射为输出流, 流索引在输入输出两侧保持一致.

use luan_codec::CodecId;
use luan_core::{MediaType, Rational};

/// 流信息
///
/// 描述容器格式中的一条流 (视频流/音频流等).
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (在容器中的位置, 从 0 开始)
    pub index: usize,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 时间基
    pub time_base: Rational,
    /// 流时长 (以 time_base 为单位, -1 表示未知)
    pub duration: i64,
    /// 起始时间 (以 time_base 为单位)
    pub start_time: i64,
    /// 编解码器私有数据 (extradata, 如 AVC 配置记录)
    pub extra_data: Vec<u8>,
    /// 流特定参数
    pub params: StreamParams,
}

/// 流特定参数
#[derive(Debug, Clone)]
pub enum StreamParams {
    /// 视频流参数
    Video(VideoStreamParams),
    /// 音频流参数
    Audio(AudioStreamParams),
    /// 其他
    Other,
}

/// 视频流参数
#[derive(Debug, Clone)]
pub struct VideoStreamParams {
    /// 宽度 (像素, 0 表示未知)
    pub width: u32,
    /// 高度 (像素, 0 表示未知)
    pub height: u32,
    /// 帧率 (可能是平均帧率, 0/1 表示未知)
    pub frame_rate: Rational,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
}

/// 音频流参数
#[derive(Debug, Clone)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
    /// 每帧采样数 (如 AAC 为 1024)
    pub frame_size: u32,
}
