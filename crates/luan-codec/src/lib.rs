//! # luan-codec
//!
//! Luan 编解码器标识与 Packet 抽象.
//!
//! 本 crate 对标 FFmpeg libavcodec 中与封装层相关的部分:
//! 重封装工具不解码任何码流, 只需要识别编解码器种类并搬运压缩数据包,
//! 因此这里只保留 `CodecId` 与 `Packet` 两个抽象.

pub mod codec_id;
pub mod packet;

// 重导出常用类型
pub use codec_id::CodecId;
pub use packet::Packet;
