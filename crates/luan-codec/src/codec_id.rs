//! 编解码器标识符.
//!
//! 对标 FFmpeg 的 `AVCodecID`, 为每种编解码算法分配唯一标识.
//! 重封装不触碰码流内容, 标识只用于流参数复制和容器层映射.

use luan_core::MediaType;
use std::fmt;

/// 编解码器标识符
///
/// 唯一标识一种编解码算法, 与容器格式无关.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// H.264 / AVC / MPEG-4 Part 10
    H264,
    /// H.265 / HEVC / MPEG-H Part 2
    H265,
    /// AV1 (Alliance for Open Media)
    Av1,
    /// MPEG-1 Video
    Mpeg1Video,
    /// MPEG-2 Video
    Mpeg2Video,
    /// MPEG-4 Part 2 (ASP)
    Mpeg4,
    /// VP8
    Vp8,

    // ========================
    // 音频编解码器
    // ========================
    /// AAC (Advanced Audio Coding)
    Aac,
    /// MP3 (MPEG Audio Layer III)
    Mp3,
    /// AC-3 (Dolby Digital)
    Ac3,
    /// E-AC-3 (Dolby Digital Plus)
    Eac3,
    /// DTS
    Dts,
    /// Opus
    Opus,
    /// PCM 有符号 16 位小端
    PcmS16le,
    /// PCM 有符号 16 位大端
    PcmS16be,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::H264
            | Self::H265
            | Self::Av1
            | Self::Mpeg1Video
            | Self::Mpeg2Video
            | Self::Mpeg4
            | Self::Vp8 => MediaType::Video,
            Self::Aac
            | Self::Mp3
            | Self::Ac3
            | Self::Eac3
            | Self::Dts
            | Self::Opus
            | Self::PcmS16le
            | Self::PcmS16be => MediaType::Audio,
            Self::None => MediaType::Data,
        }
    }

    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Av1 => "av1",
            Self::Mpeg1Video => "mpeg1video",
            Self::Mpeg2Video => "mpeg2video",
            Self::Mpeg4 => "mpeg4",
            Self::Vp8 => "vp8",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::Dts => "dts",
            Self::Opus => "opus",
            Self::PcmS16le => "pcm_s16le",
            Self::PcmS16be => "pcm_s16be",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_媒体类型映射() {
        assert_eq!(CodecId::H264.media_type(), MediaType::Video);
        assert_eq!(CodecId::Aac.media_type(), MediaType::Audio);
        assert_eq!(CodecId::None.media_type(), MediaType::Data);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CodecId::H265), "hevc");
        assert_eq!(format!("{}", CodecId::Mp3), "mp3");
    }
}
