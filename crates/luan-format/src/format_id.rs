//! 容器格式标识符.
//!
//! 对标 FFmpeg 的输入/输出格式名称. 重封装要求输出容器与输入容器
//! 结构一致, 因此只保留同时具备解封装器和封装器的格式.

use std::fmt;

/// 容器格式标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// Flash Video (FLV)
    Flv,
    /// MPEG Transport Stream (TS)
    MpegTs,
}

impl FormatId {
    /// 获取格式的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Flv => "flv",
            Self::MpegTs => "mpegts",
        }
    }

    /// 获取格式常用的文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Flv => &["flv"],
            Self::MpegTs => &["ts", "m2ts", "mts"],
        }
    }

    /// 所有已知格式标识的列表
    pub const ALL: &[FormatId] = &[Self::Flv, Self::MpegTs];

    /// 根据文件扩展名猜测格式
    ///
    /// # 参数
    /// - `ext`: 文件扩展名 (不含 `.`, 如 "flv", "ts")
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext_lower = ext.to_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.extensions().contains(&ext_lower.as_str()))
            .copied()
    }

    /// 从文件路径猜测格式
    pub fn from_filename(filename: &str) -> Option<FormatId> {
        let ext = filename.rsplit('.').next()?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
