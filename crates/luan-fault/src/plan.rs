//! 故障注入计划: 方法选择与参数校验.
//!
//! 把用户给出的方法名和目标时长一次性校验为不可变的 [`FaultPlan`],
//! 校验全部通过之前不做任何 I/O; 任何一项不合法都不会产生半成品计划.

use luan_core::{LuanError, LuanResult, MediaType};

/// 默认视频流扣留配额
pub const DEFAULT_VIDEO_QUOTA: usize = 3;
/// 默认音频流扣留配额
pub const DEFAULT_AUDIO_QUOTA: usize = 1;

/// 故障注入方法
///
/// 每次运行恰好激活一种方法.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMethod {
    /// 扣留视频流的前若干个数据包, 末尾以偏移时间戳重注入
    Video,
    /// 同上, 作用于音频流
    Audio,
    /// 同时作用于视频流和音频流
    Both,
    /// 对所有数据包按全局因子缩放时间戳
    Speed,
}

impl FaultMethod {
    /// 从方法名解析 (大小写敏感, 精确匹配)
    pub fn parse(s: &str) -> LuanResult<Self> {
        match s {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "both" => Ok(Self::Both),
            "speed" => Ok(Self::Speed),
            _ => Err(LuanError::InvalidArgument(format!(
                "未知的故障方法 '{s}' (可选: video, audio, both, speed)"
            ))),
        }
    }

    /// 方法名
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Both => "both",
            Self::Speed => "speed",
        }
    }

    /// 该方法是否以指定媒体类型的流为扣留目标
    ///
    /// speed 方法不扣留任何流 (它作用于全部数据包).
    pub fn targets(&self, media_type: MediaType) -> bool {
        match self {
            Self::Video => media_type == MediaType::Video,
            Self::Audio => media_type == MediaType::Audio,
            Self::Both => matches!(media_type, MediaType::Video | MediaType::Audio),
            Self::Speed => false,
        }
    }
}

/// 故障注入计划 (不可变)
///
/// 由 [`FaultPlan::new`] 一次性校验构造, 此后只读.
#[derive(Debug, Clone)]
pub struct FaultPlan {
    method: FaultMethod,
    /// 目标时长 (整数秒)
    duration_secs: i64,
    video_quota: usize,
    audio_quota: usize,
}

impl FaultPlan {
    /// 用默认配额构造计划
    ///
    /// # 错误
    /// - 未知方法名 → `InvalidArgument`
    /// - 时长为负 → `InvalidArgument`
    /// - speed 方法下时长为 0 → `InvalidArgument` (缩放因子会退化)
    pub fn new(method: &str, duration_secs: i64) -> LuanResult<Self> {
        Self::with_quotas(
            method,
            duration_secs,
            DEFAULT_VIDEO_QUOTA,
            DEFAULT_AUDIO_QUOTA,
        )
    }

    /// 用显式配额构造计划
    pub fn with_quotas(
        method: &str,
        duration_secs: i64,
        video_quota: usize,
        audio_quota: usize,
    ) -> LuanResult<Self> {
        let method = FaultMethod::parse(method)?;
        if duration_secs < 0 {
            return Err(LuanError::InvalidArgument(format!(
                "时长不能为负: {duration_secs}"
            )));
        }
        if method == FaultMethod::Speed && duration_secs == 0 {
            return Err(LuanError::InvalidArgument(
                "speed 方法要求时长大于 0".into(),
            ));
        }
        Ok(Self {
            method,
            duration_secs,
            video_quota,
            audio_quota,
        })
    }

    /// 选定的方法
    pub fn method(&self) -> FaultMethod {
        self.method
    }

    /// 目标时长 (秒)
    pub fn duration_secs(&self) -> i64 {
        self.duration_secs
    }

    /// 指定媒体类型流的扣留配额; 非目标流返回 None
    pub fn quota_for(&self, media_type: MediaType) -> Option<usize> {
        if !self.method.targets(media_type) {
            return None;
        }
        match media_type {
            MediaType::Video => Some(self.video_quota),
            MediaType::Audio => Some(self.audio_quota),
            _ => None,
        }
    }
}
