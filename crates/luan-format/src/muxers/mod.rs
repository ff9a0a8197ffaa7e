//! 内置封装器.

pub mod flv;
pub mod mpegts;

use crate::format_id::FormatId;
use crate::registry::FormatRegistry;

/// 注册所有内置封装器
pub fn register_all_muxers(registry: &mut FormatRegistry) {
    registry.register_muxer(FormatId::Flv, "flv", flv::FlvMuxer::create);
    registry.register_muxer(FormatId::MpegTs, "mpegts", mpegts::MpegTsMuxer::create);
}
