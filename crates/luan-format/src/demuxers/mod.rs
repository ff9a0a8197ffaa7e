//! 内置解封装器.

pub mod flv;
pub mod mpegts;

use crate::format_id::FormatId;
use crate::registry::FormatRegistry;

/// 注册所有内置解封装器及其格式探测器
pub fn register_all_demuxers(registry: &mut FormatRegistry) {
    registry.register_demuxer(FormatId::Flv, "flv", flv::FlvDemuxer::create);
    registry.register_probe(Box::new(flv::FlvProbe));

    registry.register_demuxer(FormatId::MpegTs, "mpegts", mpegts::TsDemuxer::create);
    registry.register_probe(Box::new(mpegts::TsProbe));
}
