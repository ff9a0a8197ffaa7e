//! FLV 测试数据构造.

/// FLV 文件头部 + PreviousTagSize0
pub fn build_flv_header(has_audio: bool, has_video: bool) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"FLV");
    data.push(1); // version
    let flags = if has_audio { 0x04 } else { 0 } | if has_video { 0x01 } else { 0 };
    data.push(flags);
    data.extend_from_slice(&9u32.to_be_bytes()); // data offset
    data.extend_from_slice(&0u32.to_be_bytes()); // PreviousTagSize0
    data
}

/// Tag 头部 (11 字节) + 数据 + PreviousTagSize
pub fn build_tag(tag_type: u8, timestamp: u32, tag_data: &[u8]) -> Vec<u8> {
    let mut tag = Vec::new();
    let data_size = tag_data.len() as u32;
    tag.push(tag_type);
    tag.push((data_size >> 16) as u8);
    tag.push((data_size >> 8) as u8);
    tag.push(data_size as u8);
    tag.push((timestamp >> 16) as u8);
    tag.push((timestamp >> 8) as u8);
    tag.push(timestamp as u8);
    tag.push((timestamp >> 24) as u8); // timestamp extended
    tag.extend_from_slice(&[0, 0, 0]); // stream ID
    tag.extend_from_slice(tag_data);
    tag.extend_from_slice(&(11 + data_size).to_be_bytes());
    tag
}

/// AAC raw 音频 Tag (0xAF = AAC/44kHz/16bit/stereo)
pub fn build_audio_tag(timestamp: u32, payload: &[u8]) -> Vec<u8> {
    let mut tag_data = vec![0xAF, 1];
    tag_data.extend_from_slice(payload);
    build_tag(8, timestamp, &tag_data)
}

/// AVC NALU 视频 Tag
pub fn build_video_tag(timestamp: u32, is_keyframe: bool, cts: i32, payload: &[u8]) -> Vec<u8> {
    let frame_type: u8 = if is_keyframe { 1 } else { 2 };
    let mut tag_data = vec![(frame_type << 4) | 7, 1]; // CodecID=7 (AVC), NALU
    let cts_bytes = cts.to_be_bytes();
    tag_data.extend_from_slice(&cts_bytes[1..4]);
    tag_data.extend_from_slice(payload);
    build_tag(9, timestamp, &tag_data)
}

/// 带 duration 的 onMetaData Script Tag
pub fn build_metadata_tag(duration_secs: f64) -> Vec<u8> {
    let mut amf = Vec::new();
    amf.extend_from_slice(b"onMetaData");
    amf.extend_from_slice(b"duration");
    amf.push(0x00); // AMF0 Number
    amf.extend_from_slice(&duration_secs.to_bits().to_be_bytes());
    build_tag(18, 0, &amf)
}
