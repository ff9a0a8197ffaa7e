//! FLV (Flash Video) 容器解封装器.
//!
//! # FLV 文件结构
//! ```text
//! FLV Header (9 bytes):
//!   "FLV" (3 bytes)
//!   Version (1 byte, 通常 = 1)
//!   Flags (1 byte): bit0=video, bit2=audio
//!   DataOffset (4 bytes, BE): 头部大小 (通常 9)
//!
//! PreviousTagSize0 (4 bytes, BE): 0
//!
//! FLV Tag:
//!   TagType (1 byte): 8=Audio, 9=Video, 18=Script
//!   DataSize (3 bytes, BE)
//!   Timestamp (3 bytes, BE) + TimestampExtended (1 byte, 高8位)
//!   StreamID (3 bytes, BE): always 0
//!   TagData (DataSize bytes)
//! PreviousTagSize (4 bytes, BE)
//! ```
//!
//! 时间基固定为毫秒 (1/1000). AVC 视频 Tag 额外携带
//! AVCPacketType 和 CompositionTimeOffset (PTS = DTS + CTS).
//!
//! 流中途出现的新序列头 (编解码器配置变更) 不会被丢弃,
//! 而是作为边带数据挂到下一个数据包上, 由封装器原样重放.

use bytes::Bytes;
use log::debug;
use luan_codec::{CodecId, Packet};
use luan_core::{LuanError, LuanResult, MediaType, Rational};

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::FormatProbe;
use crate::stream::{AudioStreamParams, Stream, StreamParams, VideoStreamParams};

/// FLV Tag 类型
pub(crate) const TAG_AUDIO: u8 = 8;
pub(crate) const TAG_VIDEO: u8 = 9;
pub(crate) const TAG_SCRIPT: u8 = 18;

/// FLV 视频编解码器 ID (CodecID)
pub(crate) const FLV_CODEC_AVC: u8 = 7;
pub(crate) const FLV_CODEC_HEVC: u8 = 12;
pub(crate) const FLV_CODEC_AV1: u8 = 13;

/// FLV 音频编解码器 ID (SoundFormat)
pub(crate) const FLV_AUDIO_MP3: u8 = 2;
pub(crate) const FLV_AUDIO_PCM_LE: u8 = 3;
pub(crate) const FLV_AUDIO_AAC: u8 = 10;

/// 一个已解析的 FLV Tag 头部
struct TagHeader {
    tag_type: u8,
    data_size: u32,
    /// 毫秒时间戳 (含扩展字节)
    timestamp: u32,
}

/// FLV 解封装器
pub struct FlvDemuxer {
    /// 流信息
    streams: Vec<Stream>,
    /// 音频流索引 (None 表示还未出现音频 Tag)
    audio_stream_idx: Option<usize>,
    /// 视频流索引
    video_stream_idx: Option<usize>,
    /// 文件时长 (毫秒, 来自 onMetaData)
    duration_ms: Option<f64>,
    /// 数据区起始偏移
    data_offset: u64,
    /// 头部 flags 声明存在音频流
    declared_audio: bool,
    /// 头部 flags 声明存在视频流
    declared_video: bool,
    /// 流中途更新的视频序列头, 等待挂到下一个视频包
    pending_video_config: Option<Vec<u8>>,
    /// 流中途更新的音频序列头
    pending_audio_config: Option<Vec<u8>>,
}

impl FlvDemuxer {
    /// 创建 FLV 解封装器实例 (工厂函数)
    pub fn create() -> LuanResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self {
            streams: Vec::new(),
            audio_stream_idx: None,
            video_stream_idx: None,
            duration_ms: None,
            data_offset: 0,
            declared_audio: false,
            declared_video: false,
            pending_video_config: None,
            pending_audio_config: None,
        }))
    }

    /// 读取 FLV 文件头部
    fn read_header(&mut self, io: &mut IoContext) -> LuanResult<()> {
        let sig = io.read_bytes(3)?;
        if sig != b"FLV" {
            return Err(LuanError::InvalidData("不是 FLV 文件".into()));
        }

        let version = io.read_u8()?;
        let flags = io.read_u8()?;
        let data_offset = io.read_u32_be()?;
        debug!("FLV: version={version} flags=0x{flags:02X} data_offset={data_offset}");

        self.declared_audio = (flags & 0x04) != 0;
        self.declared_video = (flags & 0x01) != 0;
        self.data_offset = u64::from(data_offset);

        // 跳到数据区, 消耗 PreviousTagSize0
        io.seek(std::io::SeekFrom::Start(self.data_offset))?;
        let _prev_size = io.read_u32_be()?;
        Ok(())
    }

    /// 读取一个 FLV Tag 头部 (11 字节)
    fn read_tag_header(io: &mut IoContext) -> LuanResult<TagHeader> {
        let tag_type = io.read_u8()?;
        let data_size = io.read_u24_be()?;
        let timestamp_low = io.read_u24_be()?;
        let timestamp_ext = io.read_u8()?;
        let _stream_id = io.read_u24_be()?;
        Ok(TagHeader {
            tag_type,
            data_size,
            timestamp: (u32::from(timestamp_ext) << 24) | timestamp_low,
        })
    }

    /// 确保音频流已创建, 返回其索引
    fn ensure_audio_stream(&mut self, sound_format: u8, sound_rate_idx: u8, stereo: bool) -> usize {
        if let Some(idx) = self.audio_stream_idx {
            return idx;
        }

        let codec_id = match sound_format {
            FLV_AUDIO_AAC => CodecId::Aac,
            FLV_AUDIO_MP3 | 14 => CodecId::Mp3,
            FLV_AUDIO_PCM_LE | 0 => CodecId::PcmS16le,
            _ => CodecId::None,
        };
        let sample_rate = match sound_rate_idx {
            0 => 5512,
            1 => 11025,
            2 => 22050,
            _ => 44100,
        };
        // AAC 的实际采样率由 AudioSpecificConfig 决定, 这里取标称值
        let sample_rate = if sound_format == FLV_AUDIO_AAC {
            44100
        } else {
            sample_rate
        };

        let idx = self.streams.len();
        self.streams.push(Stream {
            index: idx,
            media_type: MediaType::Audio,
            codec_id,
            time_base: Rational::MILLI,
            duration: -1,
            start_time: 0,
            extra_data: Vec::new(),
            params: StreamParams::Audio(AudioStreamParams {
                sample_rate,
                channels: if stereo { 2 } else { 1 },
                bit_rate: 0,
                frame_size: 1024,
            }),
        });
        self.audio_stream_idx = Some(idx);
        idx
    }

    /// 确保视频流已创建, 返回其索引
    fn ensure_video_stream(&mut self, flv_codec: u8) -> usize {
        if let Some(idx) = self.video_stream_idx {
            return idx;
        }

        let codec_id = match flv_codec {
            FLV_CODEC_AVC => CodecId::H264,
            FLV_CODEC_HEVC => CodecId::H265,
            FLV_CODEC_AV1 => CodecId::Av1,
            2 => CodecId::Mpeg4,
            _ => CodecId::None,
        };

        let idx = self.streams.len();
        self.streams.push(Stream {
            index: idx,
            media_type: MediaType::Video,
            codec_id,
            time_base: Rational::MILLI,
            duration: -1,
            start_time: 0,
            extra_data: Vec::new(),
            params: StreamParams::Video(VideoStreamParams {
                width: 0,  // 从 onMetaData 获取 (如有)
                height: 0,
                frame_rate: Rational::new(0, 1),
                bit_rate: 0,
            }),
        });
        self.video_stream_idx = Some(idx);
        idx
    }

    /// 收到序列头: open 阶段记入 extra_data; 读取阶段若与已知配置不同
    /// 则作为边带数据挂起, 等待下一个数据包
    fn accept_config(&mut self, stream_idx: usize, config: Vec<u8>, probing: bool) {
        let known = &self.streams[stream_idx].extra_data;
        if known.is_empty() {
            debug!("FLV: 流 #{stream_idx} 序列头, {} 字节", config.len());
            self.streams[stream_idx].extra_data = config;
            return;
        }
        if probing || *known == config {
            // 预读阶段只记录第一份配置; 重新定位后再次遇到的初始序列头忽略
            return;
        }
        debug!("FLV: 流 #{stream_idx} 序列头变更, {} 字节", config.len());
        if Some(stream_idx) == self.video_stream_idx {
            self.pending_video_config = Some(config);
        } else {
            self.pending_audio_config = Some(config);
        }
    }

    /// 处理音频 Tag, 返回产出的数据包 (序列头等不产出)
    fn handle_audio_tag(
        &mut self,
        io: &mut IoContext,
        header: &TagHeader,
        probing: bool,
    ) -> LuanResult<Option<Packet>> {
        if header.data_size == 0 {
            return Ok(None);
        }

        let audio_header = io.read_u8()?;
        let sound_format = (audio_header >> 4) & 0x0F;
        let sound_rate_idx = (audio_header >> 2) & 0x03;
        let stereo = (audio_header & 0x01) == 1;
        let stream_idx = self.ensure_audio_stream(sound_format, sound_rate_idx, stereo);

        let mut remaining = header.data_size - 1;

        // AAC: 第二个字节是 AACPacketType
        if sound_format == FLV_AUDIO_AAC {
            if remaining < 1 {
                return Ok(None);
            }
            let aac_packet_type = io.read_u8()?;
            remaining -= 1;
            if aac_packet_type == 0 {
                // Sequence Header (AudioSpecificConfig)
                let config = io.read_bytes(remaining as usize)?;
                self.accept_config(stream_idx, config, probing);
                return Ok(None);
            }
        }

        let data = io.read_bytes(remaining as usize)?;
        let mut pkt = Packet::from_data(Bytes::from(data));
        pkt.stream_index = stream_idx;
        pkt.pts = i64::from(header.timestamp);
        pkt.dts = i64::from(header.timestamp);
        pkt.is_keyframe = true;
        pkt.time_base = Rational::MILLI;
        pkt.side_data = self.pending_audio_config.take().map(Bytes::from);
        Ok(Some(pkt))
    }

    /// 处理视频 Tag
    fn handle_video_tag(
        &mut self,
        io: &mut IoContext,
        header: &TagHeader,
        probing: bool,
    ) -> LuanResult<Option<Packet>> {
        if header.data_size == 0 {
            return Ok(None);
        }

        let video_header = io.read_u8()?;
        let frame_type = (video_header >> 4) & 0x0F;
        let flv_codec = video_header & 0x0F;
        let stream_idx = self.ensure_video_stream(flv_codec);

        let remaining = header.data_size - 1;

        // AVC/HEVC/AV1: AVCPacketType (1) + CompositionTimeOffset (3, 有符号)
        if matches!(flv_codec, FLV_CODEC_AVC | FLV_CODEC_HEVC | FLV_CODEC_AV1) {
            if remaining < 4 {
                io.skip(remaining as usize)?;
                return Ok(None);
            }
            let avc_packet_type = io.read_u8()?;
            let cts_raw = io.read_u24_be()?;
            let cts = if cts_raw & 0x80_0000 != 0 {
                cts_raw as i32 - 0x100_0000
            } else {
                cts_raw as i32
            };
            let payload_size = remaining - 4;

            match avc_packet_type {
                0 => {
                    // Sequence Header (DecoderConfigurationRecord)
                    let config = io.read_bytes(payload_size as usize)?;
                    self.accept_config(stream_idx, config, probing);
                    return Ok(None);
                }
                2 => {
                    // End of Sequence
                    io.skip(payload_size as usize)?;
                    return Ok(None);
                }
                _ => {}
            }

            let data = io.read_bytes(payload_size as usize)?;
            let dts = i64::from(header.timestamp);
            let mut pkt = Packet::from_data(Bytes::from(data));
            pkt.stream_index = stream_idx;
            pkt.pts = dts + i64::from(cts);
            pkt.dts = dts;
            pkt.is_keyframe = frame_type == 1;
            pkt.time_base = Rational::MILLI;
            pkt.side_data = self.pending_video_config.take().map(Bytes::from);
            return Ok(Some(pkt));
        }

        // 其他视频编解码器: 无额外头部
        let data = io.read_bytes(remaining as usize)?;
        let mut pkt = Packet::from_data(Bytes::from(data));
        pkt.stream_index = stream_idx;
        pkt.pts = i64::from(header.timestamp);
        pkt.dts = i64::from(header.timestamp);
        pkt.is_keyframe = frame_type == 1;
        pkt.time_base = Rational::MILLI;
        Ok(Some(pkt))
    }

    /// 简单解析 onMetaData (AMF0), 提取 duration / width / height
    fn parse_script_tag(&mut self, io: &mut IoContext, data_size: u32) -> LuanResult<()> {
        let data = io.read_bytes(data_size as usize)?;

        if let Some(dur) = amf0_number_after(&data, b"duration") {
            if dur > 0.0 {
                self.duration_ms = Some(dur * 1000.0);
                debug!("FLV: onMetaData duration={dur}s");
            }
        }

        for key in [b"width" as &[u8], b"height"] {
            let Some(val) = amf0_number_after(&data, key) else {
                continue;
            };
            if val <= 0.0 {
                continue;
            }
            if let Some(idx) = self.video_stream_idx {
                if let StreamParams::Video(ref mut vp) = self.streams[idx].params {
                    if key == b"width" {
                        vp.width = val as u32;
                    } else {
                        vp.height = val as u32;
                    }
                }
            }
        }

        Ok(())
    }

    /// 读取并处理一个 Tag, 返回产出的数据包
    fn next_tag(&mut self, io: &mut IoContext, probing: bool) -> LuanResult<Option<Packet>> {
        let header = Self::read_tag_header(io)?;

        let pkt = match header.tag_type {
            TAG_AUDIO => self.handle_audio_tag(io, &header, probing)?,
            TAG_VIDEO => self.handle_video_tag(io, &header, probing)?,
            TAG_SCRIPT => {
                self.parse_script_tag(io, header.data_size)?;
                None
            }
            _ => {
                io.skip(header.data_size as usize)?;
                None
            }
        };

        // PreviousTagSize
        let _prev_tag_size = io.read_u32_be()?;
        Ok(pkt)
    }
}

/// 在 AMF0 数据中查找 `key` 字符串后紧跟的 Number 值
///
/// 简化解析: 只做字节搜索, 不构建完整 AMF 对象树.
fn amf0_number_after(data: &[u8], key: &[u8]) -> Option<f64> {
    let pos = data.windows(key.len()).position(|w| w == key)?;
    let after = pos + key.len();
    // AMF0 Number: type(0x00) + 8 字节 IEEE 754 大端
    if after + 9 > data.len() || data[after] != 0x00 {
        return None;
    }
    let bits = u64::from_be_bytes(data[after + 1..after + 9].try_into().ok()?);
    let val = f64::from_bits(bits);
    val.is_finite().then_some(val)
}

impl Demuxer for FlvDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }

    fn name(&self) -> &str {
        "flv"
    }

    fn open(&mut self, io: &mut IoContext) -> LuanResult<()> {
        self.read_header(io)?;

        // 预读 Tag 直到头部 flags 声明的流全部建立 —
        // 流表必须在输出头部写出之前完整
        let max_probe_tags = 32;
        for _ in 0..max_probe_tags {
            match self.next_tag(io, true) {
                Ok(_) => {}
                Err(LuanError::Eof) => break,
                Err(e) => return Err(e),
            }

            let audio_done = !self.declared_audio || self.audio_stream_idx.is_some();
            let video_done = !self.declared_video || self.video_stream_idx.is_some();
            if audio_done && video_done {
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(LuanError::InvalidData("FLV: 未找到音频或视频流".into()));
        }

        // 更新流时长 (time_base = 1/1000)
        if let Some(dur_ms) = self.duration_ms {
            for stream in &mut self.streams {
                stream.duration = dur_ms as i64;
            }
        }

        // 回到数据区开始, 准备顺序读取
        io.seek(std::io::SeekFrom::Start(self.data_offset))?;
        let _prev = io.read_u32_be()?; // PreviousTagSize0
        self.pending_video_config = None;
        self.pending_audio_config = None;

        debug!("FLV: 打开完成, {} 个流", self.streams.len());
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> LuanResult<Packet> {
        loop {
            if let Some(pkt) = self.next_tag(io, false)? {
                return Ok(pkt);
            }
        }
    }

    fn duration(&self) -> Option<f64> {
        self.duration_ms.map(|ms| ms / 1000.0)
    }
}

/// FLV 格式探测器
pub struct FlvProbe;

impl FormatProbe for FlvProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<crate::probe::ProbeScore> {
        // 检查 "FLV" 签名 + version
        if data.len() >= 9 && data[0] == b'F' && data[1] == b'L' && data[2] == b'V' && data[3] == 1
        {
            return Some(crate::probe::SCORE_MAX);
        }

        // 扩展名
        if let Some(name) = filename {
            if let Some(ext) = name.rsplit('.').next() {
                if ext.eq_ignore_ascii_case("flv") {
                    return Some(crate::probe::SCORE_EXTENSION);
                }
            }
        }

        None
    }

    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }
}
