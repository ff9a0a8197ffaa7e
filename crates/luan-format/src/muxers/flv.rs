//! FLV (Flash Video) 封装器.
//!
//! 将音视频数据包封装到 FLV 容器:
//! - FLV Header (9 bytes) + PreviousTagSize0
//! - [FLV Tag + PreviousTagSize] ...
//!
//! 时间戳按数据包自带时间基换算为毫秒后写入 Tag 头部,
//! 不做单调性修正. 数据包携带的边带数据 (新序列头) 会在
//! 该包之前作为配置 Tag 重放.

use luan_codec::{CodecId, Packet};
use luan_core::timestamp::{NOPTS_VALUE, rescale_q};
use luan_core::{LuanError, LuanResult, MediaType, Rational};

use crate::demuxers::flv::{
    FLV_AUDIO_AAC, FLV_AUDIO_MP3, FLV_AUDIO_PCM_LE, FLV_CODEC_AV1, FLV_CODEC_AVC, FLV_CODEC_HEVC,
    TAG_AUDIO, TAG_VIDEO,
};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::stream::{Stream, StreamParams};

/// FLV 封装器
pub struct FlvMuxer {
    /// 流信息缓存
    streams: Vec<Stream>,
}

impl FlvMuxer {
    /// 创建 FLV 封装器 (工厂函数)
    pub fn create() -> LuanResult<Box<dyn Muxer>> {
        Ok(Box::new(Self {
            streams: Vec::new(),
        }))
    }

    /// 编解码器 -> FLV SoundFormat
    fn codec_to_sound_format(codec_id: CodecId) -> LuanResult<u8> {
        match codec_id {
            CodecId::Aac => Ok(FLV_AUDIO_AAC),
            CodecId::Mp3 => Ok(FLV_AUDIO_MP3),
            CodecId::PcmS16le => Ok(FLV_AUDIO_PCM_LE),
            _ => Err(LuanError::Unsupported(format!(
                "FLV 不支持音频编解码器: {codec_id}"
            ))),
        }
    }

    /// 编解码器 -> FLV CodecID (video)
    fn codec_to_video_id(codec_id: CodecId) -> LuanResult<u8> {
        match codec_id {
            CodecId::H264 => Ok(FLV_CODEC_AVC),
            CodecId::H265 => Ok(FLV_CODEC_HEVC),
            CodecId::Av1 => Ok(FLV_CODEC_AV1),
            _ => Err(LuanError::Unsupported(format!(
                "FLV 不支持视频编解码器: {codec_id}"
            ))),
        }
    }

    /// 流的音频 Tag 头字节 (SoundFormat/SoundRate/SoundSize/SoundType)
    fn audio_tag_header(stream: &Stream) -> LuanResult<u8> {
        let sound_format = Self::codec_to_sound_format(stream.codec_id)?;
        let (sr_code, stereo_bit) = match &stream.params {
            StreamParams::Audio(a) => {
                let sr = match a.sample_rate {
                    11025 => 1u8,
                    22050 => 2,
                    _ => 3,
                };
                (sr, u8::from(a.channels >= 2))
            }
            _ => (3, 1),
        };
        // SoundSize 固定按 16bit 写
        Ok((sound_format << 4) | (sr_code << 2) | (1 << 1) | stereo_bit)
    }

    /// 写入 FLV Tag (头部 11 字节 + 数据 + PreviousTagSize)
    fn write_tag(io: &mut IoContext, tag_type: u8, timestamp: u32, data: &[u8]) -> LuanResult<()> {
        let data_size = data.len() as u32;
        io.write_u8(tag_type)?;
        io.write_u24_be(data_size)?;
        // Timestamp 低 24 位 + 扩展高 8 位
        io.write_u24_be(timestamp & 0x00FF_FFFF)?;
        io.write_u8((timestamp >> 24) as u8)?;
        io.write_u24_be(0)?; // StreamID, 恒为 0
        io.write_all(data)?;
        io.write_u32_be(11 + data_size)?;
        Ok(())
    }

    /// 写入一条流的序列头配置 Tag
    fn write_config_tag(
        io: &mut IoContext,
        stream: &Stream,
        timestamp: u32,
        config: &[u8],
    ) -> LuanResult<()> {
        match stream.media_type {
            MediaType::Video => {
                let video_codec_id = Self::codec_to_video_id(stream.codec_id)?;
                let mut tag_data = Vec::with_capacity(5 + config.len());
                // FrameType=1(keyframe) | CodecID, AVCPacketType=0, CTS=0
                tag_data.push((1 << 4) | video_codec_id);
                tag_data.extend_from_slice(&[0, 0, 0, 0]);
                tag_data.extend_from_slice(config);
                Self::write_tag(io, TAG_VIDEO, timestamp, &tag_data)
            }
            MediaType::Audio => {
                let mut tag_data = Vec::with_capacity(2 + config.len());
                tag_data.push(Self::audio_tag_header(stream)?);
                if Self::codec_to_sound_format(stream.codec_id)? == FLV_AUDIO_AAC {
                    tag_data.push(0); // AACPacketType = 0 (Sequence Header)
                }
                tag_data.extend_from_slice(config);
                Self::write_tag(io, TAG_AUDIO, timestamp, &tag_data)
            }
            _ => Err(LuanError::Unsupported("FLV: 不支持的流类型".into())),
        }
    }

    /// 数据包时间戳换算到 FLV 的毫秒时钟
    fn packet_timestamp_ms(packet: &Packet, fallback_tb: Rational) -> u32 {
        // FLV Tag 头部写的是 DTS; 无效时间戳按 0 写出
        let ts = if packet.dts != NOPTS_VALUE {
            packet.dts
        } else if packet.pts != NOPTS_VALUE {
            packet.pts
        } else {
            return 0;
        };
        let tb = if packet.time_base.is_valid() {
            packet.time_base
        } else {
            fallback_tb
        };
        rescale_q(ts, tb, Rational::MILLI).max(0) as u32
    }
}

impl Muxer for FlvMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }

    fn name(&self) -> &str {
        "flv"
    }

    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> LuanResult<()> {
        if streams.is_empty() {
            return Err(LuanError::InvalidArgument("FLV: 没有输入流".into()));
        }

        self.streams = streams.to_vec();

        let has_audio = streams.iter().any(|s| s.media_type == MediaType::Audio);
        let has_video = streams.iter().any(|s| s.media_type == MediaType::Video);

        // FLV Header
        io.write_all(b"FLV")?;
        io.write_u8(1)?; // Version
        let mut flags: u8 = 0;
        if has_audio {
            flags |= 0x04;
        }
        if has_video {
            flags |= 0x01;
        }
        io.write_u8(flags)?;
        io.write_u32_be(9)?; // DataOffset
        io.write_u32_be(0)?; // PreviousTagSize0

        // 写入初始序列头 (extradata)
        for stream in streams {
            if !stream.extra_data.is_empty() {
                Self::write_config_tag(io, stream, 0, &stream.extra_data)?;
            }
        }

        Ok(())
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> LuanResult<()> {
        let idx = packet.stream_index;
        if idx >= self.streams.len() {
            return Err(LuanError::StreamNotFound(idx));
        }

        let stream = &self.streams[idx];
        let timestamp_ms = Self::packet_timestamp_ms(packet, stream.time_base);

        // 边带数据: 流中途的新序列头, 先于数据包重放
        if let Some(ref config) = packet.side_data {
            Self::write_config_tag(io, stream, timestamp_ms, config)?;
        }

        match stream.media_type {
            MediaType::Video => {
                let video_codec_id = Self::codec_to_video_id(stream.codec_id)?;
                let frame_type: u8 = if packet.is_keyframe { 1 } else { 2 };
                let mut tag_data = Vec::with_capacity(5 + packet.data.len());
                tag_data.push((frame_type << 4) | video_codec_id);
                tag_data.push(1); // AVCPacketType = 1 (NALU)
                // CompositionTimeOffset = PTS - DTS (毫秒, 有符号 24 位)
                let cts = if packet.pts != NOPTS_VALUE && packet.dts != NOPTS_VALUE {
                    let tb = if packet.time_base.is_valid() {
                        packet.time_base
                    } else {
                        stream.time_base
                    };
                    rescale_q(packet.pts - packet.dts, tb, Rational::MILLI)
                        .clamp(-0x80_0000, 0x7F_FFFF) as i32
                } else {
                    0
                };
                let cts_bytes = cts.to_be_bytes();
                tag_data.extend_from_slice(&cts_bytes[1..4]);
                tag_data.extend_from_slice(&packet.data);
                Self::write_tag(io, TAG_VIDEO, timestamp_ms, &tag_data)?;
            }
            MediaType::Audio => {
                let mut tag_data = Vec::with_capacity(2 + packet.data.len());
                tag_data.push(Self::audio_tag_header(stream)?);
                if Self::codec_to_sound_format(stream.codec_id)? == FLV_AUDIO_AAC {
                    tag_data.push(1); // AACPacketType = 1 (Raw)
                }
                tag_data.extend_from_slice(&packet.data);
                Self::write_tag(io, TAG_AUDIO, timestamp_ms, &tag_data)?;
            }
            _ => {
                return Err(LuanError::Unsupported("FLV: 不支持的流类型".into()));
            }
        }

        Ok(())
    }

    fn write_trailer(&mut self, _io: &mut IoContext) -> LuanResult<()> {
        // FLV 没有需要回填的尾部结构
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{IoContext, MemoryBackend};
    use crate::stream::{AudioStreamParams, VideoStreamParams};
    use bytes::Bytes;

    fn make_audio_stream(index: usize) -> Stream {
        Stream {
            index,
            media_type: MediaType::Audio,
            codec_id: CodecId::Aac,
            time_base: Rational::MILLI,
            duration: -1,
            start_time: 0,
            extra_data: vec![0x12, 0x10],
            params: StreamParams::Audio(AudioStreamParams {
                sample_rate: 44100,
                channels: 2,
                bit_rate: 128000,
                frame_size: 1024,
            }),
        }
    }

    fn make_video_stream(index: usize) -> Stream {
        Stream {
            index,
            media_type: MediaType::Video,
            codec_id: CodecId::H264,
            time_base: Rational::MILLI,
            duration: -1,
            start_time: 0,
            extra_data: vec![0x01, 0x42, 0x00, 0x1E, 0xFF],
            params: StreamParams::Video(VideoStreamParams {
                width: 1920,
                height: 1080,
                frame_rate: Rational::new(30, 1),
                bit_rate: 0,
            }),
        }
    }

    fn new_io() -> IoContext {
        IoContext::new(Box::new(MemoryBackend::new()))
    }

    #[test]
    fn test_flv_写入头部() {
        let mut muxer = FlvMuxer::create().unwrap();
        let mut io = new_io();
        muxer.write_header(&mut io, &[make_audio_stream(0)]).unwrap();
        let pos = io.position().unwrap();
        // FLV header (9) + PrevTagSize0 (4) + 序列头 Tag
        assert!(pos > 13, "应写入 FLV 头部和序列头");
    }

    #[test]
    fn test_flv_音视频头部() {
        let mut muxer = FlvMuxer::create().unwrap();
        let mut io = new_io();
        let streams = vec![make_video_stream(0), make_audio_stream(1)];
        muxer.write_header(&mut io, &streams).unwrap();
        let pos = io.position().unwrap();
        // 应包含头部 + 两个序列头 Tag
        assert!(pos > 30, "应写入头部和两个序列头");
    }

    #[test]
    fn test_flv_写入数据包() {
        let mut muxer = FlvMuxer::create().unwrap();
        let mut io = new_io();
        muxer.write_header(&mut io, &[make_audio_stream(0)]).unwrap();

        let mut packet = Packet::from_data(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        packet.pts = 0;
        packet.dts = 0;
        packet.duration = 23;
        packet.time_base = Rational::MILLI;
        packet.is_keyframe = true;
        muxer.write_packet(&mut io, &packet).unwrap();

        let pos = io.position().unwrap();
        assert!(pos > 40, "应写入头部 + 序列头 + 数据包");
    }

    #[test]
    fn test_flv_时间戳换算() {
        // 90kHz 时间基的数据包应换算到毫秒
        let mut muxer = FlvMuxer::create().unwrap();
        let mut io = new_io();
        let mut stream = make_video_stream(0);
        stream.extra_data.clear(); // 不写序列头, 便于定位
        muxer.write_header(&mut io, &[stream]).unwrap();
        let header_len = io.position().unwrap() as usize;

        let mut packet = Packet::from_data(vec![0xAB]);
        packet.pts = 90000;
        packet.dts = 90000;
        packet.time_base = Rational::MPEG_90K;
        packet.is_keyframe = true;
        muxer.write_packet(&mut io, &packet).unwrap();

        let backend_data = {
            // Tag 头部第 5..8 字节是时间戳
            let pos = io.position().unwrap();
            assert!(pos > header_len as u64);
            io.seek(std::io::SeekFrom::Start(header_len as u64)).unwrap();
            io.read_bytes((pos - header_len as u64) as usize).unwrap()
        };
        // timestamp 低 24 位 = 1000ms
        let ts = (u32::from(backend_data[4]) << 16)
            | (u32::from(backend_data[5]) << 8)
            | u32::from(backend_data[6]);
        assert_eq!(ts, 1000);
    }

    #[test]
    fn test_flv_边带数据重放配置() {
        let mut muxer = FlvMuxer::create().unwrap();
        let mut io = new_io();
        let mut stream = make_video_stream(0);
        stream.extra_data.clear();
        muxer.write_header(&mut io, &[stream]).unwrap();
        let base = io.position().unwrap();

        let mut packet = Packet::from_data(vec![0xAB, 0xCD]);
        packet.pts = 0;
        packet.dts = 0;
        packet.time_base = Rational::MILLI;
        packet.is_keyframe = true;
        packet.side_data = Some(Bytes::from_static(&[0x01, 0x7A]));
        muxer.write_packet(&mut io, &packet).unwrap();

        // 应写出两个 Tag: 配置 Tag (5+2 字节数据) + 数据 Tag (5+2 字节数据)
        let written = io.position().unwrap() - base;
        assert_eq!(written, (11 + 7 + 4) + (11 + 7 + 4));
    }

    #[test]
    fn test_空流报错() {
        let mut muxer = FlvMuxer::create().unwrap();
        let mut io = new_io();
        assert!(muxer.write_header(&mut io, &[]).is_err());
    }

    #[test]
    fn test_未知流索引报错() {
        let mut muxer = FlvMuxer::create().unwrap();
        let mut io = new_io();
        muxer.write_header(&mut io, &[make_audio_stream(0)]).unwrap();

        let mut packet = Packet::from_data(vec![0x00]);
        packet.stream_index = 5;
        assert!(matches!(
            muxer.write_packet(&mut io, &packet),
            Err(LuanError::StreamNotFound(5))
        ));
    }
}
