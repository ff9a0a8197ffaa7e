//! MPEG-TS (Transport Stream) 封装器.
//!
//! 将音视频数据包封装到 188 字节 TS 包中:
//! - PAT (Program Association Table): 映射 program 到 PMT PID
//! - PMT (Program Map Table): 映射 stream_type 到 ES PID
//! - PES (Packetized Elementary Stream): 压缩数据 + 时间戳
//!
//! PTS 与 DTS 不同时写入 PTS_DTS_flags=3 的双时间戳头部 —
//! 被改写过的 DTS 必须原样穿过容器往返, 不能在封装时被 PTS 吞并.

use log::debug;
use luan_codec::{CodecId, Packet};
use luan_core::timestamp::NOPTS_VALUE;
use luan_core::{LuanError, LuanResult, MediaType};

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::stream::Stream;

/// TS 包大小
const TS_PACKET_SIZE: usize = 188;
/// TS 同步字节
const TS_SYNC: u8 = 0x47;
/// PMT PID
const PID_PMT: u16 = 0x1000;
/// 第一个 ES PID
const PID_ES_BASE: u16 = 0x0100;
/// 每写多少个数据包重复一次 PSI
const PSI_INTERVAL: u32 = 40;

/// 输出流状态
struct TsStream {
    pid: u16,
    stream_type: u8,
    continuity_counter: u8,
    media_type: MediaType,
}

/// MPEG-TS 封装器
pub struct MpegTsMuxer {
    /// 流列表
    ts_streams: Vec<TsStream>,
    /// PAT 连续性计数器
    pat_cc: u8,
    /// PMT 连续性计数器
    pmt_cc: u8,
    /// PAT/PMT 重复写入计数
    psi_counter: u32,
}

impl MpegTsMuxer {
    /// 创建 MPEG-TS 封装器 (工厂函数)
    pub fn create() -> LuanResult<Box<dyn Muxer>> {
        Ok(Box::new(Self {
            ts_streams: Vec::new(),
            pat_cc: 0,
            pmt_cc: 0,
            psi_counter: 0,
        }))
    }

    /// 编解码器 -> stream_type
    fn codec_to_stream_type(codec_id: CodecId) -> LuanResult<u8> {
        match codec_id {
            CodecId::Mpeg1Video => Ok(0x01),
            CodecId::Mpeg2Video => Ok(0x02),
            CodecId::H264 => Ok(0x1B),
            CodecId::H265 => Ok(0x24),
            CodecId::Aac => Ok(0x0F),
            CodecId::Mp3 => Ok(0x03),
            CodecId::Ac3 => Ok(0x81),
            CodecId::Eac3 => Ok(0x87),
            _ => Err(LuanError::Unsupported(format!(
                "MPEG-TS 不支持编解码器: {codec_id}"
            ))),
        }
    }

    /// 写入 PAT
    fn write_pat(&mut self, io: &mut IoContext) -> LuanResult<()> {
        let mut packet = [0u8; TS_PACKET_SIZE];
        packet[0] = TS_SYNC;
        // PID=0, PUSI=1
        packet[1] = 0x40;
        packet[2] = 0x00;
        packet[3] = 0x10 | (self.pat_cc & 0x0F);
        self.pat_cc = self.pat_cc.wrapping_add(1);

        packet[4] = 0x00; // pointer_field

        let pat_start = 5;
        packet[pat_start] = 0x00; // table_id
        // section_length = 5 (固定头) + 4 (一个节目条目) + 4 (CRC)
        let section_length: u16 = 13;
        packet[pat_start + 1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        packet[pat_start + 2] = section_length as u8;
        packet[pat_start + 3] = 0x00; // transport_stream_id
        packet[pat_start + 4] = 0x01;
        packet[pat_start + 5] = 0xC1; // reserved + version=0 + current=1
        packet[pat_start + 6] = 0x00; // section_number
        packet[pat_start + 7] = 0x00; // last_section_number
        // program_number=1 → PMT PID
        packet[pat_start + 8] = 0x00;
        packet[pat_start + 9] = 0x01;
        packet[pat_start + 10] = 0xE0 | ((PID_PMT >> 8) as u8 & 0x1F);
        packet[pat_start + 11] = PID_PMT as u8;

        let crc = crc32_mpeg2(&packet[pat_start..pat_start + 12]);
        let crc_pos = pat_start + 12;
        packet[crc_pos..crc_pos + 4].copy_from_slice(&crc.to_be_bytes());

        // 填充
        for b in &mut packet[crc_pos + 4..TS_PACKET_SIZE] {
            *b = 0xFF;
        }

        io.write_all(&packet)?;
        Ok(())
    }

    /// 写入 PMT
    fn write_pmt(&mut self, io: &mut IoContext) -> LuanResult<()> {
        let mut packet = [0u8; TS_PACKET_SIZE];
        packet[0] = TS_SYNC;
        packet[1] = 0x40 | ((PID_PMT >> 8) as u8 & 0x1F);
        packet[2] = PID_PMT as u8;
        packet[3] = 0x10 | (self.pmt_cc & 0x0F);
        self.pmt_cc = self.pmt_cc.wrapping_add(1);

        packet[4] = 0x00; // pointer_field

        let pmt_start = 5;
        packet[pmt_start] = 0x02; // table_id

        // section_length = 9 (固定部分含 CRC) + 每流 5 字节
        let section_length = 9 + 5 * self.ts_streams.len();
        packet[pmt_start + 1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        packet[pmt_start + 2] = section_length as u8;
        packet[pmt_start + 3] = 0x00; // program_number
        packet[pmt_start + 4] = 0x01;
        packet[pmt_start + 5] = 0xC1;
        packet[pmt_start + 6] = 0x00;
        packet[pmt_start + 7] = 0x00;

        // PCR PID: 取第一个流
        let pcr_pid = self
            .ts_streams
            .first()
            .map_or(PID_ES_BASE, |s| s.pid);
        packet[pmt_start + 8] = 0xE0 | ((pcr_pid >> 8) as u8 & 0x1F);
        packet[pmt_start + 9] = pcr_pid as u8;

        // program_info_length = 0
        packet[pmt_start + 10] = 0xF0;
        packet[pmt_start + 11] = 0x00;

        let mut pos = pmt_start + 12;
        for ts_stream in &self.ts_streams {
            packet[pos] = ts_stream.stream_type;
            packet[pos + 1] = 0xE0 | ((ts_stream.pid >> 8) as u8 & 0x1F);
            packet[pos + 2] = ts_stream.pid as u8;
            packet[pos + 3] = 0xF0; // ES_info_length = 0
            packet[pos + 4] = 0x00;
            pos += 5;
        }

        let crc = crc32_mpeg2(&packet[pmt_start..pos]);
        packet[pos..pos + 4].copy_from_slice(&crc.to_be_bytes());
        pos += 4;

        for b in &mut packet[pos..TS_PACKET_SIZE] {
            *b = 0xFF;
        }

        io.write_all(&packet)?;
        Ok(())
    }

    /// 写入 PSI (PAT + PMT)
    fn write_psi(&mut self, io: &mut IoContext) -> LuanResult<()> {
        self.write_pat(io)?;
        self.write_pmt(io)?;
        Ok(())
    }

    /// 编码 33-bit 时间戳到 5 字节 (prefix 为高 4 位标志)
    fn encode_timestamp(prefix: u8, v: i64) -> [u8; 5] {
        [
            (prefix << 4) | ((((v >> 30) as u8) & 0x07) << 1) | 0x01,
            (v >> 22) as u8,
            0x01 | ((((v >> 15) as u8) & 0x7F) << 1),
            (v >> 7) as u8,
            0x01 | (((v as u8) & 0x7F) << 1),
        ]
    }

    /// 构建 PES 包并拆分为 TS 包写入
    fn write_pes(
        io: &mut IoContext,
        pid: u16,
        cc: &mut u8,
        stream_id: u8,
        pts: Option<i64>,
        dts: Option<i64>,
        data: &[u8],
    ) -> LuanResult<()> {
        // PES 头部
        let mut pes = Vec::with_capacity(data.len() + 19);
        pes.extend_from_slice(&[0x00, 0x00, 0x01]);
        pes.push(stream_id);

        // PTS 存在且 DTS 不同时写双时间戳
        let write_dts = matches!((pts, dts), (Some(p), Some(d)) if p != d);
        let header_ext_len: usize = match (pts.is_some(), write_dts) {
            (true, true) => 10,
            (true, false) => 5,
            _ => 0,
        };
        let pes_length = 3 + header_ext_len + data.len();
        let pes_length = if pes_length <= 65535 {
            pes_length as u16
        } else {
            0 // 无限长度 (视频流允许)
        };
        pes.extend_from_slice(&pes_length.to_be_bytes());

        pes.push(0x80); // marker bits
        pes.push(match (pts.is_some(), write_dts) {
            (true, true) => 0xC0,
            (true, false) => 0x80,
            _ => 0x00,
        });
        pes.push(header_ext_len as u8);

        if let Some(pts_val) = pts {
            if write_dts {
                pes.extend_from_slice(&Self::encode_timestamp(0x3, pts_val));
                pes.extend_from_slice(&Self::encode_timestamp(0x1, dts.unwrap_or(pts_val)));
            } else {
                pes.extend_from_slice(&Self::encode_timestamp(0x2, pts_val));
            }
        }
        pes.extend_from_slice(data);

        // 拆分成 TS 包
        let mut offset = 0;
        let mut first = true;

        while offset < pes.len() {
            let mut packet = [0u8; TS_PACKET_SIZE];
            packet[0] = TS_SYNC;

            let pusi = if first { 0x40u8 } else { 0x00u8 };
            packet[1] = pusi | ((pid >> 8) as u8 & 0x1F);
            packet[2] = pid as u8;

            let remaining = pes.len() - offset;
            let payload_max = TS_PACKET_SIZE - 4;

            if remaining >= payload_max {
                // 纯 payload
                packet[3] = 0x10 | (*cc & 0x0F);
                packet[4..TS_PACKET_SIZE].copy_from_slice(&pes[offset..offset + payload_max]);
                offset += payload_max;
            } else {
                // 最后一个包: 用 adaptation field 填充到 188 字节
                let stuff_len = payload_max - remaining;
                if stuff_len >= 2 {
                    packet[3] = 0x30 | (*cc & 0x0F);
                    let af_len = (stuff_len - 1) as u8;
                    packet[4] = af_len;
                    packet[5] = 0x00; // af flags
                    for b in &mut packet[6..4 + stuff_len] {
                        *b = 0xFF; // stuffing
                    }
                    let payload_start = 4 + stuff_len;
                    packet[payload_start..payload_start + remaining]
                        .copy_from_slice(&pes[offset..offset + remaining]);
                } else {
                    // 剩 1 字节空间: adaptation_field_length = 0
                    packet[3] = 0x30 | (*cc & 0x0F);
                    packet[4] = 0;
                    packet[5..5 + remaining].copy_from_slice(&pes[offset..offset + remaining]);
                }
                offset = pes.len();
            }

            *cc = cc.wrapping_add(1);
            io.write_all(&packet)?;
            first = false;
        }

        Ok(())
    }
}

impl Muxer for MpegTsMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::MpegTs
    }

    fn name(&self) -> &str {
        "mpegts"
    }

    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> LuanResult<()> {
        if streams.is_empty() {
            return Err(LuanError::InvalidArgument("MPEG-TS: 没有输入流".into()));
        }

        self.ts_streams.clear();
        for (i, stream) in streams.iter().enumerate() {
            let stream_type = Self::codec_to_stream_type(stream.codec_id)?;
            self.ts_streams.push(TsStream {
                pid: PID_ES_BASE + i as u16,
                stream_type,
                continuity_counter: 0,
                media_type: stream.media_type,
            });
        }
        debug!("TS: {} 条输出流", self.ts_streams.len());

        // 写入初始 PSI
        self.write_psi(io)?;

        Ok(())
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> LuanResult<()> {
        let idx = packet.stream_index;
        if idx >= self.ts_streams.len() {
            return Err(LuanError::StreamNotFound(idx));
        }

        // 定期重写 PSI, 便于流中途接入
        self.psi_counter += 1;
        if self.psi_counter % PSI_INTERVAL == 0 {
            self.write_psi(io)?;
        }

        let pid = self.ts_streams[idx].pid;
        let stream_id = match self.ts_streams[idx].media_type {
            MediaType::Video => 0xE0,
            MediaType::Audio => 0xC0,
            _ => 0xBD,
        };

        // 33-bit 时钟: 负值或哨兵值不写入
        let valid_33bit = |v: i64| (v != NOPTS_VALUE && v >= 0).then_some(v & 0x1_FFFF_FFFF);
        let pts = valid_33bit(packet.pts);
        let dts = valid_33bit(packet.dts);

        let cc = &mut self.ts_streams[idx].continuity_counter;
        Self::write_pes(io, pid, cc, stream_id, pts, dts, &packet.data)?;

        Ok(())
    }

    fn write_trailer(&mut self, _io: &mut IoContext) -> LuanResult<()> {
        // MPEG-TS 不需要特殊的尾部
        Ok(())
    }
}

/// MPEG-2 CRC32 (多项式 0x04C11DB7)
fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_1DB7;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{IoContext, MemoryBackend};
    use crate::stream::{AudioStreamParams, StreamParams, VideoStreamParams};
    use luan_core::Rational;

    fn make_video_stream(index: usize) -> Stream {
        Stream {
            index,
            media_type: MediaType::Video,
            codec_id: CodecId::H264,
            time_base: Rational::MPEG_90K,
            duration: -1,
            start_time: 0,
            extra_data: Vec::new(),
            params: StreamParams::Video(VideoStreamParams {
                width: 1920,
                height: 1080,
                frame_rate: Rational::new(30, 1),
                bit_rate: 0,
            }),
        }
    }

    fn make_audio_stream(index: usize) -> Stream {
        Stream {
            index,
            media_type: MediaType::Audio,
            codec_id: CodecId::Aac,
            time_base: Rational::MPEG_90K,
            duration: -1,
            start_time: 0,
            extra_data: Vec::new(),
            params: StreamParams::Audio(AudioStreamParams {
                sample_rate: 44100,
                channels: 2,
                bit_rate: 128000,
                frame_size: 1024,
            }),
        }
    }

    fn new_io() -> IoContext {
        IoContext::new(Box::new(MemoryBackend::new()))
    }

    #[test]
    fn test_ts_写入头部() {
        let mut muxer = MpegTsMuxer::create().unwrap();
        let mut io = new_io();
        muxer.write_header(&mut io, &[make_video_stream(0)]).unwrap();
        let pos = io.position().unwrap();
        // PAT + PMT = 2 * 188 字节
        assert_eq!(pos, (2 * TS_PACKET_SIZE) as u64);
    }

    #[test]
    fn test_ts_写入数据包对齐() {
        let mut muxer = MpegTsMuxer::create().unwrap();
        let mut io = new_io();
        muxer.write_header(&mut io, &[make_video_stream(0)]).unwrap();

        let mut packet = Packet::from_data(vec![0x00, 0x00, 0x00, 0x01, 0x65, 0xAB, 0xCD]);
        packet.pts = 90000;
        packet.dts = 90000;
        packet.time_base = Rational::MPEG_90K;
        packet.is_keyframe = true;
        muxer.write_packet(&mut io, &packet).unwrap();

        let pos = io.position().unwrap();
        assert!(pos >= (3 * TS_PACKET_SIZE) as u64);
        assert_eq!(pos % TS_PACKET_SIZE as u64, 0, "所有 TS 包应 188 字节对齐");
    }

    #[test]
    fn test_ts_pts_dts_不同时写双时间戳() {
        let mut muxer = MpegTsMuxer::create().unwrap();
        let mut io = new_io();
        muxer.write_header(&mut io, &[make_video_stream(0)]).unwrap();
        let base = io.position().unwrap();

        let mut packet = Packet::from_data(vec![0xAA]);
        packet.pts = 93600;
        packet.dts = 90000;
        packet.time_base = Rational::MPEG_90K;
        muxer.write_packet(&mut io, &packet).unwrap();

        let end = io.position().unwrap();
        io.seek(std::io::SeekFrom::Start(base)).unwrap();
        let ts_pkt = io.read_bytes((end - base) as usize).unwrap();

        // TS 头 4 字节 + AF 填充后是 PES; 定位 PES start code
        let pes_off = ts_pkt
            .windows(4)
            .position(|w| w[..3] == [0, 0, 1] && w[3] == 0xE0)
            .expect("应找到 PES start code");
        // PTS_DTS_flags = 0xC0 (双时间戳)
        assert_eq!(ts_pkt[pes_off + 7] & 0xC0, 0xC0);
        // 可选头长度 = 10
        assert_eq!(ts_pkt[pes_off + 8], 10);
    }

    #[test]
    fn test_ts_大包拆分() {
        let mut muxer = MpegTsMuxer::create().unwrap();
        let mut io = new_io();
        muxer.write_header(&mut io, &[make_video_stream(0)]).unwrap();
        let base = io.position().unwrap();

        // 1000 字节负载必然跨多个 TS 包
        let mut packet = Packet::from_data(vec![0x42u8; 1000]);
        packet.pts = 0;
        packet.dts = 0;
        packet.time_base = Rational::MPEG_90K;
        muxer.write_packet(&mut io, &packet).unwrap();

        let written = io.position().unwrap() - base;
        assert!(written >= 6 * TS_PACKET_SIZE as u64);
        assert_eq!(written % TS_PACKET_SIZE as u64, 0);
    }

    #[test]
    fn test_ts_音视频() {
        let mut muxer = MpegTsMuxer::create().unwrap();
        let mut io = new_io();
        let streams = vec![make_video_stream(0), make_audio_stream(1)];
        muxer.write_header(&mut io, &streams).unwrap();

        let mut v_pkt = Packet::from_data(vec![0x00, 0x00, 0x00, 0x01, 0x65]);
        v_pkt.pts = 0;
        v_pkt.dts = 0;
        v_pkt.stream_index = 0;
        v_pkt.is_keyframe = true;

        let mut a_pkt = Packet::from_data(vec![0xFF, 0xF1, 0x50, 0x80]);
        a_pkt.pts = 0;
        a_pkt.dts = 0;
        a_pkt.stream_index = 1;
        a_pkt.is_keyframe = true;

        muxer.write_packet(&mut io, &v_pkt).unwrap();
        muxer.write_packet(&mut io, &a_pkt).unwrap();

        let pos = io.position().unwrap();
        assert_eq!(pos % TS_PACKET_SIZE as u64, 0);
    }

    #[test]
    fn test_不支持的编解码器() {
        let mut muxer = MpegTsMuxer::create().unwrap();
        let mut io = new_io();
        let mut stream = make_video_stream(0);
        stream.codec_id = CodecId::Vp8;
        assert!(matches!(
            muxer.write_header(&mut io, &[stream]),
            Err(LuanError::Unsupported(_))
        ));
    }

    #[test]
    fn test_空流报错() {
        let mut muxer = MpegTsMuxer::create().unwrap();
        let mut io = new_io();
        assert!(muxer.write_header(&mut io, &[]).is_err());
    }

    #[test]
    fn test_crc32() {
        let data = [0x00, 0x01, 0x02, 0x03];
        let crc = crc32_mpeg2(&data);
        assert_ne!(crc, 0);
    }
}
