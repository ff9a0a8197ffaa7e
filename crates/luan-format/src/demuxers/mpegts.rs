//! MPEG-TS (Transport Stream) 解封装器.
//!
//! MPEG-TS 是一种基于固定大小 (188 字节) 包的传输流格式.
//!
//! # TS 包结构 (188 字节)
//! ```text
//! 同步字节 (0x47)                          1 byte
//! TEI(1) + PUSI(1) + Priority(1) + PID(13) 2 bytes
//! TSC(2) + AFC(2) + CC(4)                  1 byte
//! [Adaptation Field]                       可变
//! [Payload]                                可变
//! ```
//!
//! # 关键 PID
//! - PID 0x0000: PAT (Program Association Table)
//! - PID 0x1FFF: Null packet (填充)
//!
//! PAT 将 program_number 映射到 PMT 的 PID,
//! PMT 将 stream_type 映射到 ES (Elementary Stream) 的 PID.
//! ES 数据以 PES 包承载, 跨多个 TS 包重组; 一个 PES 包在下一个
//! PUSI (Payload Unit Start Indicator) 到来时才算完整.
//! 输入耗尽时仍滞留在重组缓冲区里的 PES 数据会被冲洗成
//! 最后一批数据包, 保证线性重封装不丢尾部帧.

use bytes::Bytes;
use log::debug;
use luan_codec::{CodecId, Packet};
use luan_core::timestamp::NOPTS_VALUE;
use luan_core::{LuanError, LuanResult, MediaType, Rational};
use std::collections::HashMap;

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::FormatProbe;
use crate::stream::{AudioStreamParams, Stream, StreamParams, VideoStreamParams};

/// TS 包大小
pub(crate) const TS_PACKET_SIZE: usize = 188;
/// TS 同步字节
pub(crate) const TS_SYNC_BYTE: u8 = 0x47;
/// PAT PID
const PID_PAT: u16 = 0x0000;
/// 空包 PID
const PID_NULL: u16 = 0x1FFF;

/// MPEG-TS stream_type → CodecId 映射
fn stream_type_to_codec(stream_type: u8) -> CodecId {
    match stream_type {
        // 视频
        0x01 => CodecId::Mpeg1Video,
        0x02 => CodecId::Mpeg2Video,
        0x1B => CodecId::H264,
        0x24 => CodecId::H265,
        // 音频
        0x03 | 0x04 => CodecId::Mp3,
        0x0F | 0x11 => CodecId::Aac, // ADTS / LATM
        0x81 => CodecId::Ac3,
        0x87 => CodecId::Eac3,
        0x86 => CodecId::Dts,
        _ => CodecId::None,
    }
}

/// PES (Packetized Elementary Stream) 重组缓冲区
struct PesBuffer {
    /// 缓冲数据
    data: Vec<u8>,
    /// PTS (90kHz 时钟, NOPTS_VALUE 表示未携带)
    pts: i64,
    /// DTS
    dts: i64,
    /// 是否为随机访问点 (关键帧)
    random_access: bool,
    /// 对应的流索引
    stream_index: usize,
}

impl PesBuffer {
    fn new(stream_index: usize) -> Self {
        Self {
            data: Vec::new(),
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            random_access: false,
            stream_index,
        }
    }

    fn clear(&mut self) {
        self.data.clear();
        self.pts = NOPTS_VALUE;
        self.dts = NOPTS_VALUE;
        self.random_access = false;
    }

    /// 将缓冲内容取出为数据包, 缓冲清空
    fn take_packet(&mut self) -> Option<Packet> {
        if self.data.is_empty() {
            return None;
        }
        let mut pkt = Packet::from_data(Bytes::from(std::mem::take(&mut self.data)));
        pkt.stream_index = self.stream_index;
        pkt.pts = self.pts;
        pkt.dts = if self.dts != NOPTS_VALUE {
            self.dts
        } else {
            self.pts
        };
        pkt.is_keyframe = self.random_access;
        pkt.time_base = Rational::MPEG_90K;
        self.clear();
        Some(pkt)
    }
}

/// MPEG-TS 解封装器
pub struct TsDemuxer {
    /// 流信息
    streams: Vec<Stream>,
    /// PMT PID (从 PAT 获取)
    pmt_pid: u16,
    /// PID → 流索引映射
    pid_to_stream: HashMap<u16, usize>,
    /// PID → PES 重组缓冲区
    pes_buffers: HashMap<u16, PesBuffer>,
    /// 已完成的数据包队列
    packet_queue: Vec<Packet>,
    /// PAT 是否已解析
    pat_parsed: bool,
    /// PMT 是否已解析
    pmt_parsed: bool,
    /// EOF 时残留缓冲是否已冲洗
    eof_flushed: bool,
}

impl TsDemuxer {
    /// 创建 MPEG-TS 解封装器实例 (工厂函数)
    pub fn create() -> LuanResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self {
            streams: Vec::new(),
            pmt_pid: 0,
            pid_to_stream: HashMap::new(),
            pes_buffers: HashMap::new(),
            packet_queue: Vec::new(),
            pat_parsed: false,
            pmt_parsed: false,
            eof_flushed: false,
        }))
    }

    /// 读取一个 188 字节的 TS 包
    fn read_ts_packet(io: &mut IoContext) -> LuanResult<[u8; TS_PACKET_SIZE]> {
        let mut pkt = [0u8; TS_PACKET_SIZE];
        io.read_exact(&mut pkt)?;
        if pkt[0] != TS_SYNC_BYTE {
            return Err(LuanError::InvalidData("TS: 同步字节不匹配".into()));
        }
        Ok(pkt)
    }

    /// 同步到第一个有效的 TS 包
    fn sync_to_packet(io: &mut IoContext) -> LuanResult<()> {
        let max_search = 65536;
        for _ in 0..max_search {
            let b = io.read_u8()?;
            if b == TS_SYNC_BYTE {
                // 验证: 188 字节后是否还有同步字节
                let pos = io.position()?;
                let mut check = [0u8; TS_PACKET_SIZE];
                if io.read_exact(&mut check).is_ok() && check[TS_PACKET_SIZE - 1] == TS_SYNC_BYTE {
                    io.seek(std::io::SeekFrom::Start(pos - 1))?;
                    return Ok(());
                }
                io.seek(std::io::SeekFrom::Start(pos))?;
            }
        }
        Err(LuanError::InvalidData("TS: 找不到同步字节".into()))
    }

    /// 解析 TS 包头, 返回 (pid, pusi, afc)
    fn parse_ts_header(pkt: &[u8; TS_PACKET_SIZE]) -> (u16, bool, u8) {
        let pid = (u16::from(pkt[1] & 0x1F) << 8) | u16::from(pkt[2]);
        let pusi = (pkt[1] & 0x40) != 0;
        let afc = (pkt[3] >> 4) & 0x03;
        (pid, pusi, afc)
    }

    /// 获取 payload 的偏移, 以及 adaptation field 里的 random_access 标志
    fn payload_offset(pkt: &[u8; TS_PACKET_SIZE], afc: u8) -> (usize, bool) {
        let mut offset = 4;
        let mut random_access = false;

        if (afc == 2 || afc == 3) && offset < TS_PACKET_SIZE {
            let af_len = pkt[offset] as usize;
            if af_len > 0 && offset + 1 < TS_PACKET_SIZE {
                random_access = (pkt[offset + 1] & 0x40) != 0;
            }
            offset += 1 + af_len;
        }

        if afc == 1 || afc == 3 {
            (offset, random_access)
        } else {
            (TS_PACKET_SIZE, random_access) // 无 payload
        }
    }

    /// 解析 PAT (Program Association Table)
    fn parse_pat(&mut self, payload: &[u8]) {
        if self.pat_parsed || payload.len() < 8 {
            return;
        }
        let section_length =
            ((usize::from(payload[1]) & 0x0F) << 8) | usize::from(payload[2]);

        // 跳过 transport_stream_id(2) + version/flags(1) + section_number(2)
        let entries_start = 8;
        let entries_end = (3 + section_length).min(payload.len()).saturating_sub(4); // 减去 CRC
        if entries_end <= entries_start {
            return;
        }

        // 每个条目 4 字节: program_number(2) + PID(2); 通常只取第一个节目
        for chunk in payload[entries_start..entries_end].chunks_exact(4) {
            let program_number = (u16::from(chunk[0]) << 8) | u16::from(chunk[1]);
            let pid = (u16::from(chunk[2] & 0x1F) << 8) | u16::from(chunk[3]);
            if program_number != 0 {
                self.pmt_pid = pid;
                debug!("TS PAT: program={program_number} PMT_PID={pid:#06X}");
                break;
            }
        }

        self.pat_parsed = true;
    }

    /// 解析 PMT (Program Map Table), 建立流表
    fn parse_pmt(&mut self, payload: &[u8]) {
        if self.pmt_parsed || payload.len() < 12 {
            return;
        }
        let section_length =
            ((usize::from(payload[1]) & 0x0F) << 8) | usize::from(payload[2]);
        let prog_info_len =
            ((usize::from(payload[10]) & 0x0F) << 8) | usize::from(payload[11]);

        let mut pos = 12 + prog_info_len;
        let section_end = (3 + section_length).min(payload.len()).saturating_sub(4);

        while pos + 5 <= section_end {
            let stream_type = payload[pos];
            let es_pid = (u16::from(payload[pos + 1] & 0x1F) << 8) | u16::from(payload[pos + 2]);
            let es_info_len =
                ((usize::from(payload[pos + 3]) & 0x0F) << 8) | usize::from(payload[pos + 4]);
            pos += 5 + es_info_len;

            let codec_id = stream_type_to_codec(stream_type);
            debug!("TS PMT: stream_type=0x{stream_type:02X} PID={es_pid:#06X} codec={codec_id}");
            if codec_id == CodecId::None {
                continue; // 跳过未知编解码器
            }

            let stream_index = self.streams.len();
            let media_type = codec_id.media_type();
            let params = match media_type {
                MediaType::Video => StreamParams::Video(VideoStreamParams {
                    width: 0,
                    height: 0,
                    frame_rate: Rational::new(0, 1),
                    bit_rate: 0,
                }),
                MediaType::Audio => {
                    let (sample_rate, channels) = match codec_id {
                        CodecId::Ac3 | CodecId::Eac3 => (48000, 6),
                        _ => (44100, 2),
                    };
                    StreamParams::Audio(AudioStreamParams {
                        sample_rate,
                        channels,
                        bit_rate: 0,
                        frame_size: 0,
                    })
                }
                _ => StreamParams::Other,
            };

            // 时间基: 90kHz (MPEG-TS 标准时钟)
            self.streams.push(Stream {
                index: stream_index,
                media_type,
                codec_id,
                time_base: Rational::MPEG_90K,
                duration: -1,
                start_time: 0,
                extra_data: Vec::new(),
                params,
            });
            self.pid_to_stream.insert(es_pid, stream_index);
            self.pes_buffers.insert(es_pid, PesBuffer::new(stream_index));
        }

        self.pmt_parsed = true;
    }

    /// 处理 ES 数据: PUSI 时先完成旧 PES, 再开始新 PES
    fn handle_pes_data(&mut self, pid: u16, payload: &[u8], pusi: bool, random_access: bool) {
        if !self.pid_to_stream.contains_key(&pid) {
            return;
        }

        if pusi {
            if let Some(buf) = self.pes_buffers.get_mut(&pid) {
                if let Some(pkt) = buf.take_packet() {
                    self.packet_queue.push(pkt);
                }
                buf.random_access = random_access;
                if let Some((pts, dts, header_len)) = parse_pes_header(payload) {
                    buf.pts = pts;
                    buf.dts = dts;
                    buf.data.extend_from_slice(&payload[header_len..]);
                } else {
                    buf.data.extend_from_slice(payload);
                }
            }
        } else if let Some(buf) = self.pes_buffers.get_mut(&pid) {
            // 续包: 追加到缓冲区
            buf.data.extend_from_slice(payload);
            if random_access {
                buf.random_access = true;
            }
        }
    }

    /// 处理一个 TS 包
    fn process_packet(&mut self, pkt: &[u8; TS_PACKET_SIZE]) {
        let (pid, pusi, afc) = Self::parse_ts_header(pkt);

        if pid == PID_NULL {
            return;
        }

        let (payload_off, random_access) = Self::payload_offset(pkt, afc);
        if payload_off >= TS_PACKET_SIZE {
            return;
        }
        let payload = &pkt[payload_off..];

        // PSI 表: pointer_field 指向 section 起始
        if pid == PID_PAT || (pid == self.pmt_pid && self.pmt_pid != 0) {
            if pusi && !payload.is_empty() {
                let section_start = 1 + payload[0] as usize;
                if section_start < payload.len() {
                    if pid == PID_PAT {
                        self.parse_pat(&payload[section_start..]);
                    } else {
                        self.parse_pmt(&payload[section_start..]);
                    }
                }
            }
            return;
        }

        // ES 数据
        if self.pmt_parsed {
            self.handle_pes_data(pid, payload, pusi, random_access);
        }
    }

    /// 输入耗尽: 冲洗所有残留的 PES 缓冲 (按流索引排序, 保证确定性)
    fn flush_pending(&mut self) {
        let mut pids: Vec<u16> = self.pes_buffers.keys().copied().collect();
        pids.sort_by_key(|pid| self.pes_buffers[pid].stream_index);
        for pid in pids {
            if let Some(buf) = self.pes_buffers.get_mut(&pid) {
                if let Some(pkt) = buf.take_packet() {
                    debug!("TS: EOF 冲洗流 #{} 残留 PES", pkt.stream_index);
                    self.packet_queue.push(pkt);
                }
            }
        }
        self.eof_flushed = true;
    }
}

/// 解析 PES 包头, 提取 PTS/DTS
///
/// 返回 (pts, dts, header_length); 未携带的时间戳为 NOPTS_VALUE.
fn parse_pes_header(data: &[u8]) -> Option<(i64, i64, usize)> {
    // PES start code: 00 00 01 + stream_id
    if data.len() < 9 || data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
        return None;
    }

    // data[6]: 10xxxxxx (marker bits); 无可选头的流 (padding 等) 直接返回
    if (data[6] & 0xC0) != 0x80 {
        return Some((NOPTS_VALUE, NOPTS_VALUE, 6));
    }

    let pts_dts_flags = (data[7] >> 6) & 0x03;
    let pes_header_data_len = data[8] as usize;
    let header_len = 9 + pes_header_data_len;
    if header_len > data.len() {
        return Some((NOPTS_VALUE, NOPTS_VALUE, data.len().min(9)));
    }

    let mut pts = NOPTS_VALUE;
    let mut dts = NOPTS_VALUE;

    if pts_dts_flags >= 2 && data.len() >= 14 {
        pts = parse_timestamp(&data[9..14]);
    }
    if pts_dts_flags == 3 && data.len() >= 19 {
        dts = parse_timestamp(&data[14..19]);
    }

    Some((pts, dts, header_len))
}

/// 从 5 字节中提取 33-bit 时间戳
fn parse_timestamp(data: &[u8]) -> i64 {
    let b0 = i64::from(data[0]);
    let b1 = i64::from(data[1]);
    let b2 = i64::from(data[2]);
    let b3 = i64::from(data[3]);
    let b4 = i64::from(data[4]);

    ((b0 >> 1) & 0x07) << 30 | b1 << 22 | (b2 >> 1) << 15 | b3 << 7 | b4 >> 1
}

impl Demuxer for TsDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::MpegTs
    }

    fn name(&self) -> &str {
        "mpegts"
    }

    fn open(&mut self, io: &mut IoContext) -> LuanResult<()> {
        // 同步到第一个 TS 包
        Self::sync_to_packet(io)?;

        // 预读 TS 包直到解析出 PAT + PMT
        let max_probe_packets = 2000;
        for _ in 0..max_probe_packets {
            let pkt = match Self::read_ts_packet(io) {
                Ok(p) => p,
                Err(LuanError::Eof) => break,
                Err(e) => return Err(e),
            };

            self.process_packet(&pkt);

            if self.pat_parsed && self.pmt_parsed && !self.streams.is_empty() {
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(LuanError::InvalidData(
                "TS: 未找到任何流 (PAT/PMT 解析失败)".into(),
            ));
        }

        // 回到文件开头重新读取
        io.seek(std::io::SeekFrom::Start(0))?;
        Self::sync_to_packet(io)?;
        self.packet_queue.clear();
        for buf in self.pes_buffers.values_mut() {
            buf.clear();
        }
        self.eof_flushed = false;

        debug!("TS: 打开完成, {} 个流", self.streams.len());
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> LuanResult<Packet> {
        loop {
            if !self.packet_queue.is_empty() {
                return Ok(self.packet_queue.remove(0));
            }
            if self.eof_flushed {
                return Err(LuanError::Eof);
            }

            match Self::read_ts_packet(io) {
                Ok(pkt) => self.process_packet(&pkt),
                Err(LuanError::Eof) => self.flush_pending(),
                Err(e) => return Err(e),
            }
        }
    }

    fn duration(&self) -> Option<f64> {
        // TS 不携带容器级时长信息
        None
    }
}

/// MPEG-TS 格式探测器
pub struct TsProbe;

impl FormatProbe for TsProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<crate::probe::ProbeScore> {
        // 检查连续的 TS 同步字节
        if data.len() >= TS_PACKET_SIZE * 2 {
            let mut pos = 0;
            while pos < data.len().min(1024) {
                if data[pos] == TS_SYNC_BYTE {
                    let mut sync_count = 0;
                    let mut check_pos = pos;
                    while check_pos + TS_PACKET_SIZE <= data.len() {
                        if data[check_pos] == TS_SYNC_BYTE {
                            sync_count += 1;
                            check_pos += TS_PACKET_SIZE;
                        } else {
                            break;
                        }
                    }
                    if sync_count >= 3 {
                        return Some(crate::probe::SCORE_MAX);
                    }
                    if sync_count >= 2 {
                        return Some(crate::probe::SCORE_MAX - 10);
                    }
                }
                pos += 1;
            }
        }

        // 扩展名
        if let Some(name) = filename {
            if let Some(ext) = name.rsplit('.').next() {
                let ext_lower = ext.to_lowercase();
                if matches!(ext_lower.as_str(), "ts" | "m2ts" | "mts") {
                    return Some(crate::probe::SCORE_EXTENSION);
                }
            }
        }

        None
    }

    fn format_id(&self) -> FormatId {
        FormatId::MpegTs
    }
}
