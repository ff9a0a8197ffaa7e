//! MPEG-TS 测试数据构造.

pub const TS_PACKET_SIZE: usize = 188;
pub const TS_SYNC_BYTE: u8 = 0x47;

/// 普通 TS 包 (无 adaptation field)
pub fn build_ts_packet(pid: u16, pusi: bool, payload: &[u8]) -> [u8; TS_PACKET_SIZE] {
    let mut pkt = [0xFFu8; TS_PACKET_SIZE];
    pkt[0] = TS_SYNC_BYTE;
    pkt[1] = if pusi { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
    pkt[2] = pid as u8;
    pkt[3] = 0x10; // AFC=01, CC=0
    let n = payload.len().min(TS_PACKET_SIZE - 4);
    pkt[4..4 + n].copy_from_slice(&payload[..n]);
    pkt
}

/// 带 adaptation field 的 TS 包 (可设置 random_access)
pub fn build_ts_packet_with_af(
    pid: u16,
    pusi: bool,
    random_access: bool,
    payload: &[u8],
) -> [u8; TS_PACKET_SIZE] {
    let mut pkt = [0xFFu8; TS_PACKET_SIZE];
    pkt[0] = TS_SYNC_BYTE;
    pkt[1] = if pusi { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
    pkt[2] = pid as u8;
    pkt[3] = 0x30; // AFC=11
    let af_flags = if random_access { 0x40 } else { 0x00 };
    let payload_space = TS_PACKET_SIZE - 4 - 2;
    let n = payload.len().min(payload_space);
    let stuffing = payload_space - n;
    pkt[4] = (1 + stuffing) as u8;
    pkt[5] = af_flags;
    for i in 0..stuffing {
        pkt[6 + i] = 0xFF;
    }
    let start = 6 + stuffing;
    pkt[start..start + n].copy_from_slice(&payload[..n]);
    pkt
}

/// 编码 33-bit 时间戳到 5 字节 (prefix 为高 4 位标志)
pub fn encode_ts(prefix: u8, v: u64) -> [u8; 5] {
    [
        (prefix << 4) | ((((v >> 30) as u8) & 0x07) << 1) | 0x01,
        (v >> 22) as u8,
        0x01 | ((((v >> 15) as u8) & 0x7F) << 1),
        (v >> 7) as u8,
        0x01 | (((v as u8) & 0x7F) << 1),
    ]
}

/// PES 包 (可选 PTS/DTS)
pub fn build_pes(stream_id: u8, pts: Option<u64>, dts: Option<u64>, data: &[u8]) -> Vec<u8> {
    let mut pes = Vec::new();
    pes.extend_from_slice(&[0x00, 0x00, 0x01]);
    pes.push(stream_id);
    let hdr_ext = match (pts, dts) {
        (Some(_), Some(_)) => 10,
        (Some(_), None) => 5,
        _ => 0,
    };
    let pes_len = 3 + hdr_ext + data.len();
    pes.push((pes_len >> 8) as u8);
    pes.push(pes_len as u8);
    pes.push(0x80); // marker
    pes.push(match (pts, dts) {
        (Some(_), Some(_)) => 0xC0,
        (Some(_), None) => 0x80,
        _ => 0x00,
    });
    pes.push(hdr_ext as u8);
    if let (Some(p), Some(d)) = (pts, dts) {
        pes.extend_from_slice(&encode_ts(0x3, p));
        pes.extend_from_slice(&encode_ts(0x1, d));
    } else if let Some(p) = pts {
        pes.extend_from_slice(&encode_ts(0x2, p));
    }
    pes.extend_from_slice(data);
    pes
}

/// PAT (单节目)
pub fn build_pat(pmt_pid: u16) -> [u8; TS_PACKET_SIZE] {
    let mut s = Vec::new();
    s.push(0x00); // pointer
    s.push(0x00); // table_id
    let len: u16 = 13;
    s.push(0xB0 | ((len >> 8) as u8 & 0x0F));
    s.push(len as u8);
    s.extend_from_slice(&[0x00, 0x01]); // ts_id
    s.push(0xC1);
    s.push(0x00);
    s.push(0x00);
    s.push(0x00);
    s.push(0x01); // program_number=1
    s.push(0xE0 | ((pmt_pid >> 8) as u8 & 0x1F));
    s.push(pmt_pid as u8);
    s.extend_from_slice(&[0x00; 4]); // CRC (解析端不校验)
    build_ts_packet(0x0000, true, &s)
}

/// PMT
pub fn build_pmt(pmt_pid: u16, entries: &[(u8, u16)]) -> [u8; TS_PACKET_SIZE] {
    let mut s = Vec::new();
    s.push(0x00); // pointer
    s.push(0x02); // table_id
    let sec_len = 9 + entries.len() * 5 + 4;
    s.push(0xB0 | ((sec_len >> 8) as u8 & 0x0F));
    s.push(sec_len as u8);
    s.extend_from_slice(&[0x00, 0x01]); // program_number
    s.push(0xC1);
    s.push(0x00);
    s.push(0x00);
    let pcr_pid = entries.first().map_or(0x1FFF, |e| e.1);
    s.push(0xE0 | ((pcr_pid >> 8) as u8 & 0x1F));
    s.push(pcr_pid as u8);
    s.extend_from_slice(&[0xF0, 0x00]); // program_info_length=0
    for &(st, pid) in entries {
        s.push(st);
        s.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
        s.push(pid as u8);
        s.extend_from_slice(&[0xF0, 0x00]);
    }
    s.extend_from_slice(&[0x00; 4]); // CRC
    build_ts_packet(pmt_pid, true, &s)
}

/// 带 H.264 + AAC 的最小 TS 流 (4 个 PES)
pub fn build_minimal_ts() -> Vec<u8> {
    let pmt_pid: u16 = 0x100;
    let v_pid: u16 = 0x101;
    let a_pid: u16 = 0x102;

    let mut ts = Vec::new();
    ts.extend_from_slice(&build_pat(pmt_pid));
    ts.extend_from_slice(&build_pmt(pmt_pid, &[(0x1B, v_pid), (0x0F, a_pid)]));

    // 视频关键帧 PTS=93600 DTS=90000 (独立 DTS)
    let v1 = build_pes(0xE0, Some(93600), Some(90000), &[0xDE, 0xAD, 0xBE, 0xEF]);
    ts.extend_from_slice(&build_ts_packet_with_af(v_pid, true, true, &v1));

    // 音频 PTS=90000
    let a1 = build_pes(0xC0, Some(90000), None, &[0xCA, 0xFE]);
    ts.extend_from_slice(&build_ts_packet(a_pid, true, &a1));

    // 视频 P-frame PTS=97200
    let v2 = build_pes(0xE0, Some(97200), None, &[0x11, 0x22, 0x33]);
    ts.extend_from_slice(&build_ts_packet_with_af(v_pid, true, false, &v2));

    // 音频 PTS=93600
    let a2 = build_pes(0xC0, Some(93600), None, &[0x44, 0x55]);
    ts.extend_from_slice(&build_ts_packet(a_pid, true, &a2));

    ts
}
