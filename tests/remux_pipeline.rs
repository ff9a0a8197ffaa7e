//! 基线重封装管线集成测试.
//!
//! 用配额为 0 的退化计划验证纯重封装路径: 输出时间戳只经过
//! 时间基换算, 不发生任何故障注入; 同参数重复运行字节级一致.

use luan::core::LuanError;
use luan::fault::FaultPlan;
use luan::format::IoContext;
use luan_codec::Packet;

mod util;
use util::flv::{build_audio_tag, build_flv_header, build_metadata_tag, build_video_tag};
use util::ts;

/// 构造一个音视频 FLV 输入
fn build_input_flv() -> Vec<u8> {
    let mut data = build_flv_header(true, true);
    data.extend_from_slice(&build_metadata_tag(2.0));
    data.extend_from_slice(&build_video_tag(0, true, 0, &[0x11, 0x11]));
    data.extend_from_slice(&build_audio_tag(0, &[0xA1]));
    data.extend_from_slice(&build_video_tag(33, false, 10, &[0x22, 0x22]));
    data.extend_from_slice(&build_audio_tag(23, &[0xA2]));
    data.extend_from_slice(&build_video_tag(66, false, 0, &[0x33, 0x33]));
    data
}

/// 在临时目录中执行一次重封装, 返回输出文件字节
fn remux_file(input: &[u8], ext: &str, plan: &FaultPlan) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join(format!("in.{ext}"));
    let out_path = dir.path().join(format!("out.{ext}"));
    std::fs::write(&in_path, input).unwrap();

    let registry = luan::default_format_registry();
    let in_str = in_path.to_str().unwrap();
    let mut input_io = IoContext::open_read(in_str).unwrap();
    let mut demuxer = registry.open_input(&mut input_io, Some(in_str)).unwrap();
    let mut output_io = IoContext::open_write(out_path.to_str().unwrap()).unwrap();
    let mut muxer = registry.create_muxer(demuxer.format_id()).unwrap();

    luan::fault::run(
        demuxer.as_mut(),
        &mut input_io,
        muxer.as_mut(),
        &mut output_io,
        plan,
    )
    .unwrap();
    drop(output_io);

    std::fs::read(&out_path).unwrap()
}

/// 解出一段容器数据里的全部数据包
fn demux_all(data: Vec<u8>, name: &str) -> Vec<Packet> {
    let registry = luan::default_format_registry();
    let mut io = IoContext::new(Box::new(luan::format::io::MemoryBackend::from_data(data)));
    let mut demuxer = registry.open_input(&mut io, Some(name)).unwrap();

    let mut packets = Vec::new();
    loop {
        match demuxer.read_packet(&mut io) {
            Ok(pkt) => packets.push(pkt),
            Err(LuanError::Eof) => break,
            Err(e) => panic!("读取失败: {e}"),
        }
    }
    packets
}

#[test]
fn test_flv_零配额纯重封装保持时间戳() {
    let plan = FaultPlan::with_quotas("video", 5, 0, 0).unwrap();
    let output = remux_file(&build_input_flv(), "flv", &plan);

    let in_packets = demux_all(build_input_flv(), "in.flv");
    let out_packets = demux_all(output, "out.flv");

    assert_eq!(out_packets.len(), in_packets.len(), "包数应一致");
    for (a, b) in in_packets.iter().zip(&out_packets) {
        // FLV 两侧时间基相同 (1/1000), 换算是恒等变换
        assert_eq!(a.pts, b.pts);
        assert_eq!(a.dts, b.dts);
        assert_eq!(a.data, b.data, "负载不应被触碰");
    }
}

#[test]
fn test_mpegts_零配额纯重封装保持时间戳() {
    let plan = FaultPlan::with_quotas("video", 5, 0, 0).unwrap();
    let input = ts::build_minimal_ts();
    let output = remux_file(&input, "ts", &plan);

    let in_packets = demux_all(input, "in.ts");
    let out_packets = demux_all(output, "out.ts");

    assert_eq!(out_packets.len(), in_packets.len());
    for (a, b) in in_packets.iter().zip(&out_packets) {
        assert_eq!(a.pts, b.pts, "90kHz 恒等换算应保持 PTS");
        assert_eq!(a.dts, b.dts, "独立 DTS 应穿过容器往返");
        assert_eq!(a.data, b.data);
    }
}

#[test]
fn test_重复运行输出字节一致() {
    let plan = FaultPlan::new("video", 5).unwrap();
    let out1 = remux_file(&build_input_flv(), "flv", &plan);
    let out2 = remux_file(&build_input_flv(), "flv", &plan);
    assert_eq!(out1, out2, "同输入同参数必须产生字节级相同的输出");
}

#[test]
fn test_统计数据() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("in.flv");
    let out_path = dir.path().join("out.flv");
    std::fs::write(&in_path, build_input_flv()).unwrap();

    let registry = luan::default_format_registry();
    let in_str = in_path.to_str().unwrap();
    let mut input_io = IoContext::open_read(in_str).unwrap();
    let mut demuxer = registry.open_input(&mut input_io, Some(in_str)).unwrap();
    let mut output_io = IoContext::open_write(out_path.to_str().unwrap()).unwrap();
    let mut muxer = registry.create_muxer(demuxer.format_id()).unwrap();

    let plan = FaultPlan::new("video", 5).unwrap();
    let stats = luan::fault::run(
        demuxer.as_mut(),
        &mut input_io,
        muxer.as_mut(),
        &mut output_io,
        &plan,
    )
    .unwrap();

    // 5 个实时包 + 3 个扣留重注入
    assert_eq!(stats.packets_written, 8);
    assert_eq!(stats.held_back, 3);
    assert!(stats.bytes_written > 0);
}
