//! luan - 时间戳故障注入命令行工具
//!
//! 读取媒体文件, 重封装为同格式的输出文件, 并按指定方法
//! 在一小部分数据包上损坏时长/时间戳元数据.

mod logging;

use clap::Parser;
use std::process;

use luan_core::MediaType;
use luan_fault::FaultPlan;
use luan_fault::plan::{DEFAULT_AUDIO_QUOTA, DEFAULT_VIDEO_QUOTA};
use luan_format::stream::StreamParams;
use luan_format::{FormatId, FormatRegistry, IoContext, Muxer, Stream};

#[derive(Parser, Debug)]
#[command(name = "luan", version, about = "给媒体文件注入损坏的时长元数据")]
#[command(allow_negative_numbers = true)]
struct Cli {
    /// 输入媒体文件路径
    #[arg(short, long)]
    input: Option<String>,

    /// 输出媒体文件路径 (容器格式必须与输入一致)
    #[arg(short, long)]
    output: Option<String>,

    /// 目标时长 (整数秒; speed 方法要求大于 0)
    #[arg(short, long)]
    duration: Option<String>,

    /// 故障方法: video / audio / both / speed
    #[arg(short, long)]
    method: Option<String>,

    /// 视频流扣留配额 (video/both 方法)
    #[arg(long, value_name = "N")]
    video_quota: Option<usize>,

    /// 音频流扣留配额 (audio/both 方法)
    #[arg(long, value_name = "N")]
    audio_quota: Option<usize>,

    /// 覆盖输出文件
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    logging::init("luan-cli", cli.verbose);

    // 不带任何参数: 打印横幅后正常退出
    if cli.input.is_none() && cli.output.is_none() && cli.duration.is_none() && cli.method.is_none()
    {
        print_banner();
        return;
    }

    // 四个必需参数缺一不可
    let (Some(input_path), Some(output_path), Some(duration), Some(method)) =
        (&cli.input, &cli.output, &cli.duration, &cli.method)
    else {
        eprintln!("错误: 必须同时指定 -i/-o/-d/-m 四个参数");
        print_banner();
        process::exit(1);
    };

    // 参数校验一次完成, 失败则不做任何 I/O
    let duration_secs: i64 = match duration.parse() {
        Ok(d) => d,
        Err(_) => {
            eprintln!("错误: 无效参数: 时长必须是整数秒: '{duration}'");
            print_banner();
            process::exit(1);
        }
    };
    let plan = match FaultPlan::with_quotas(
        method,
        duration_secs,
        cli.video_quota.unwrap_or(DEFAULT_VIDEO_QUOTA),
        cli.audio_quota.unwrap_or(DEFAULT_AUDIO_QUOTA),
    ) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("错误: {e}");
            print_banner();
            process::exit(1);
        }
    };

    // 检查输出文件是否已存在
    if !cli.overwrite && std::path::Path::new(output_path).exists() {
        eprintln!("错误: 输出文件已存在 '{output_path}', 使用 -y 覆盖");
        process::exit(1);
    }

    eprintln!(
        "luan 版本 {} -- 时间戳故障注入工具",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("输入: {input_path}");
    eprintln!("输出: {output_path}");

    // 初始化格式注册表
    let mut format_registry = FormatRegistry::new();
    luan_format::register_all(&mut format_registry);

    // 打开并探测输入
    let mut input_io = match IoContext::open_read(input_path) {
        Ok(io) => io,
        Err(e) => {
            eprintln!("错误: 无法打开输入文件 '{input_path}': {e}");
            process::exit(1);
        }
    };

    let mut demuxer = match format_registry.open_input(&mut input_io, Some(input_path)) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("错误: 无法打开输入格式: {e}");
            process::exit(1);
        }
    };

    dump_input(demuxer.as_ref());

    // 输出容器必须与输入同格式 (不支持格式转换)
    let output_format = match FormatId::from_filename(output_path) {
        Some(f) => f,
        None => {
            eprintln!("错误: 无法从输出文件名确定格式: '{output_path}'");
            process::exit(1);
        }
    };
    if output_format != demuxer.format_id() {
        eprintln!(
            "错误: 输出格式 ({output_format}) 必须与输入格式 ({}) 一致",
            demuxer.format_id()
        );
        process::exit(1);
    }

    // 创建输出
    let mut output_io = match IoContext::open_write(output_path) {
        Ok(io) => io,
        Err(e) => {
            eprintln!("错误: 无法创建输出文件 '{output_path}': {e}");
            process::exit(1);
        }
    };

    let mut muxer: Box<dyn Muxer> = match format_registry.create_muxer(output_format) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("错误: 无法创建输出格式封装器: {e}");
            process::exit(1);
        }
    };

    // 重封装 + 故障注入
    match luan_fault::run(
        demuxer.as_mut(),
        &mut input_io,
        muxer.as_mut(),
        &mut output_io,
        &plan,
    ) {
        Ok(stats) => {
            eprintln!();
            eprintln!("完成:");
            eprintln!("  输出数据包: {}", stats.packets_written);
            eprintln!(
                "  输出负载: {} 字节 ({:.2} KB)",
                stats.bytes_written,
                stats.bytes_written as f64 / 1024.0
            );
            if stats.held_back > 0 {
                eprintln!("  末尾重注入: {} 个扣留包", stats.held_back);
            }
        }
        Err(e) => {
            eprintln!("错误: {e}");
            process::exit(1);
        }
    }
}

/// 打印输入容器与各条流的概要 (对标 av_dump_format)
fn dump_input(demuxer: &dyn luan_format::Demuxer) {
    let duration = demuxer
        .duration()
        .map_or("未知".to_string(), |d| format!("{d:.3}s"));
    eprintln!(
        "输入格式: {}, {} 条流, 时长: {duration}",
        demuxer.name(),
        demuxer.streams().len()
    );
    for stream in demuxer.streams() {
        eprintln!("  {}", describe_stream(stream));
    }
}

/// 单条流的描述行
fn describe_stream(stream: &Stream) -> String {
    let extra = match (&stream.params, stream.media_type) {
        (StreamParams::Video(v), MediaType::Video) if v.width > 0 => {
            format!(", {}x{}", v.width, v.height)
        }
        (StreamParams::Audio(a), MediaType::Audio) => {
            format!(", {} Hz, {} 声道", a.sample_rate, a.channels)
        }
        _ => String::new(),
    };
    format!(
        "流 #{}: {} ({}), 时间基 {}{extra}",
        stream.index, stream.media_type, stream.codec_id, stream.time_base
    )
}

/// 打印用法横幅
fn print_banner() {
    println!(
        "luan 版本 {} -- 时间戳故障注入工具",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("给媒体文件制造损坏的时长/时间戳元数据, 输出容器格式与输入保持一致.");
    println!();
    println!("用法: luan -i <输入文件> -o <输出文件> -d <秒数> -m <方法>");
    println!();
    println!("选项:");
    println!("  -i <文件>          输入媒体文件路径");
    println!("  -o <文件>          输出媒体文件路径 (格式须与输入一致)");
    println!("  -d <秒数>          目标时长 (非负整数; speed 要求 > 0)");
    println!("  -m <方法>          video / audio / both / speed");
    println!("  --video-quota <N>  视频流扣留配额 (默认 3)");
    println!("  --audio-quota <N>  音频流扣留配额 (默认 1)");
    println!("  -y                 覆盖输出文件");
    println!("  -v / -vv           提升日志级别");
    println!();
    println!("示例:");
    println!("  luan -i in.flv -o out.flv -d 5 -m video   扣留前 3 个视频包并后移 5s 重注入");
    println!("  luan -i in.flv -o out.flv -d 5 -m both    视频和音频流同时注入");
    println!("  luan -i in.flv -o out.flv -d 20 -m speed  时间戳整体缩放到 20s");
    println!();
    println!("使用 --help 查看完整用法.");
}
