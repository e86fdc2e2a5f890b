use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use myy_decoder::core::{DecoderConfig, LogSink, MediaSource};
use myy_decoder::player::{FrameUpdate, MediaOpener, VideoPlayer};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 无界面解码：按墙钟驱动播放器，输出帧和音频统计
#[derive(Parser, Debug)]
#[command(name = "myy-decode", version, about)]
struct Args {
    /// 本地文件路径或网络流 URL；省略时从标准输入读取字节流
    input: Option<String>,

    /// JSON 配置文件
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖环形缓冲槽位数
    #[arg(long)]
    ring_slots: Option<usize>,

    /// 解码到这么多帧后停止
    #[arg(long)]
    max_frames: Option<u64>,

    /// 渲染节拍（毫秒）
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,
}

fn load_config(args: &Args) -> Result<DecoderConfig> {
    let mut config = match &args.config {
        Some(path) => DecoderConfig::from_json_file(path)
            .with_context(|| format!("无法加载配置 {}", path.display()))?,
        None => DecoderConfig::default(),
    };
    if let Some(slots) = args.ring_slots {
        config = config.with_ring_slots(slots);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let source = match &args.input {
        Some(input) => MediaSource::from_url(input),
        None => MediaSource::Reader(Box::new(std::io::stdin())),
    };
    let name = args.input.clone().unwrap_or_else(|| "stdin".to_string());

    // 网络流的探测可能很慢，放到打开线程里
    let components = MediaOpener::spawn(source, config.clone())
        .recv()
        .context("打开线程意外退出")??;

    let mut player = VideoPlayer::new(config, Arc::new(LogSink));
    player.set_on_video_size(|width, height| info!("📐 视频尺寸: {}x{}", width, height));
    player.set_on_completion(|name| info!("🏁 {} 播放结束", name));
    let info = player.play_components(name, components)?;

    if !player.decoder().wait_until_buffered(Duration::from_secs(5)) {
        warn!("⚠️ 5 秒内缓冲未满，继续播放");
    }

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let started = Instant::now();
    let mut frames = 0u64;
    let mut held = 0u64;
    let mut waiting = 0u64;
    let mut audio_bytes = 0usize;

    loop {
        match player.update() {
            FrameUpdate::NewFrame => {
                frames += 1;
                if let Some(frame) = player.frame() {
                    debug!(
                        "🖼️ 帧 #{} pts={:.3}s ({} 字节)",
                        frame.sequence(),
                        frame.timestamp(),
                        frame.data().len()
                    );
                }
            }
            FrameUpdate::Held => held += 1,
            FrameUpdate::Waiting => waiting += 1,
            FrameUpdate::Completed | FrameUpdate::Idle => break,
        }

        if info.has_audio() {
            if let Some(chunk) = player.audio_chunk() {
                audio_bytes += chunk.len();
            }
        }

        if args.max_frames.is_some_and(|max| frames >= max) {
            info!("⏹️ 已达到 {} 帧上限", frames);
            break;
        }
        thread::sleep(tick);
    }

    info!(
        "📊 {:.2}s 内显示 {} 帧（保持 {}，等待 {}），音频 {} 字节，时间戳补偿 {:.3}s",
        started.elapsed().as_secs_f64(),
        frames,
        held,
        waiting,
        audio_bytes,
        player.decoder().timestamp_offset()
    );
    player.stop();
    Ok(())
}
