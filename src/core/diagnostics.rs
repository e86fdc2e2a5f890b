use crate::core::{BufferInfo, StreamKind};
use log::{debug, info, warn};

/// 解码核心对外发出的诊断事件
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// 媒体打开完成，解码线程已启动
    Opened { description: String, info: BufferInfo },
    /// 数据包源已耗尽（后续只能消耗已排队的包）
    SourceExhausted { video_queued: usize, audio_queued: usize },
    /// 某个流的解码已结束（只会发出一次）
    StreamEnded { stream: StreamKind, frames: u64 },
    /// 音频解码跟不上，插入了静音，视频时间戳偏移增加
    AudioUnderrun { timestamp_offset: f64 },
    /// 致命错误，解码线程提前退出
    Fatal { reason: String },
    /// 资源已全部释放
    Closed,
}

/// 诊断事件接收端，在构造解码器时注入
///
/// 会在解码线程和调用线程上被调用，实现需要是线程安全的
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: DecoderEvent);
}

/// 默认实现：转发到 log 门面
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, event: DecoderEvent) {
        match event {
            DecoderEvent::Opened { description, info } => {
                info!(
                    "✅ 媒体已打开: {} ({}x{}, {} 槽位, 音频 {} Hz/{} 声道)",
                    description,
                    info.video_width,
                    info.video_height,
                    info.ring_slots,
                    info.audio_sample_rate,
                    info.audio_channels
                );
            }
            DecoderEvent::SourceExhausted { video_queued, audio_queued } => {
                info!("📄 数据包源已耗尽（剩余队列: 视频 {}，音频 {}）", video_queued, audio_queued);
            }
            DecoderEvent::StreamEnded { stream, frames } => {
                info!("🏁 {}流解码结束，共 {} 帧", stream.as_str(), frames);
            }
            DecoderEvent::AudioUnderrun { timestamp_offset } => {
                debug!("🔇 音频欠载，插入静音（时间戳偏移 {:.3}s）", timestamp_offset);
            }
            DecoderEvent::Fatal { reason } => {
                warn!("❌ 解码线程因致命错误退出: {}", reason);
            }
            DecoderEvent::Closed => {
                info!("🛑 解码器资源已释放");
            }
        }
    }
}
