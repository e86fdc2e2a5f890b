use crate::core::{DecoderConfig, MediaSource, PlayerError, Result};
use crate::player::media_decoder::MediaComponents;
use crossbeam_channel::{bounded, Receiver};
use log::{error, info};
use std::thread;

/// 异步打开媒体：容器探测、解码器创建都在子线程中完成
///
/// 网络流的打开可能耗时数秒，这样调用方（渲染循环）不会被卡住。
///
/// ```ignore
/// let rx = MediaOpener::spawn(source, config.clone());
///
/// // 在每帧 update 中检查结果
/// if let Ok(result) = rx.try_recv() {
///     match result {
///         Ok(components) => { player.play_components("stream", components)?; }
///         Err(e) => error!("打开失败: {}", e),
///     }
/// }
/// ```
pub struct MediaOpener;

impl MediaOpener {
    /// 通过 FFmpeg 在子线程中打开媒体源
    pub fn spawn(source: MediaSource, config: DecoderConfig) -> Receiver<Result<MediaComponents>> {
        let label = format!("{:?}", source);
        Self::spawn_with(label, move || crate::player::ffmpeg::open_components(source, &config))
    }

    /// 在子线程中运行任意的组件构建函数，结果通过通道返回
    pub fn spawn_with<F>(label: String, build: F) -> Receiver<Result<MediaComponents>>
    where
        F: FnOnce() -> Result<MediaComponents> + Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);

        let spawned = thread::Builder::new()
            .name("myy-opener".to_string())
            .spawn({
                let result_tx = result_tx.clone();
                let label = label.clone();
                move || {
                    info!("🔨 开始在子线程中打开媒体: {}", label);
                    let result = build();
                    match &result {
                        Ok(_) => info!("✅ 媒体打开完成: {}", label),
                        Err(e) => error!("❌ 媒体打开失败: {} ({})", label, e),
                    }
                    // 接收端已丢弃时结果直接释放
                    let _ = result_tx.send(result);
                }
            });

        if let Err(e) = spawned {
            error!("❌ 无法启动打开线程: {}", e);
            let _ = result_tx.send(Err(PlayerError::OpenError(format!("无法启动打开线程: {}", e))));
        }
        result_rx
    }
}
