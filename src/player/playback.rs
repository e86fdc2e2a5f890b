use crate::core::{
    BufferInfo, DecoderConfig, DiagnosticSink, LogSink, MediaSource, PlaybackClock, PlaybackState, Result,
};
use crate::player::decode_thread::log_ctx;
use crate::player::frame_ring::VideoFrameRef;
use crate::player::media_decoder::{MediaComponents, MediaDecoder, NextFrame};
use log::{debug, info};
use std::sync::Arc;

/// 一次 update() 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUpdate {
    /// 不在播放状态
    Idle,
    /// 取到了新的一帧
    NewFrame,
    /// 当前帧超前于时钟，本次继续显示它
    Held,
    /// 解码线程还没跟上，继续显示上一帧（或还没有任何帧）
    Waiting,
    /// 视频已经播完
    Completed,
}

pub type CompletionListener = Box<dyn FnMut(&str) + Send>;
pub type SizeListener = Box<dyn FnMut(u32, u32) + Send>;

/// 播放驱动：把解码器接到一个墙钟上
///
/// 每个渲染节拍调用一次 update()；音频输出需要数据时调用 audio_chunk()
pub struct VideoPlayer {
    config: DecoderConfig,
    sink: Arc<dyn DiagnosticSink>,
    decoder: MediaDecoder,
    clock: PlaybackClock,
    state: PlaybackState,
    media_name: String,
    started: bool,
    hold_frame: bool,
    size_listener: Option<SizeListener>,
    completion_listener: Option<CompletionListener>,
}

impl Default for VideoPlayer {
    fn default() -> Self {
        Self::new(DecoderConfig::default(), Arc::new(LogSink))
    }
}

impl VideoPlayer {
    pub fn new(config: DecoderConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            decoder: MediaDecoder::new(config.clone(), sink.clone()),
            config,
            sink,
            clock: PlaybackClock::new(),
            state: PlaybackState::Idle,
            media_name: String::new(),
            started: false,
            hold_frame: false,
            size_listener: None,
            completion_listener: None,
        }
    }

    pub fn set_on_video_size<F>(&mut self, listener: F)
    where
        F: FnMut(u32, u32) + Send + 'static,
    {
        self.size_listener = Some(Box::new(listener));
    }

    pub fn set_on_completion<F>(&mut self, listener: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.completion_listener = Some(Box::new(listener));
    }

    /// 通过 FFmpeg 打开媒体源并开始播放
    pub fn play_source(&mut self, source: MediaSource) -> Result<BufferInfo> {
        let name = format!("{:?}", source);
        self.load(name, |decoder| decoder.open_source(source))
    }

    /// 用已构建好的组件开始播放（例如 MediaOpener 的结果）
    pub fn play_components(&mut self, name: impl Into<String>, components: MediaComponents) -> Result<BufferInfo> {
        self.load(name.into(), |decoder| decoder.open(components))
    }

    fn load<F>(&mut self, name: String, open: F) -> Result<BufferInfo>
    where
        F: FnOnce(&mut MediaDecoder) -> Result<BufferInfo>,
    {
        info!("{} 🎬 加载媒体: {}", log_ctx(), name);
        self.stop();
        // 每个媒体使用新的解码器实例
        self.decoder = MediaDecoder::new(self.config.clone(), self.sink.clone());
        let info = open(&mut self.decoder)?;

        if let Some(listener) = self.size_listener.as_mut() {
            listener(info.video_width, info.video_height);
        }
        self.media_name = name;
        self.state = PlaybackState::Playing;
        Ok(info)
    }

    /// 推进一个渲染节拍
    pub fn update(&mut self) -> FrameUpdate {
        if self.state != PlaybackState::Playing {
            return FrameUpdate::Idle;
        }
        if !self.started {
            // 第一次 update 时开始计时
            self.started = true;
            self.clock.set_time(0);
            self.clock.play();
        }

        let mut result = FrameUpdate::Held;
        if !self.hold_frame {
            result = match self.decoder.next_video_frame() {
                NextFrame::Ready(_) => FrameUpdate::NewFrame,
                NextFrame::Pending(_) => FrameUpdate::Waiting,
                NextFrame::None => FrameUpdate::Waiting,
            };
            if result == FrameUpdate::Waiting && self.decoder.is_finished() {
                self.complete();
                return FrameUpdate::Completed;
            }
        }

        self.hold_frame = false;
        let difference = self.current_timestamp_ms() - self.clock.now();
        if difference > self.config.frame_hold_threshold_ms {
            // 超前超过一帧，下一个节拍继续显示这一帧
            self.hold_frame = true;
        }
        result
    }

    fn complete(&mut self) {
        info!("{} 🏁 播放完成: {}", log_ctx(), self.media_name);
        self.state = PlaybackState::Completed;
        self.clock.pause();
        if let Some(listener) = self.completion_listener.as_mut() {
            listener(&self.media_name);
        }
    }

    /// 当前应显示的帧
    pub fn frame(&self) -> Option<VideoFrameRef<'_>> {
        self.decoder.current_frame()
    }

    /// 取下一块音频；不在播放状态时返回 None
    pub fn audio_chunk(&mut self) -> Option<&[u8]> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        self.decoder.update_audio_buffer()
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            debug!("{} ⏸ 暂停", log_ctx());
            self.state = PlaybackState::Paused;
            self.clock.pause();
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            debug!("{} ▶ 恢复", log_ctx());
            self.state = PlaybackState::Playing;
            if self.started {
                self.clock.play();
            }
        }
    }

    pub fn play(&mut self) {
        self.resume();
    }

    /// 停止播放并释放解码器
    pub fn stop(&mut self) {
        if self.state != PlaybackState::Idle {
            info!("{} ⏹️  停止播放", log_ctx());
        }
        self.decoder.close();
        self.clock.pause();
        self.clock.set_time(0);
        self.started = false;
        self.hold_frame = false;
        if self.state != PlaybackState::Idle {
            self.state = PlaybackState::Stopped;
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_buffered(&self) -> bool {
        self.decoder.is_buffered()
    }

    /// 当前帧时间戳（毫秒，含音频补偿）
    pub fn current_timestamp_ms(&self) -> i64 {
        (self.decoder.current_frame_timestamp() * 1000.0) as i64
    }

    pub fn decoder(&self) -> &MediaDecoder {
        &self.decoder
    }
}
