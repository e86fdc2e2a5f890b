use crate::core::{
    BufferInfo, DecoderConfig, DecoderEvent, DecoderState, DiagnosticSink, LogSink, MediaSource, PlayerError,
    Result,
};
use crate::player::audio_buffer::AudioBuffer;
use crate::player::codec::{AudioStage, VideoStage};
use crate::player::decode_thread::{log_ctx, DecodeShared, DecodeThread};
use crate::player::frame_ring::{FrameRing, VideoFrameRef};
use crate::player::packet_queue::PacketQueues;
use crate::player::source::PacketSource;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// 打开媒体所需的全部组件：数据包源 + 视频流水线 + 可选的音频流水线
pub struct MediaComponents {
    pub source: Box<dyn PacketSource>,
    pub video: Box<dyn VideoStage>,
    pub audio: Option<Box<dyn AudioStage>>,
}

/// next_video_frame 的结果
pub enum NextFrame<'a> {
    /// 读指针已推进，这是新的当前帧
    Ready(VideoFrameRef<'a>),
    /// 没有新帧，仍然是上一帧（读指针未推进）
    Pending(VideoFrameRef<'a>),
    /// 没有可显示的帧：视频已结束并排空，或者还没有解出任何帧
    None,
}

impl<'a> NextFrame<'a> {
    pub fn is_ready(&self) -> bool {
        matches!(self, NextFrame::Ready(_))
    }

    pub fn into_frame(self) -> Option<VideoFrameRef<'a>> {
        match self {
            NextFrame::Ready(frame) | NextFrame::Pending(frame) => Some(frame),
            NextFrame::None => None,
        }
    }
}

struct Session {
    thread: DecodeThread,
    shared: Arc<DecodeShared>,
    audio: Option<AudioBuffer>,
    info: BufferInfo,
}

/// 带后台解码线程的媒体解码器
///
/// 后台线程持续把视频帧解码进固定大小的环形缓冲；音频在调用
/// update_audio_buffer 时于调用线程上按需解码。打开之后使用方
/// 不会收到错误，只会看到"没有数据"（NextFrame::None 或静音）
pub struct MediaDecoder {
    config: DecoderConfig,
    sink: Arc<dyn DiagnosticSink>,
    state: DecoderState,
    session: Option<Session>,
}

impl Default for MediaDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default(), Arc::new(LogSink))
    }
}

impl MediaDecoder {
    pub fn new(config: DecoderConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            config,
            sink,
            state: DecoderState::Created,
            session: None,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// 用已经构建好的组件打开
    pub fn open(&mut self, components: MediaComponents) -> Result<BufferInfo> {
        self.open_with(|_| Ok(components))
    }

    /// 通过 FFmpeg 打开媒体源
    pub fn open_source(&mut self, source: MediaSource) -> Result<BufferInfo> {
        self.open_with(|config| crate::player::ffmpeg::open_components(source, config))
    }

    /// 在 Opening 状态下调用 `build` 构建组件，然后分配缓冲并启动解码线程
    pub fn open_with<F>(&mut self, build: F) -> Result<BufferInfo>
    where
        F: FnOnce(&DecoderConfig) -> Result<MediaComponents>,
    {
        match self.state {
            DecoderState::Created | DecoderState::Failed => {}
            DecoderState::Closed => return Err(PlayerError::Closed),
            _ => return Err(PlayerError::AlreadyOpen),
        }

        self.state = DecoderState::Opening;
        match self.build_and_start(build) {
            Ok(info) => {
                self.state = DecoderState::Ready;
                Ok(info)
            }
            Err(e) => {
                warn!("❌ 打开媒体失败: {}", e);
                self.state = DecoderState::Failed;
                Err(e)
            }
        }
    }

    fn build_and_start<F>(&mut self, build: F) -> Result<BufferInfo>
    where
        F: FnOnce(&DecoderConfig) -> Result<MediaComponents>,
    {
        self.config.validate()?;
        let components = build(&self.config)?;
        self.start_session(components)
    }

    fn start_session(&mut self, components: MediaComponents) -> Result<BufferInfo> {
        let MediaComponents { source, video, audio } = components;
        let description = source.description();

        let streams = source.streams();
        if let Some(v) = &streams.video {
            info!(
                "{} 🎞 视频流: {} {}x{}, 时间基 {:.6}",
                log_ctx(),
                v.codec,
                v.width,
                v.height,
                v.time_base
            );
        }
        match (&streams.audio, audio.is_some()) {
            (Some(a), true) => info!(
                "{} 🔊 音频流: {} {} Hz, {} 声道",
                log_ctx(),
                a.codec,
                a.sample_rate,
                a.channels
            ),
            (Some(a), false) => warn!("{} ⚠ 音频流 {} 没有对应的解码流水线，音频包将被丢弃", log_ctx(), a.codec),
            (None, _) => debug!("{} 无音频流，仅播放视频", log_ctx()),
        }

        let layout = video.layout();
        if layout.frame_size() == 0 {
            return Err(PlayerError::DecoderInit(format!(
                "无效的视频尺寸 {}x{}",
                layout.width, layout.height
            )));
        }

        let audio = audio.map(|stage| AudioBuffer::new(stage, &self.config)).transpose()?;
        let ring = FrameRing::new(self.config.ring_slots, layout.frame_size())?;
        let has_audio = audio.is_some();
        let packets = PacketQueues::new(source, has_audio, self.sink.clone());
        let shared = Arc::new(DecodeShared::new(ring, packets, has_audio, self.sink.clone()));

        let info = BufferInfo {
            video_width: layout.width,
            video_height: layout.height,
            video_stride: layout.stride(),
            video_frame_size: layout.frame_size(),
            ring_slots: self.config.ring_slots,
            audio_buffer_size: audio.as_ref().map(|a| a.size()).unwrap_or(0),
            audio_channels: audio.as_ref().map(|a| a.format().channels).unwrap_or(0),
            audio_sample_rate: audio.as_ref().map(|a| a.format().sample_rate).unwrap_or(0),
        };

        let thread = DecodeThread::start(shared.clone(), video)?;
        self.sink.record(DecoderEvent::Opened {
            description,
            info: info.clone(),
        });

        self.session = Some(Session {
            thread,
            shared,
            audio,
            info: info.clone(),
        });
        Ok(info)
    }

    pub fn buffer_info(&self) -> Option<&BufferInfo> {
        self.session.as_ref().map(|s| &s.info)
    }

    pub fn state(&self) -> DecoderState {
        match &self.session {
            Some(session) => {
                let shared = &session.shared;
                if shared.is_video_ended() || (shared.has_audio() && shared.is_audio_ended()) {
                    DecoderState::Draining
                } else {
                    DecoderState::Ready
                }
            }
            None => self.state,
        }
    }

    /// 取下一帧，不会等待解码
    pub fn next_video_frame(&mut self) -> NextFrame<'_> {
        let Some(session) = &self.session else {
            return NextFrame::None;
        };
        let ring = &session.shared.ring;
        if let Some(frame) = ring.advance() {
            return NextFrame::Ready(frame);
        }
        if ring.is_ended() || ring.written() == 0 {
            NextFrame::None
        } else {
            NextFrame::Pending(ring.current())
        }
    }

    /// 最近一次交出的帧；还没有交出过任何帧时返回 None
    pub fn current_frame(&self) -> Option<VideoFrameRef<'_>> {
        let ring = &self.session.as_ref()?.shared.ring;
        if ring.displayed() == 0 {
            return None;
        }
        Some(ring.current())
    }

    /// 当前帧的时间戳（秒）加上音频补偿偏移
    pub fn current_frame_timestamp(&self) -> f64 {
        match &self.session {
            Some(session) => session.shared.ring.current().timestamp() + self.timestamp_offset(),
            None => 0.0,
        }
    }

    pub fn timestamp_offset(&self) -> f64 {
        self.session
            .as_ref()
            .and_then(|s| s.audio.as_ref())
            .map(|a| a.timestamp_offset())
            .unwrap_or(0.0)
    }

    /// 解码下一块音频并返回；没有音频流时返回 None
    pub fn update_audio_buffer(&mut self) -> Option<&[u8]> {
        let session = self.session.as_mut()?;
        let audio = session.audio.as_mut()?;
        Some(audio.refill(&session.shared))
    }

    /// 最近一次 update_audio_buffer 的结果
    pub fn audio_buffer(&self) -> Option<&[u8]> {
        self.session.as_ref()?.audio.as_ref().map(|a| a.data())
    }

    pub fn is_buffered(&self) -> bool {
        self.session.as_ref().map(|s| s.shared.ring.is_buffered()).unwrap_or(false)
    }

    pub fn has_frame_buffered(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.shared.ring.has_frame_buffered())
            .unwrap_or(false)
    }

    /// 视频已结束并且所有帧都已取走
    pub fn is_finished(&self) -> bool {
        match &self.session {
            Some(session) => session.shared.ring.is_drained(),
            None => self.state == DecoderState::Closed,
        }
    }

    /// 阻塞直到缓冲就绪（满，或视频已结束），超时返回 false
    pub fn wait_until_buffered(&self, timeout: Duration) -> bool {
        match &self.session {
            Some(session) => session.shared.ring.wait_until_buffered(timeout),
            None => false,
        }
    }

    /// 停止解码线程并按分配的逆序释放所有资源，可重复调用
    pub fn close(&mut self) {
        let Some(session) = self.session.take() else {
            if self.state != DecoderState::Closed {
                self.state = DecoderState::Closed;
            }
            return;
        };
        self.state = DecoderState::Closed;
        info!("{} 🛑 关闭解码器", log_ctx());

        let Session {
            thread,
            shared,
            audio,
            info: _,
        } = session;
        let video = thread.stop();

        match Arc::try_unwrap(shared) {
            Ok(shared) => {
                let (ring, packets) = shared.into_parts();
                drop(ring);
                drop(audio);
                drop(video);
                let source = packets.into_source();
                debug!("释放数据包源: {}", source.description());
                drop(source);
            }
            Err(_) => {
                warn!("{} ⚠ 共享状态仍被引用，延后释放", log_ctx());
                drop(audio);
                drop(video);
            }
        }

        self.sink.record(DecoderEvent::Closed);
    }
}

impl Drop for MediaDecoder {
    fn drop(&mut self) {
        self.close();
    }
}
