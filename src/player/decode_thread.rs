use crate::core::{DecoderEvent, DiagnosticSink, PlayerError, Result, StreamKind};
use crate::player::codec::{VideoStage, VideoStep};
use crate::player::frame_ring::FrameRing;
use crate::player::packet_queue::PacketQueues;
use log::{debug, error, info, warn};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 解码线程与使用方共享的状态
///
/// 环形缓冲（含视频结束标志）、数据包队列、音频结束标志
pub struct DecodeShared {
    pub ring: FrameRing,
    pub packets: PacketQueues,
    has_audio: bool,
    audio_ended: AtomicBool,
    sink: Arc<dyn DiagnosticSink>,
}

impl DecodeShared {
    pub fn new(ring: FrameRing, packets: PacketQueues, has_audio: bool, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            ring,
            packets,
            has_audio,
            // 没有音频流时视为已结束
            audio_ended: AtomicBool::new(!has_audio),
            sink,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    pub fn is_video_ended(&self) -> bool {
        self.ring.is_ended()
    }

    pub fn is_audio_ended(&self) -> bool {
        self.audio_ended.load(Ordering::Acquire)
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    /// 视频解码结束（只上报一次）
    pub fn end_video(&self, frames: u64) {
        if self.ring.mark_ended() {
            self.sink.record(DecoderEvent::StreamEnded {
                stream: StreamKind::Video,
                frames,
            });
        }
    }

    /// 音频解码结束（只上报一次）
    pub fn end_audio(&self, units: u64) {
        if !self.audio_ended.swap(true, Ordering::AcqRel) {
            self.sink.record(DecoderEvent::StreamEnded {
                stream: StreamKind::Audio,
                frames: units,
            });
        }
    }

    /// 致命错误：两个结束标志都强制置位，使用方继续排空已有数据
    pub fn fail(&self, err: &PlayerError) {
        error!("{} ❌ 解码致命错误: {}", log_ctx(), err);
        self.sink.record(DecoderEvent::Fatal {
            reason: err.to_string(),
        });
        self.force_end();
    }

    /// 关闭时强制结束并唤醒所有等待者
    pub fn force_end(&self) {
        self.audio_ended.store(true, Ordering::Release);
        self.ring.mark_ended();
    }

    pub fn into_parts(self) -> (FrameRing, PacketQueues) {
        (self.ring, self.packets)
    }
}

/// 后台视频解码线程
///
/// 不停地把视频帧解码进环形缓冲，满了就在 space 条件变量上等待；
/// 视频结束或出现致命错误时退出，并把视频流水线交还给调用方按顺序释放
pub struct DecodeThread {
    shared: Arc<DecodeShared>,
    handle: Option<JoinHandle<Box<dyn VideoStage>>>,
}

impl DecodeThread {
    pub fn start(shared: Arc<DecodeShared>, stage: Box<dyn VideoStage>) -> Result<Self> {
        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("myy-decode".to_string())
            .spawn(move || Self::produce_loop(thread_shared, stage))
            .map_err(|e| PlayerError::DecoderInit(format!("无法启动解码线程: {}", e)))?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// 生产循环（在解码线程中运行）
    fn produce_loop(shared: Arc<DecodeShared>, mut stage: Box<dyn VideoStage>) -> Box<dyn VideoStage> {
        info!("{} 🎬 解码线程启动: {}", log_ctx(), shared.packets.description());

        const LOG_FIRST_N: u64 = 3;

        while shared.ring.wait_for_space() {
            match stage.step(&shared.packets, &shared.ring) {
                VideoStep::Produced => {
                    let frames = stage.frames_produced();
                    if frames <= LOG_FIRST_N || frames % 100 == 0 {
                        debug!(
                            "{} 🖼 视频帧 #{} 已写入（缓冲 {}/{}）",
                            log_ctx(),
                            frames,
                            shared.ring.occupancy(),
                            shared.ring.capacity()
                        );
                    }
                }
                VideoStep::Pending => {}
                VideoStep::Ended => {
                    shared.end_video(stage.frames_produced());
                    break;
                }
                VideoStep::Fatal(e) => {
                    shared.fail(&e);
                    break;
                }
            }
        }

        info!("{} 🛑 解码线程退出（共解码 {} 帧）", log_ctx(), stage.frames_produced());
        stage
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// 停止线程并取回视频流水线
    ///
    /// 停止请求在下一次循环检查时生效；正在进行的一步解码会先完成
    pub fn stop(mut self) -> Option<Box<dyn VideoStage>> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<Box<dyn VideoStage>> {
        let handle = self.handle.take()?;
        self.shared.force_end();
        match handle.join() {
            Ok(stage) => Some(stage),
            Err(_) => {
                error!("{} ❌ 解码线程 panic", log_ctx());
                None
            }
        }
    }
}

impl Drop for DecodeThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("{} ⚠ DecodeThread 被 drop 时仍在运行，正在停止", log_ctx());
            self.shutdown();
        }
    }
}
