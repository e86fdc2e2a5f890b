use crate::core::{AudioFormat, Packet, PlayerError, Result, StreamKind, VideoLayout};
use crate::player::frame_ring::FrameRing;
use crate::player::packet_queue::PacketQueues;
use log::{debug, warn};

/// 解码器一次取帧的结果
#[derive(Debug)]
pub enum Decoded<F> {
    Frame(F),
    /// 需要更多输入包
    NeedsInput,
    /// 已排空，不会再有输出
    EndOfStream,
}

/// 带显示时间戳的解码帧
pub trait TimedFrame {
    /// 以流时间基为单位；解码器给不出时返回 None
    fn pts(&self) -> Option<i64>;
}

/// 压缩包 → 原始帧
pub trait FrameDecoder: Send {
    type Frame: TimedFrame;

    /// 送入一个包；包在送入后即被消耗
    fn feed(&mut self, packet: Packet) -> Result<()>;

    /// 通知没有更多输入，之后 receive_frame 依次吐出剩余帧再返回 EndOfStream
    fn finish(&mut self) -> Result<()>;

    fn receive_frame(&mut self) -> Result<Decoded<Self::Frame>>;
}

/// 原始视频帧 → 固定布局的 RGB 像素
pub trait PixelConverter: Send {
    type Frame;

    fn layout(&self) -> VideoLayout;

    /// `dst` 长度为 layout().frame_size()
    fn convert(&mut self, frame: &Self::Frame, dst: &mut [u8]) -> Result<()>;
}

/// 原始音频帧 → S16 交错采样
pub trait Resampler: Send {
    type Frame;

    fn output_format(&self) -> AudioFormat;

    /// 返回写入 `dst` 的字节数
    fn convert(&mut self, frame: &Self::Frame, dst: &mut [u8]) -> Result<usize>;
}

enum Feed {
    Fed,
    Draining,
    /// 已经通知过排空，解码器仍然要输入
    Starved,
}

fn feed_next<D: FrameDecoder>(
    decoder: &mut D,
    packets: &PacketQueues,
    stream: StreamKind,
    draining: &mut bool,
) -> Result<Feed> {
    match packets.next_packet(stream)? {
        Some(packet) => {
            if let Err(e) = decoder.feed(packet) {
                debug!("{}包送入解码器失败，跳过: {}", stream.as_str(), e);
            }
            Ok(Feed::Fed)
        }
        None if *draining => Ok(Feed::Starved),
        None => {
            *draining = true;
            if let Err(e) = decoder.finish() {
                debug!("{}解码器排空失败: {}", stream.as_str(), e);
                return Ok(Feed::Starved);
            }
            Ok(Feed::Draining)
        }
    }
}

/// 视频流水线单步的结果
#[derive(Debug)]
pub enum VideoStep {
    /// 发布了一帧
    Produced,
    /// 没有产出（送入了包，或丢弃了一帧），继续下一步
    Pending,
    Ended,
    Fatal(PlayerError),
}

/// 类型擦除后的视频流水线，由解码线程驱动
pub trait VideoStage: Send {
    fn layout(&self) -> VideoLayout;

    /// 推进一步：要么向解码器送一个包，要么把一帧写进环形缓冲
    fn step(&mut self, packets: &PacketQueues, ring: &FrameRing) -> VideoStep;

    fn frames_produced(&self) -> u64;
}

pub struct VideoPipeline<D, C> {
    // 先于解码器释放
    converter: C,
    decoder: D,
    time_base: f64,
    last_timestamp: f64,
    draining: bool,
    frames: u64,
}

impl<D, C> VideoPipeline<D, C>
where
    D: FrameDecoder,
    C: PixelConverter<Frame = D::Frame>,
{
    pub fn new(decoder: D, converter: C, time_base: f64) -> Self {
        Self {
            converter,
            decoder,
            time_base,
            last_timestamp: 0.0,
            draining: false,
            frames: 0,
        }
    }
}

impl<D, C> VideoStage for VideoPipeline<D, C>
where
    D: FrameDecoder,
    C: PixelConverter<Frame = D::Frame>,
{
    fn layout(&self) -> VideoLayout {
        self.converter.layout()
    }

    fn step(&mut self, packets: &PacketQueues, ring: &FrameRing) -> VideoStep {
        match self.decoder.receive_frame() {
            Ok(Decoded::Frame(frame)) => {
                // 缺失的时间戳沿用上一帧
                let timestamp = frame
                    .pts()
                    .map(|pts| pts as f64 * self.time_base)
                    .unwrap_or(self.last_timestamp);
                let converter = &mut self.converter;
                match ring.publish(timestamp, |dst| converter.convert(&frame, dst)) {
                    Ok(()) => {
                        self.last_timestamp = timestamp;
                        self.frames += 1;
                        VideoStep::Produced
                    }
                    Err(e) => {
                        warn!("⚠️ 视频帧转换失败，丢弃该帧: {}", e);
                        VideoStep::Pending
                    }
                }
            }
            Ok(Decoded::NeedsInput) => {
                match feed_next(&mut self.decoder, packets, StreamKind::Video, &mut self.draining) {
                    Ok(Feed::Fed) | Ok(Feed::Draining) => VideoStep::Pending,
                    Ok(Feed::Starved) => VideoStep::Ended,
                    Err(e) => VideoStep::Fatal(e),
                }
            }
            Ok(Decoded::EndOfStream) => VideoStep::Ended,
            Err(e) => {
                debug!("视频解码错误，按流结束处理: {}", e);
                VideoStep::Ended
            }
        }
    }

    fn frames_produced(&self) -> u64 {
        self.frames
    }
}

/// 一个音频解码单元的结果
#[derive(Debug)]
pub enum AudioUnit {
    /// 写入了 n 字节 S16 采样
    Samples(usize),
    /// 这次没能产出采样（解码或重采样失败、空帧），由调用方补静音
    Underrun,
    Ended,
    Fatal(PlayerError),
}

/// 类型擦除后的音频流水线，由 update_audio_buffer 在调用线程上驱动
pub trait AudioStage: Send {
    fn output_format(&self) -> AudioFormat;

    fn decode_unit(&mut self, packets: &PacketQueues, dst: &mut [u8]) -> AudioUnit;
}

pub struct AudioPipeline<D, R> {
    // 先于解码器释放
    resampler: R,
    decoder: D,
    draining: bool,
}

impl<D, R> AudioPipeline<D, R>
where
    D: FrameDecoder,
    R: Resampler<Frame = D::Frame>,
{
    pub fn new(decoder: D, resampler: R) -> Self {
        Self {
            resampler,
            decoder,
            draining: false,
        }
    }
}

impl<D, R> AudioStage for AudioPipeline<D, R>
where
    D: FrameDecoder,
    R: Resampler<Frame = D::Frame>,
{
    fn output_format(&self) -> AudioFormat {
        self.resampler.output_format()
    }

    fn decode_unit(&mut self, packets: &PacketQueues, dst: &mut [u8]) -> AudioUnit {
        loop {
            match self.decoder.receive_frame() {
                Ok(Decoded::Frame(frame)) => {
                    return match self.resampler.convert(&frame, dst) {
                        Ok(0) => AudioUnit::Underrun,
                        Ok(written) => AudioUnit::Samples(written.min(dst.len())),
                        Err(e) => {
                            debug!("音频重采样失败: {}", e);
                            AudioUnit::Underrun
                        }
                    };
                }
                Ok(Decoded::NeedsInput) => {
                    match feed_next(&mut self.decoder, packets, StreamKind::Audio, &mut self.draining) {
                        Ok(Feed::Fed) | Ok(Feed::Draining) => continue,
                        Ok(Feed::Starved) => return AudioUnit::Ended,
                        Err(e) => return AudioUnit::Fatal(e),
                    }
                }
                Ok(Decoded::EndOfStream) => return AudioUnit::Ended,
                Err(e) => {
                    debug!("音频解码错误: {}", e);
                    return AudioUnit::Underrun;
                }
            }
        }
    }
}
