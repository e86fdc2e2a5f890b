//! 测试替身：脚本化的数据包源、解码器、转换器和诊断接收端

use crate::core::{
    AudioFormat, AudioStreamInfo, DecoderEvent, DiagnosticSink, Packet, PlayerError, Result, StreamSet,
    VideoLayout, VideoStreamInfo,
};
use crate::player::codec::{Decoded, FrameDecoder, PixelConverter, Resampler, TimedFrame};
use crate::player::source::PacketSource;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

pub struct ScriptedSource {
    streams: StreamSet,
    packets: VecDeque<Packet>,
    clean_end: bool,
}

impl ScriptedSource {
    /// `clean_end` 为 false 时脚本用完后返回读取错误
    pub fn new(packets: Vec<Packet>, clean_end: bool) -> Self {
        Self {
            streams: StreamSet {
                video: Some(VideoStreamInfo {
                    width: 4,
                    height: 2,
                    time_base: 0.04,
                    codec: "test".to_string(),
                }),
                audio: Some(AudioStreamInfo {
                    sample_rate: 44100,
                    channels: 2,
                    time_base: 1.0 / 44100.0,
                    codec: "test".to_string(),
                }),
            },
            packets: packets.into(),
            clean_end,
        }
    }
}

impl PacketSource for ScriptedSource {
    fn streams(&self) -> &StreamSet {
        &self.streams
    }

    fn read_next_packet(&mut self) -> Result<Option<Packet>> {
        match self.packets.pop_front() {
            Some(packet) => Ok(Some(packet)),
            None if self.clean_end => Ok(None),
            None => Err(PlayerError::DecodeError("scripted read failure".to_string())),
        }
    }

    fn description(&self) -> String {
        format!("scripted source ({} packets left)", self.packets.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestFrame {
    pub pts: Option<i64>,
    pub payload: Vec<u8>,
}

impl TimedFrame for TestFrame {
    fn pts(&self) -> Option<i64> {
        self.pts
    }
}

/// 手动打开的闸门，打开之前 wait() 一直阻塞
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}

/// 每个包产出一帧（负载原样带出），可选闸门
#[derive(Default)]
pub struct PassThroughDecoder {
    pending: VecDeque<TestFrame>,
    finished: bool,
    produced: usize,
    gate: Option<Arc<Gate>>,
    gate_after: usize,
}

impl PassThroughDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self::gated_after(gate, 0)
    }

    /// 先正常产出 `frames` 帧，之后每次取帧都要等闸门打开
    pub fn gated_after(gate: Arc<Gate>, frames: usize) -> Self {
        Self {
            gate: Some(gate),
            gate_after: frames,
            ..Self::default()
        }
    }
}

impl FrameDecoder for PassThroughDecoder {
    type Frame = TestFrame;

    fn feed(&mut self, packet: Packet) -> Result<()> {
        self.pending.push_back(TestFrame {
            pts: packet.pts,
            payload: packet.data,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Decoded<TestFrame>> {
        if let Some(gate) = &self.gate {
            if self.produced >= self.gate_after {
                gate.wait();
            }
        }
        match self.pending.pop_front() {
            Some(frame) => {
                self.produced += 1;
                Ok(Decoded::Frame(frame))
            }
            None if self.finished => Ok(Decoded::EndOfStream),
            None => Ok(Decoded::NeedsInput),
        }
    }
}

/// 永远解不出数据的解码器
pub struct FailingDecoder;

impl FrameDecoder for FailingDecoder {
    type Frame = TestFrame;

    fn feed(&mut self, _packet: Packet) -> Result<()> {
        Err(PlayerError::DecodeError("starving".to_string()))
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Decoded<TestFrame>> {
        Err(PlayerError::DecodeError("starving".to_string()))
    }
}

/// 用负载的第一个字节填满整帧；负载为空时转换失败
pub struct FillConverter {
    layout: VideoLayout,
}

impl FillConverter {
    pub fn new(layout: VideoLayout) -> Self {
        Self { layout }
    }
}

impl PixelConverter for FillConverter {
    type Frame = TestFrame;

    fn layout(&self) -> VideoLayout {
        self.layout
    }

    fn convert(&mut self, frame: &TestFrame, dst: &mut [u8]) -> Result<()> {
        let value = frame
            .payload
            .first()
            .copied()
            .ok_or_else(|| PlayerError::ConvertError("empty frame".to_string()))?;
        dst.fill(value);
        Ok(())
    }
}

/// 把负载原样拷贝为采样
pub struct CopyResampler {
    format: AudioFormat,
}

impl CopyResampler {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl Resampler for CopyResampler {
    type Frame = TestFrame;

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    fn convert(&mut self, frame: &TestFrame, dst: &mut [u8]) -> Result<usize> {
        let len = frame.payload.len().min(dst.len());
        dst[..len].copy_from_slice(&frame.payload[..len]);
        Ok(len)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DecoderEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DecoderEvent> {
        self.events.lock().clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, event: DecoderEvent) {
        self.events.lock().push(event);
    }
}
