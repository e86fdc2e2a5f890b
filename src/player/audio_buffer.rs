use crate::core::{AudioFormat, DecoderConfig, DecoderEvent, Result};
use crate::player::codec::{AudioStage, AudioUnit};
use crate::player::decode_thread::DecodeShared;
use crate::player::frame_ring::allocate_buffer;
use log::{debug, info};

/// 音频重组缓冲
///
/// 解码单元大小不定，这里把它们拼接成固定大小的输出块。
/// 解码跟不上时用静音块补齐，并把静音时长累计到视频时间戳偏移上，
/// 让视频向音频对齐
pub struct AudioBuffer {
    stage: Box<dyn AudioStage>,
    format: AudioFormat,
    output: Box<[u8]>,
    decoded: Box<[u8]>,
    decoded_len: usize,
    decoded_pos: usize,
    silence_block: usize,
    timestamp_offset: f64,
    units: u64,
    underruns: u64,
}

impl AudioBuffer {
    pub fn new(stage: Box<dyn AudioStage>, config: &DecoderConfig) -> Result<Self> {
        let format = stage.output_format();
        let decoded_capacity = config.decode_buffer_bytes(format.channels).max(config.silence_block_size);
        Ok(Self {
            stage,
            format,
            output: allocate_buffer(config.audio_buffer_size, "音频输出")?,
            decoded: allocate_buffer(decoded_capacity, "音频解码")?,
            decoded_len: 0,
            decoded_pos: 0,
            silence_block: config.silence_block_size,
            timestamp_offset: 0.0,
            units: 0,
            underruns: 0,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn size(&self) -> usize {
        self.output.len()
    }

    /// 最近一次 refill 的输出
    pub fn data(&self) -> &[u8] {
        &self.output
    }

    /// 累计的视频时间戳偏移（秒），只增不减
    pub fn timestamp_offset(&self) -> f64 {
        self.timestamp_offset
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// 填满整个输出缓冲
    ///
    /// 在调用线程上同步解码，最多阻塞一次解码 + 重采样的时间
    pub fn refill(&mut self, shared: &DecodeShared) -> &[u8] {
        let mut filled = 0;
        while filled < self.output.len() {
            if self.decoded_pos >= self.decoded_len {
                self.decode_unit(shared);
            }
            let count = (self.output.len() - filled).min(self.decoded_len - self.decoded_pos);
            self.output[filled..filled + count]
                .copy_from_slice(&self.decoded[self.decoded_pos..self.decoded_pos + count]);
            filled += count;
            self.decoded_pos += count;
        }
        &self.output
    }

    fn decode_unit(&mut self, shared: &DecodeShared) {
        self.decoded_pos = 0;
        if shared.is_audio_ended() {
            self.fill_silence();
            return;
        }

        match self.stage.decode_unit(&shared.packets, &mut self.decoded) {
            AudioUnit::Samples(len) => {
                self.units += 1;
                self.decoded_len = len;
            }
            AudioUnit::Underrun => {
                self.fill_silence();
                self.underruns += 1;
                self.timestamp_offset += self.format.duration_of(self.silence_block);
                shared.sink().record(DecoderEvent::AudioUnderrun {
                    timestamp_offset: self.timestamp_offset,
                });
            }
            AudioUnit::Ended => {
                info!("🔈 音频解码结束（{} 个单元，{} 次欠载）", self.units, self.underruns);
                shared.end_audio(self.units);
                self.fill_silence();
            }
            AudioUnit::Fatal(e) => {
                shared.fail(&e);
                self.fill_silence();
            }
        }
    }

    fn fill_silence(&mut self) {
        let len = self.silence_block.min(self.decoded.len());
        self.decoded[..len].fill(0);
        self.decoded_len = len;
        debug!("静音块 {} 字节", len);
    }
}
