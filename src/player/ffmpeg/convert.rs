use crate::core::{AudioFormat, PlayerError, Result, VideoLayout};
use crate::player::codec::{PixelConverter, Resampler};
use ffmpeg_next::{software, util};
use log::debug;

/// 任意像素格式 → RGB24（紧密排列）
pub struct RgbConverter {
    layout: VideoLayout,
    scaler: Option<software::scaling::Context>,
    scratch: util::frame::Video,
}

// SwsContext 本身不是 Send，但转换器只在解码线程中使用
unsafe impl Send for RgbConverter {}

impl RgbConverter {
    pub fn new(layout: VideoLayout) -> Self {
        Self {
            layout,
            scaler: None,
            scratch: util::frame::Video::empty(),
        }
    }

    fn scaler_for(&mut self, frame: &util::frame::Video) -> Result<&mut software::scaling::Context> {
        let stale = match &self.scaler {
            Some(scaler) => {
                let input = scaler.input();
                input.format != frame.format() || input.width != frame.width() || input.height != frame.height()
            }
            None => true,
        };
        if stale {
            debug!(
                "🔧 初始化像素转换: {:?} {}x{} → RGB24 {}x{}",
                frame.format(),
                frame.width(),
                frame.height(),
                self.layout.width,
                self.layout.height
            );
            let scaler = software::scaling::Context::get(
                frame.format(),
                frame.width(),
                frame.height(),
                util::format::Pixel::RGB24,
                self.layout.width,
                self.layout.height,
                software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| PlayerError::ConvertError(format!("无法创建像素转换器: {}", e)))?;
            self.scaler = Some(scaler);
        }
        self.scaler
            .as_mut()
            .ok_or_else(|| PlayerError::ConvertError("像素转换器不可用".to_string()))
    }
}

impl PixelConverter for RgbConverter {
    type Frame = util::frame::Video;

    fn layout(&self) -> VideoLayout {
        self.layout
    }

    fn convert(&mut self, frame: &util::frame::Video, dst: &mut [u8]) -> Result<()> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(PlayerError::ConvertError("空的视频帧".to_string()));
        }
        if dst.len() < self.layout.frame_size() {
            return Err(PlayerError::ConvertError(format!(
                "目标缓冲过小: {} < {}",
                dst.len(),
                self.layout.frame_size()
            )));
        }

        let mut scratch = std::mem::replace(&mut self.scratch, util::frame::Video::empty());
        let result = self
            .scaler_for(frame)
            .and_then(|scaler| {
                scaler
                    .run(frame, &mut scratch)
                    .map_err(|e| PlayerError::ConvertError(e.to_string()))
            });
        self.scratch = scratch;
        result?;

        // 逐行拷贝，去掉行对齐
        let stride = self.scratch.stride(0);
        let data = self.scratch.data(0);
        let row = self.layout.row_bytes();
        for y in 0..self.layout.height as usize {
            let src = &data[y * stride..y * stride + row];
            dst[y * row..(y + 1) * row].copy_from_slice(src);
        }
        Ok(())
    }
}

/// 任意采样格式 → S16 交错立体声，采样率保持不变
pub struct S16Resampler {
    format: AudioFormat,
    resampler: Option<software::resampling::Context>,
}

unsafe impl Send for S16Resampler {}

impl S16Resampler {
    pub const OUTPUT_CHANNELS: u16 = 2;

    pub fn new(sample_rate: u32) -> Self {
        Self {
            format: AudioFormat::new(sample_rate, Self::OUTPUT_CHANNELS),
            resampler: None,
        }
    }
}

impl Resampler for S16Resampler {
    type Frame = util::frame::Audio;

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    fn convert(&mut self, frame: &util::frame::Audio, dst: &mut [u8]) -> Result<usize> {
        if self.resampler.is_none() {
            // 部分容器不带声道布局，按声道数推断
            let layout = if frame.channel_layout().is_empty() {
                util::channel_layout::ChannelLayout::default(frame.channels() as i32)
            } else {
                frame.channel_layout()
            };
            debug!(
                "🔧 初始化音频重采样器: {:?} {}Hz/{}ch → S16 {}Hz/{}ch",
                frame.format(),
                frame.rate(),
                frame.channels(),
                self.format.sample_rate,
                self.format.channels
            );
            let resampler = software::resampling::Context::get(
                frame.format(),
                layout,
                frame.rate(),
                util::format::Sample::I16(util::format::sample::Type::Packed),
                util::channel_layout::ChannelLayout::STEREO,
                self.format.sample_rate,
            )
            .map_err(|e| PlayerError::ConvertError(format!("无法创建重采样器: {}", e)))?;
            self.resampler = Some(resampler);
        }

        // 每次用新的输出帧，swr 按输入帧大小分配输出
        let mut resampled = util::frame::Audio::empty();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler
                .run(frame, &mut resampled)
                .map_err(|e| PlayerError::ConvertError(e.to_string()))?;
        }

        let bytes = resampled.samples() * self.format.bytes_per_frame();
        let data = resampled.data(0);
        let count = bytes.min(data.len()).min(dst.len());
        dst[..count].copy_from_slice(&data[..count]);
        Ok(count)
    }
}
