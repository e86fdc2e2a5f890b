//! 基于 FFmpeg 的数据包源、解码器和格式转换

mod convert;
mod decoder;
mod demuxer;

pub use convert::{RgbConverter, S16Resampler};
pub use decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
pub use demuxer::FfmpegDemuxer;

use crate::core::{DecoderConfig, MediaSource, Result, VideoLayout};
use crate::player::codec::{AudioPipeline, AudioStage, VideoPipeline};
use crate::player::media_decoder::MediaComponents;
use log::info;

/// 打开容器，选出视频/音频流并构建完整的解码流水线
pub fn open_components(source: MediaSource, config: &DecoderConfig) -> Result<MediaComponents> {
    let mut demuxer = FfmpegDemuxer::open(source)?;

    let video_decoder = demuxer.open_video_decoder()?;
    let video_info = video_decoder.info().clone();
    let layout = VideoLayout::new(video_info.width, video_info.height);

    let audio = demuxer.open_audio_decoder()?.map(|decoder| {
        let resampler = S16Resampler::new(decoder.info().sample_rate);
        Box::new(AudioPipeline::new(decoder, resampler)) as Box<dyn AudioStage>
    });

    info!(
        "📎 流水线就绪: 视频 {} {}x{}，音频 {}，环形缓冲 {} 槽位",
        video_info.codec,
        layout.width,
        layout.height,
        if audio.is_some() { "S16 立体声" } else { "无" },
        config.ring_slots
    );

    Ok(MediaComponents {
        source: Box::new(demuxer),
        video: Box::new(VideoPipeline::new(
            video_decoder,
            RgbConverter::new(layout),
            video_info.time_base,
        )),
        audio,
    })
}
