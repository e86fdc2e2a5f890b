use crate::core::{AudioStreamInfo, Packet, PlayerError, Result, VideoStreamInfo};
use crate::player::codec::{Decoded, FrameDecoder, TimedFrame};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, util};
use log::debug;

pub(crate) fn rational_to_f64(value: util::rational::Rational) -> f64 {
    if value.denominator() == 0 {
        return 0.0;
    }
    value.numerator() as f64 / value.denominator() as f64
}

/// 把拥有负载的 Packet 重新包装成 FFmpeg 包
fn to_av_packet(packet: Packet) -> ffmpeg::Packet {
    let mut av_packet = ffmpeg::Packet::copy(&packet.data);
    av_packet.set_pts(packet.pts);
    av_packet.set_dts(packet.dts);
    av_packet.set_duration(packet.duration);
    if packet.keyframe {
        av_packet.set_flags(codec::packet::Flags::KEY);
    }
    av_packet
}

fn map_receive<F>(result: std::result::Result<(), ffmpeg::Error>, frame: F) -> Result<Decoded<F>> {
    match result {
        Ok(()) => Ok(Decoded::Frame(frame)),
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(Decoded::NeedsInput),
        Err(ffmpeg::Error::Eof) => Ok(Decoded::EndOfStream),
        Err(e) => Err(PlayerError::DecodeError(e.to_string())),
    }
}

fn map_send(result: std::result::Result<(), ffmpeg::Error>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(ffmpeg::Error::Eof) => {
            debug!("解码器已经收到 EOF，忽略本次输入");
            Ok(())
        }
        Err(e) => Err(PlayerError::DecodeError(e.to_string())),
    }
}

impl TimedFrame for util::frame::Video {
    fn pts(&self) -> Option<i64> {
        self.timestamp()
    }
}

impl TimedFrame for util::frame::Audio {
    fn pts(&self) -> Option<i64> {
        self.timestamp()
    }
}

/// 软件视频解码器
pub struct FfmpegVideoDecoder {
    decoder: codec::decoder::Video,
    info: VideoStreamInfo,
}

// 解码器只在解码线程中使用
unsafe impl Send for FfmpegVideoDecoder {}

impl FfmpegVideoDecoder {
    pub fn from_stream(stream: &format::stream::Stream) -> Result<Self> {
        let parameters = stream.parameters();
        let codec_name = parameters.id().name().to_string();
        let context = codec::context::Context::from_parameters(parameters)
            .map_err(|e| PlayerError::DecoderInit(format!("视频解码器上下文: {}", e)))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| PlayerError::DecoderInit(format!("视频解码器 {}: {}", codec_name, e)))?;

        debug!(
            "视频解码器: {} {}x{}, 格式: {:?}",
            codec_name,
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        let info = VideoStreamInfo {
            width: decoder.width(),
            height: decoder.height(),
            time_base: rational_to_f64(stream.time_base()),
            codec: codec_name,
        };
        Ok(Self { decoder, info })
    }

    pub fn info(&self) -> &VideoStreamInfo {
        &self.info
    }
}

impl FrameDecoder for FfmpegVideoDecoder {
    type Frame = util::frame::Video;

    fn feed(&mut self, packet: Packet) -> Result<()> {
        map_send(self.decoder.send_packet(&to_av_packet(packet)))
    }

    fn finish(&mut self) -> Result<()> {
        map_send(self.decoder.send_eof())
    }

    fn receive_frame(&mut self) -> Result<Decoded<util::frame::Video>> {
        let mut frame = util::frame::Video::empty();
        let result = self.decoder.receive_frame(&mut frame);
        map_receive(result, frame)
    }
}

/// 音频解码器
pub struct FfmpegAudioDecoder {
    decoder: codec::decoder::Audio,
    info: AudioStreamInfo,
}

unsafe impl Send for FfmpegAudioDecoder {}

impl FfmpegAudioDecoder {
    pub fn from_stream(stream: &format::stream::Stream) -> Result<Self> {
        let parameters = stream.parameters();
        let codec_name = parameters.id().name().to_string();
        let context = codec::context::Context::from_parameters(parameters)
            .map_err(|e| PlayerError::DecoderInit(format!("音频解码器上下文: {}", e)))?;
        let decoder = context
            .decoder()
            .audio()
            .map_err(|e| PlayerError::DecoderInit(format!("音频解码器 {}: {}", codec_name, e)))?;

        debug!(
            "音频解码器: {} {} Hz, {} 声道, 格式: {:?}",
            codec_name,
            decoder.rate(),
            decoder.channels(),
            decoder.format()
        );

        let info = AudioStreamInfo {
            sample_rate: decoder.rate(),
            channels: decoder.channels(),
            time_base: rational_to_f64(stream.time_base()),
            codec: codec_name,
        };
        Ok(Self { decoder, info })
    }

    pub fn info(&self) -> &AudioStreamInfo {
        &self.info
    }
}

impl FrameDecoder for FfmpegAudioDecoder {
    type Frame = util::frame::Audio;

    fn feed(&mut self, packet: Packet) -> Result<()> {
        map_send(self.decoder.send_packet(&to_av_packet(packet)))
    }

    fn finish(&mut self) -> Result<()> {
        map_send(self.decoder.send_eof())
    }

    fn receive_frame(&mut self) -> Result<Decoded<util::frame::Audio>> {
        let mut frame = util::frame::Audio::empty();
        let result = self.decoder.receive_frame(&mut frame);
        map_receive(result, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StreamKind;

    #[test]
    fn test_rational_conversion() {
        assert_eq!(rational_to_f64(util::rational::Rational::new(1, 25)), 0.04);
        assert_eq!(rational_to_f64(util::rational::Rational::new(1, 0)), 0.0);
    }

    #[test]
    fn test_packet_metadata_survives_rewrap() {
        let mut packet = Packet::new(StreamKind::Video, vec![0, 0, 1, 9]).with_pts(42);
        packet.duration = 3;
        packet.keyframe = true;

        let av_packet = to_av_packet(packet);
        assert_eq!(av_packet.data(), Some(&[0u8, 0, 1, 9][..]));
        assert_eq!(av_packet.pts(), Some(42));
        assert_eq!(av_packet.dts(), Some(42));
        assert_eq!(av_packet.duration(), 3);
        assert!(av_packet.is_key());
    }
}
