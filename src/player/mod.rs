// 解码核心模块

pub mod audio_buffer;
pub mod codec;
pub mod decode_thread;
pub mod ffmpeg;
pub mod frame_ring;
pub mod media_decoder;
pub mod opener;
pub mod packet_queue;
pub mod playback;
pub mod source;

#[cfg(test)]
mod testing;

pub use audio_buffer::AudioBuffer;
pub use codec::{
    AudioPipeline, AudioStage, AudioUnit, Decoded, FrameDecoder, PixelConverter, Resampler, TimedFrame,
    VideoPipeline, VideoStage, VideoStep,
};
pub use decode_thread::{DecodeShared, DecodeThread};
pub use frame_ring::{FrameRing, VideoFrameRef};
pub use media_decoder::{MediaComponents, MediaDecoder, NextFrame};
pub use opener::MediaOpener;
pub use packet_queue::PacketQueues;
pub use playback::{FrameUpdate, VideoPlayer};
pub use source::PacketSource;
