//! 后台解码 + 环形帧缓冲的音视频解码核心
//!
//! 解码线程把视频帧转换成 RGB24 写入 N 槽位的环形缓冲，
//! 调用方按自己的节拍取帧，并按固定大小拉取 S16 立体声音频。

pub mod core;
pub mod player;

pub use crate::core::{BufferInfo, DecoderConfig, DecoderEvent, DecoderState, MediaSource, PlayerError, Result};
pub use crate::player::{MediaDecoder, NextFrame, VideoPlayer};
