use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

/// 媒体源类型
pub enum MediaSource {
    /// 本地文件路径
    LocalFile(PathBuf),

    /// 网络流 URL（http/rtsp/rtmp/hls 等，交给 FFmpeg 直接打开）
    Url(String),

    /// 任意字节流（通过自定义 AVIO 回调读取）
    Reader(Box<dyn Read + Send>),
}

impl MediaSource {
    /// 从 URL 字符串解析媒体源
    pub fn from_url(url: &str) -> Self {
        if Self::looks_like_network(url) {
            MediaSource::Url(url.to_string())
        } else {
            // 默认当作本地文件
            MediaSource::LocalFile(PathBuf::from(url))
        }
    }

    /// 判断是否为网络流
    pub fn is_network_stream(&self) -> bool {
        matches!(self, MediaSource::Url(_))
    }

    fn looks_like_network(url: &str) -> bool {
        url.starts_with("http://")
            || url.starts_with("https://")
            || url.starts_with("rtsp://")
            || url.starts_with("rtmp://")
            || url.contains(".m3u8")
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::LocalFile(path) => write!(f, "LocalFile({})", path.display()),
            MediaSource::Url(url) => write!(f, "Url({})", url),
            MediaSource::Reader(_) => write!(f, "Reader(..)"),
        }
    }
}

/// 基本流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "视频",
            StreamKind::Audio => "音频",
        }
    }
}

/// 解封装后的压缩数据包（拥有自己的负载）
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream: StreamKind,
    pub data: Vec<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub keyframe: bool,
}

impl Packet {
    pub fn new(stream: StreamKind, data: Vec<u8>) -> Self {
        Self {
            stream,
            data,
            pts: None,
            dts: None,
            duration: 0,
            keyframe: false,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self.dts = Some(pts);
        self
    }
}

/// 视频流探测信息
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    /// 时间基（秒/tick）
    pub time_base: f64,
    pub codec: String,
}

/// 音频流探测信息
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub time_base: f64,
    pub codec: String,
}

/// 容器中被选中的流
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSet {
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

/// 转换后视频帧的像素布局（固定 RGB24、紧密排列）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoLayout {
    pub width: u32,
    pub height: u32,
}

impl VideoLayout {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 每行像素数
    pub fn stride(&self) -> usize {
        self.width as usize
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL
    }

    /// 单帧字节数
    pub fn frame_size(&self) -> usize {
        self.row_bytes() * self.height as usize
    }
}

/// 重采样后的音频格式（S16 交错）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        Self::BYTES_PER_SAMPLE * self.channels as usize
    }

    /// 给定字节数对应的播放时长（秒）
    pub fn duration_of(&self, bytes: usize) -> f64 {
        let bytes_per_second = self.bytes_per_frame() as f64 * self.sample_rate as f64;
        if bytes_per_second <= 0.0 {
            return 0.0;
        }
        bytes as f64 / bytes_per_second
    }
}

/// 打开媒体后返回给使用方的缓冲区信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferInfo {
    pub video_width: u32,
    pub video_height: u32,
    /// 每行像素数（含对齐）
    pub video_stride: usize,
    pub video_frame_size: usize,
    pub ring_slots: usize,
    /// 无音频流时为 0
    pub audio_buffer_size: usize,
    pub audio_channels: u16,
    pub audio_sample_rate: u32,
}

impl BufferInfo {
    pub fn has_audio(&self) -> bool {
        self.audio_buffer_size > 0
    }
}

/// 解码器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderState {
    Created,
    Opening,
    Ready,
    Draining,
    Closed,
    Failed,
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Completed,
    Stopped,
}
