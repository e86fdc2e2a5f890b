use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("配置解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("无法打开媒体: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("解码器初始化失败: {0}")]
    DecoderInit(String),

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("格式转换错误: {0}")]
    ConvertError(String),

    #[error("资源耗尽: {0}")]
    ResourceExhausted(String),

    #[error("配置无效: {0}")]
    ConfigError(String),

    #[error("解码器已经加载了媒体，不能重复打开")]
    AlreadyOpen,

    #[error("解码器已关闭")]
    Closed,
}

impl PlayerError {
    /// 是否属于打开阶段的致命错误（不可重试）
    pub fn is_fatal_at_open(&self) -> bool {
        matches!(
            self,
            PlayerError::OpenError(_)
                | PlayerError::NoVideoStream
                | PlayerError::DecoderInit(_)
                | PlayerError::ConfigError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
