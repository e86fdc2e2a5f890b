use crate::core::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 解码器配置
///
/// 所有字段都有默认值，JSON 中缺省的字段使用默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// 环形缓冲槽位数 N（可用容量为 N-1，必须 >= 2）
    pub ring_slots: usize,
    /// 每次 update_audio_buffer 交付的字节数
    pub audio_buffer_size: usize,
    /// 解码跟不上时插入的静音块字节数
    pub silence_block_size: usize,
    /// 单个解码单元缓冲可容纳的采样数（每声道）
    pub decode_buffer_samples: usize,
    /// 当前帧超前时钟多少毫秒时保留一帧
    pub frame_hold_threshold_ms: i64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ring_slots: 4,
            audio_buffer_size: 1024,
            silence_block_size: 1024,
            decode_buffer_samples: 64000,
            frame_hold_threshold_ms: 20,
        }
    }
}

impl DecoderConfig {
    /// 从 JSON 文件加载配置
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: DecoderConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ring_slots(mut self, ring_slots: usize) -> Self {
        self.ring_slots = ring_slots;
        self
    }

    /// 解码单元缓冲的字节容量（S16）
    pub fn decode_buffer_bytes(&self, channels: u16) -> usize {
        self.decode_buffer_samples * channels as usize * 2
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<()> {
        if self.ring_slots < 2 {
            return Err(PlayerError::ConfigError(format!(
                "ring_slots 必须 >= 2（当前 {}），其中一个槽位用于同步保护",
                self.ring_slots
            )));
        }
        if self.audio_buffer_size == 0 {
            return Err(PlayerError::ConfigError("audio_buffer_size 不能为 0".to_string()));
        }
        if self.silence_block_size == 0 {
            return Err(PlayerError::ConfigError("silence_block_size 不能为 0".to_string()));
        }
        if self.decode_buffer_samples == 0 {
            return Err(PlayerError::ConfigError("decode_buffer_samples 不能为 0".to_string()));
        }
        // 单声道是最小的解码缓冲
        if self.silence_block_size > self.decode_buffer_bytes(1) {
            return Err(PlayerError::ConfigError(format!(
                "silence_block_size ({}) 超过解码缓冲 ({} 字节)",
                self.silence_block_size,
                self.decode_buffer_bytes(1)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DecoderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ring_slots, 4);
        assert_eq!(config.audio_buffer_size, 1024);
    }

    #[test]
    fn test_rejects_single_slot_ring() {
        let config = DecoderConfig::default().with_ring_slots(1);
        assert!(matches!(config.validate(), Err(PlayerError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_oversized_silence_block() {
        let config = DecoderConfig {
            decode_buffer_samples: 16,
            silence_block_size: 64,
            ..DecoderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DecoderConfig = serde_json::from_str(r#"{ "ring_slots": 8 }"#).unwrap();
        assert_eq!(config.ring_slots, 8);
        assert_eq!(config.silence_block_size, 1024);
    }
}
