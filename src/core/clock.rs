use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// 播放时钟 - 墙钟时间，支持暂停/恢复，用于决定视频帧何时显示
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base_ms: i64,               // 基准位置（毫秒）
    base_instant: Instant,      // 基准时刻
    paused: bool,
    paused_at: i64,             // 暂停时的位置
}

impl ClockInner {
    fn now(&self) -> i64 {
        if self.paused {
            self.paused_at
        } else {
            self.base_ms + self.base_instant.elapsed().as_millis() as i64
        }
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base_ms: 0,
                base_instant: Instant::now(),
                paused: true,
                paused_at: 0,
            })),
        }
    }

    /// 获取当前播放时间（毫秒）
    pub fn now(&self) -> i64 {
        self.inner.lock().now()
    }

    /// 设置播放位置
    pub fn set_time(&self, position_ms: i64) {
        let mut inner = self.inner.lock();
        inner.base_ms = position_ms;
        inner.base_instant = Instant::now();
        inner.paused_at = position_ms;
    }

    /// 开始计时
    pub fn play(&self) {
        let mut inner = self.inner.lock();
        if inner.paused {
            inner.base_ms = inner.paused_at;
            inner.base_instant = Instant::now();
            inner.paused = false;
        }
    }

    /// 暂停计时
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.paused_at = inner.now();
            inner.paused = true;
        }
    }

    /// 是否暂停
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_paused_clock_does_not_advance() {
        let clock = PlaybackClock::new();
        clock.set_time(500);
        thread::sleep(Duration::from_millis(15));
        assert_eq!(clock.now(), 500);
        assert!(clock.is_paused());
    }

    #[test]
    fn test_pause_freezes_position() {
        let clock = PlaybackClock::new();
        clock.play();
        thread::sleep(Duration::from_millis(10));
        clock.pause();
        let frozen = clock.now();
        assert!(frozen >= 10);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.now(), frozen);

        clock.play();
        thread::sleep(Duration::from_millis(5));
        assert!(clock.now() >= frozen);
    }
}
