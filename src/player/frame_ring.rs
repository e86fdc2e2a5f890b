use crate::core::{PlayerError, Result};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 环形缓冲中的一个槽位：预先分配好的像素缓冲 + 显示时间戳（秒）
pub struct VideoSlot {
    data: Box<[u8]>,
    timestamp: f64,
}

impl VideoSlot {
    fn allocate(frame_size: usize) -> Result<Self> {
        Ok(Self {
            data: allocate_buffer(frame_size, "视频帧")?,
            timestamp: 0.0,
        })
    }
}

/// 一次性分配固定大小的清零缓冲，分配失败返回 ResourceExhausted
pub(crate) fn allocate_buffer(len: usize, what: &str) -> Result<Box<[u8]>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|e| {
        PlayerError::ResourceExhausted(format!("无法分配 {} 字节的{}缓冲: {}", len, what, e))
    })?;
    data.resize(len, 0);
    Ok(data.into_boxed_slice())
}

/// 对当前帧的只读视图
///
/// 持有期间解码线程不会写入这个槽位；借用结束前无法再次推进读指针
pub struct VideoFrameRef<'a> {
    slot: RwLockReadGuard<'a, VideoSlot>,
    sequence: u64,
}

impl VideoFrameRef<'_> {
    pub fn data(&self) -> &[u8] {
        &self.slot.data
    }

    /// 帧自身的显示时间戳（秒，不含音频补偿偏移）
    pub fn timestamp(&self) -> f64 {
        self.slot.timestamp
    }

    /// 已显示帧计数（第几帧，0 表示还没有显示过任何帧）
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Deref for VideoFrameRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

/// 固定容量的视频帧环形缓冲
///
/// - 解码线程是唯一的写者，使用者只读取已就绪的槽位
/// - written / displayed 两个计数只增不减，槽位 = 计数 % N
/// - 永远保留一个空槽位，满和空无需额外标志即可区分：0 <= written - displayed <= N-1
/// - 第 k 帧写入槽位 k % N，当前帧位于 displayed % N
pub struct FrameRing {
    slots: Box<[RwLock<VideoSlot>]>,
    written: AtomicU64,
    displayed: AtomicU64,
    ended: AtomicBool,
    // 计数变化和结束标志都在这把锁下通知
    monitor: Mutex<()>,
    space_available: Condvar,
    frame_ready: Condvar,
}

impl FrameRing {
    pub fn new(slot_count: usize, frame_size: usize) -> Result<Self> {
        if slot_count < 2 {
            return Err(PlayerError::ConfigError(format!(
                "环形缓冲至少需要 2 个槽位（当前 {}）",
                slot_count
            )));
        }
        let slots = (0..slot_count)
            .map(|_| VideoSlot::allocate(frame_size).map(RwLock::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            slots: slots.into_boxed_slice(),
            written: AtomicU64::new(0),
            displayed: AtomicU64::new(0),
            ended: AtomicBool::new(false),
            monitor: Mutex::new(()),
            space_available: Condvar::new(),
            frame_ready: Condvar::new(),
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 可用容量 N-1
    pub fn capacity(&self) -> u64 {
        self.slots.len() as u64 - 1
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    pub fn displayed(&self) -> u64 {
        self.displayed.load(Ordering::Acquire)
    }

    /// 已解码但尚未显示的帧数
    pub fn occupancy(&self) -> u64 {
        let displayed = self.displayed();
        self.written().saturating_sub(displayed)
    }

    pub fn has_frame_buffered(&self) -> bool {
        self.occupancy() >= 1
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity()
    }

    /// 缓冲已满，或视频已结束且还有帧可取
    pub fn is_buffered(&self) -> bool {
        self.is_full() || (self.is_ended() && self.has_frame_buffered())
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// 视频已结束并且所有帧都已取走
    pub fn is_drained(&self) -> bool {
        self.is_ended() && !self.has_frame_buffered()
    }

    fn slot_index(&self, counter: u64) -> usize {
        (counter % self.slots.len() as u64) as usize
    }

    /// 解码线程：等待出现空位
    ///
    /// 返回 false 表示视频已结束，生产循环应当退出
    pub fn wait_for_space(&self) -> bool {
        let mut guard = self.monitor.lock();
        while self.is_full() && !self.is_ended() {
            self.space_available.wait(&mut guard);
        }
        !self.is_ended()
    }

    /// 解码线程：把下一帧写入写槽位，然后发布
    ///
    /// `write` 直接在槽位缓冲上原地写像素；失败时计数不变，该帧被丢弃
    pub fn publish<F>(&self, timestamp: f64, write: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        if self.is_full() {
            return Err(PlayerError::ResourceExhausted("环形缓冲已满".to_string()));
        }
        // 只有本线程修改 written
        let next = self.written.load(Ordering::Relaxed) + 1;
        {
            let mut slot = self.slots[self.slot_index(next)].write();
            write(&mut slot.data)?;
            slot.timestamp = timestamp;
        }
        self.written.fetch_add(1, Ordering::Release);
        debug_assert!(self.occupancy() <= self.capacity());

        let _guard = self.monitor.lock();
        self.frame_ready.notify_all();
        Ok(())
    }

    /// 使用方：推进读指针并返回新的当前帧；没有已就绪的帧时返回 None，不会阻塞
    pub fn advance(&self) -> Option<VideoFrameRef<'_>> {
        if !self.has_frame_buffered() {
            return None;
        }
        {
            let _guard = self.monitor.lock();
            self.displayed.fetch_add(1, Ordering::Release);
            self.space_available.notify_one();
        }
        Some(self.current())
    }

    /// 当前（最近一次交出的）帧
    pub fn current(&self) -> VideoFrameRef<'_> {
        let sequence = self.displayed();
        VideoFrameRef {
            slot: self.slots[self.slot_index(sequence)].read(),
            sequence,
        }
    }

    /// 设置视频结束标志并唤醒所有等待者；返回是否为第一次设置
    pub fn mark_ended(&self) -> bool {
        let _guard = self.monitor.lock();
        let first = !self.ended.swap(true, Ordering::AcqRel);
        self.space_available.notify_all();
        self.frame_ready.notify_all();
        first
    }

    /// 阻塞等待缓冲就绪（满，或已结束），超时返回当前的就绪状态
    pub fn wait_until_buffered(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.monitor.lock();
        while !self.is_buffered() && !self.is_ended() {
            if self.frame_ready.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn fill(value: u8) -> impl FnOnce(&mut [u8]) -> Result<()> {
        move |dst| {
            dst.fill(value);
            Ok(())
        }
    }

    #[test]
    fn test_rejects_ring_without_guard_slot() {
        assert!(FrameRing::new(1, 16).is_err());
        assert!(FrameRing::new(2, 16).is_ok());
    }

    #[test]
    fn test_empty_ring_has_nothing_to_advance() {
        let ring = FrameRing::new(4, 8).unwrap();
        assert_eq!(ring.occupancy(), 0);
        assert!(!ring.has_frame_buffered());
        assert!(ring.advance().is_none());
        assert_eq!(ring.current().sequence(), 0);
        assert_eq!(ring.current().timestamp(), 0.0);
    }

    #[test]
    fn test_fill_to_capacity_then_drain() {
        let ring = FrameRing::new(4, 8).unwrap();
        for i in 1..=3u8 {
            ring.publish(i as f64, fill(i)).unwrap();
        }
        assert!(ring.is_full());
        assert!(ring.is_buffered());
        // 满了以后不能再写
        assert!(ring.publish(4.0, fill(4)).is_err());
        assert_eq!(ring.written(), 3);

        for i in 1..=3u8 {
            let frame = ring.advance().unwrap();
            assert!(frame.data().iter().all(|b| *b == i));
            assert_eq!(frame.timestamp(), i as f64);
            assert_eq!(frame.sequence(), i as u64);
        }
        assert!(ring.advance().is_none());
        assert_eq!(ring.occupancy(), 0);
    }

    #[test]
    fn test_write_slot_never_aliases_current_frame() {
        let ring = FrameRing::new(3, 4).unwrap();
        for round in 0..20u64 {
            while !ring.is_full() {
                let next = ring.written() + 1;
                assert_ne!(ring.slot_index(next), ring.slot_index(ring.displayed()));
                ring.publish(next as f64, fill(next as u8)).unwrap();
                assert!(ring.occupancy() <= ring.capacity());
            }
            let frame = ring.advance().unwrap();
            assert_eq!(frame.sequence(), round + 1);
        }
    }

    #[test]
    fn test_failed_write_does_not_publish() {
        let ring = FrameRing::new(4, 4).unwrap();
        let result = ring.publish(1.0, |_| Err(PlayerError::ConvertError("bad frame".into())));
        assert!(result.is_err());
        assert_eq!(ring.written(), 0);
        assert!(!ring.has_frame_buffered());
    }

    #[test]
    fn test_ended_ring_drains_remaining_frames() {
        let ring = FrameRing::new(8, 4).unwrap();
        ring.publish(0.0, fill(1)).unwrap();
        ring.publish(0.04, fill(2)).unwrap();
        assert!(!ring.is_buffered());

        assert!(ring.mark_ended());
        assert!(!ring.mark_ended());
        assert!(ring.is_buffered());
        assert!(!ring.is_drained());

        assert!(ring.advance().is_some());
        assert!(ring.advance().is_some());
        assert!(ring.advance().is_none());
        assert!(ring.is_drained());
    }

    #[test]
    fn test_wait_for_space_returns_when_ended() {
        let ring = Arc::new(FrameRing::new(2, 4).unwrap());
        ring.publish(0.0, fill(1)).unwrap();
        assert!(ring.is_full());

        let waiter = {
            let ring = ring.clone();
            thread::spawn(move || ring.wait_for_space())
        };
        thread::sleep(Duration::from_millis(20));
        ring.mark_ended();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_producer_blocks_until_consumer_advances() {
        let ring = Arc::new(FrameRing::new(4, 4).unwrap());
        let producer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for i in 1..=12u8 {
                    if !ring.wait_for_space() {
                        break;
                    }
                    ring.publish(i as f64 * 0.04, fill(i)).unwrap();
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 12 {
            assert!(ring.occupancy() <= ring.capacity());
            if let Some(frame) = ring.advance() {
                seen.push(frame.data()[0]);
            } else {
                ring.wait_until_buffered(Duration::from_millis(50));
            }
        }
        producer.join().unwrap();
        assert_eq!(seen, (1..=12u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_wait_until_buffered_times_out_on_idle_ring() {
        let ring = FrameRing::new(4, 4).unwrap();
        let started = Instant::now();
        assert!(!ring.wait_until_buffered(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(25));
    }
}
