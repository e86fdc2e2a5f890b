use crate::core::{DecoderEvent, DiagnosticSink, Packet, PlayerError, Result, StreamKind};
use crate::player::source::PacketSource;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// 按流分开的数据包队列
///
/// 视频线程和音频调用线程都从同一个有序的数据包源取包：
/// 谁需要包而自己的队列为空，谁就在锁内读源，读到的包按流分发，
/// 同一个流内部保持先进先出
pub struct PacketQueues {
    inner: Mutex<QueueState>,
    sink: Arc<dyn DiagnosticSink>,
}

struct QueueState {
    video: VecDeque<Packet>,
    audio: VecDeque<Packet>,
    audio_enabled: bool,
    exhausted: bool,
    packets_read: u64,
    // 最后释放
    source: Box<dyn PacketSource>,
}

impl QueueState {
    fn queue_mut(&mut self, stream: StreamKind) -> &mut VecDeque<Packet> {
        match stream {
            StreamKind::Video => &mut self.video,
            StreamKind::Audio => &mut self.audio,
        }
    }

    fn dispatch(&mut self, packet: Packet) -> Result<()> {
        if packet.stream == StreamKind::Audio && !self.audio_enabled {
            // 没有音频解码器，直接丢弃
            return Ok(());
        }
        let queue = self.queue_mut(packet.stream);
        queue.try_reserve(1).map_err(|e| {
            PlayerError::ResourceExhausted(format!("{}包队列扩容失败: {}", packet.stream.as_str(), e))
        })?;
        queue.push_back(packet);
        Ok(())
    }
}

impl PacketQueues {
    pub fn new(source: Box<dyn PacketSource>, audio_enabled: bool, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Mutex::new(QueueState {
                video: VecDeque::new(),
                audio: VecDeque::new(),
                audio_enabled,
                exhausted: false,
                packets_read: 0,
                source,
            }),
            sink,
        }
    }

    /// 取出指定流的下一个包
    ///
    /// 队列为空时从数据包源继续读取，读到的可能是另一个流的包（放入对应队列后继续读）。
    /// 源耗尽后返回 Ok(None)；只有队列扩容失败才返回错误
    pub fn next_packet(&self, stream: StreamKind) -> Result<Option<Packet>> {
        let mut state = self.inner.lock();
        loop {
            if let Some(packet) = state.queue_mut(stream).pop_front() {
                return Ok(Some(packet));
            }
            if state.exhausted {
                return Ok(None);
            }

            match state.source.read_next_packet() {
                Ok(Some(packet)) => {
                    state.packets_read += 1;
                    state.dispatch(packet)?;
                }
                Ok(None) => {
                    debug!("数据包源到达末尾（共读取 {} 个包）", state.packets_read);
                    self.mark_exhausted(&mut state);
                }
                Err(e) => {
                    warn!("读取数据包失败，按流结束处理: {}", e);
                    self.mark_exhausted(&mut state);
                }
            }
        }
    }

    fn mark_exhausted(&self, state: &mut QueueState) {
        state.exhausted = true;
        self.sink.record(DecoderEvent::SourceExhausted {
            video_queued: state.video.len(),
            audio_queued: state.audio.len(),
        });
    }

    /// 某个流当前排队的包数
    pub fn queued(&self, stream: StreamKind) -> usize {
        let mut state = self.inner.lock();
        state.queue_mut(stream).len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner.lock().exhausted
    }

    pub fn description(&self) -> String {
        self.inner.lock().source.description()
    }

    /// 释放所有排队的包，然后交还数据包源（由调用方最后释放）
    pub fn into_source(self) -> Box<dyn PacketSource> {
        let mut state = self.inner.into_inner();
        state.video.clear();
        state.audio.clear();
        state.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StreamKind::{Audio, Video};
    use crate::player::testing::{RecordingSink, ScriptedSource};

    fn queues(packets: Vec<Packet>, audio_enabled: bool) -> (PacketQueues, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let source = ScriptedSource::new(packets, true);
        (PacketQueues::new(Box::new(source), audio_enabled, sink.clone()), sink)
    }

    #[test]
    fn test_interleaved_packets_keep_per_stream_order() {
        let (queues, _) = queues(
            vec![
                Packet::new(Video, vec![1]).with_pts(0),
                Packet::new(Audio, vec![10]).with_pts(0),
                Packet::new(Audio, vec![11]).with_pts(1),
                Packet::new(Video, vec![2]).with_pts(1),
                Packet::new(Video, vec![3]).with_pts(2),
            ],
            true,
        );

        // 取第二个视频包时，两个音频包已被放入音频队列
        assert_eq!(queues.next_packet(Video).unwrap().unwrap().data, vec![1]);
        assert_eq!(queues.next_packet(Video).unwrap().unwrap().data, vec![2]);
        assert_eq!(queues.queued(Audio), 2);

        assert_eq!(queues.next_packet(Audio).unwrap().unwrap().data, vec![10]);
        assert_eq!(queues.next_packet(Audio).unwrap().unwrap().data, vec![11]);
        assert_eq!(queues.next_packet(Video).unwrap().unwrap().data, vec![3]);
    }

    #[test]
    fn test_exhaustion_is_sticky_and_reported_once() {
        let (queues, sink) = queues(vec![Packet::new(Video, vec![1])], true);
        assert!(queues.next_packet(Video).unwrap().is_some());
        assert!(queues.next_packet(Video).unwrap().is_none());
        assert!(queues.next_packet(Audio).unwrap().is_none());
        assert!(queues.is_exhausted());

        let exhausted = sink
            .events()
            .iter()
            .filter(|e| matches!(e, DecoderEvent::SourceExhausted { .. }))
            .count();
        assert_eq!(exhausted, 1);
    }

    #[test]
    fn test_queued_packets_drain_after_exhaustion() {
        let (queues, _) = queues(
            vec![Packet::new(Audio, vec![7]), Packet::new(Video, vec![1])],
            true,
        );
        assert!(queues.next_packet(Video).unwrap().is_some());
        assert!(queues.next_packet(Video).unwrap().is_none());
        // 源已耗尽，但先前排队的音频包仍可取出
        assert_eq!(queues.next_packet(Audio).unwrap().unwrap().data, vec![7]);
        assert!(queues.next_packet(Audio).unwrap().is_none());
    }

    #[test]
    fn test_audio_packets_dropped_without_audio_decoder() {
        let (queues, _) = queues(
            vec![Packet::new(Audio, vec![1]), Packet::new(Video, vec![2])],
            false,
        );
        assert!(queues.next_packet(Video).unwrap().is_some());
        assert_eq!(queues.queued(Audio), 0);
    }

    #[test]
    fn test_read_error_treated_as_end() {
        let sink = Arc::new(RecordingSink::default());
        let source = ScriptedSource::new(vec![Packet::new(Video, vec![1])], false);
        let queues = PacketQueues::new(Box::new(source), true, sink);
        assert!(queues.next_packet(Video).unwrap().is_some());
        // 脚本用完后返回读取错误
        assert!(queues.next_packet(Video).unwrap().is_none());
        assert!(queues.is_exhausted());
    }
}
