use crate::core::{MediaSource, Packet, PlayerError, Result, StreamKind, StreamSet};
use crate::player::ffmpeg::decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
use crate::player::source::PacketSource;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{ffi, format, media};
use log::{debug, info, warn};
use std::io::{ErrorKind, Read};
use std::os::raw::{c_int, c_void};
use std::ptr;

const AVIO_BUFFER_SIZE: usize = 32 * 1024;

/// 字节流回调的上下文，作为 AVIOContext 的 opaque 指针
struct ReaderIo {
    reader: Box<dyn Read + Send>,
    bytes_read: u64,
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    if opaque.is_null() || buf.is_null() || buf_size <= 0 {
        return c_int::from(ffmpeg::Error::Eof);
    }
    let io = &mut *(opaque as *mut ReaderIo);
    let dst = std::slice::from_raw_parts_mut(buf, buf_size as usize);
    loop {
        match io.reader.read(dst) {
            Ok(0) => return c_int::from(ffmpeg::Error::Eof),
            Ok(n) => {
                io.bytes_read += n as u64;
                return n as c_int;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("字节流读取失败: {}", e);
                return c_int::from(ffmpeg::Error::External);
            }
        }
    }
}

/// 自定义 AVIO：缓冲区、AVIOContext 和回调上下文
///
/// 必须在 Input 关闭之后释放
struct CustomIo {
    avio: *mut ffi::AVIOContext,
    opaque: *mut ReaderIo,
}

impl CustomIo {
    unsafe fn new(reader: Box<dyn Read + Send>) -> Result<Self> {
        let opaque = Box::into_raw(Box::new(ReaderIo { reader, bytes_read: 0 }));
        let buffer = ffi::av_malloc(AVIO_BUFFER_SIZE) as *mut u8;
        if buffer.is_null() {
            drop(Box::from_raw(opaque));
            return Err(PlayerError::ResourceExhausted("无法分配 AVIO 缓冲".to_string()));
        }
        let avio = ffi::avio_alloc_context(
            buffer,
            AVIO_BUFFER_SIZE as c_int,
            0,
            opaque as *mut c_void,
            Some(read_packet),
            None,
            None,
        );
        if avio.is_null() {
            ffi::av_free(buffer as *mut c_void);
            drop(Box::from_raw(opaque));
            return Err(PlayerError::ResourceExhausted("无法分配 AVIOContext".to_string()));
        }
        Ok(Self { avio, opaque })
    }

    fn bytes_read(&self) -> u64 {
        // opaque 在 Drop 之前一直有效
        unsafe { (*self.opaque).bytes_read }
    }
}

impl Drop for CustomIo {
    fn drop(&mut self) {
        unsafe {
            // 缓冲区可能被 FFmpeg 换过，释放当前的那一块
            if !self.avio.is_null() {
                ffi::av_freep(&mut (*self.avio).buffer as *mut *mut u8 as *mut c_void);
                ffi::avio_context_free(&mut self.avio);
            }
            if !self.opaque.is_null() {
                drop(Box::from_raw(self.opaque));
                self.opaque = ptr::null_mut();
            }
        }
    }
}

/// 通过自定义 AVIO 打开字节流
unsafe fn open_custom_input(io: &CustomIo) -> Result<format::context::Input> {
    let mut ctx = ffi::avformat_alloc_context();
    if ctx.is_null() {
        return Err(PlayerError::ResourceExhausted("无法分配 AVFormatContext".to_string()));
    }
    (*ctx).pb = io.avio;
    (*ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;

    // 失败时 avformat_open_input 会释放 ctx
    let status = ffi::avformat_open_input(&mut ctx, ptr::null_mut(), ptr::null_mut(), ptr::null_mut());
    if status < 0 {
        return Err(PlayerError::OpenError(format!(
            "无法打开字节流: {}",
            ffmpeg::Error::from(status)
        )));
    }

    let status = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
    if status < 0 {
        ffi::avformat_close_input(&mut ctx);
        return Err(PlayerError::OpenError(format!(
            "无法读取流信息: {}",
            ffmpeg::Error::from(status)
        )));
    }
    Ok(format::context::Input::wrap(ctx))
}

/// 网络流的打开选项
fn network_options(url: &str) -> ffmpeg::Dictionary<'static> {
    let mut options = ffmpeg::Dictionary::new();
    // discardcorrupt: 丢弃损坏的帧；genpts: 生成 PTS
    options.set("fflags", "+discardcorrupt+genpts");
    options.set("analyzeduration", "5000000");
    options.set("probesize", "10000000");
    options.set("timeout", "15000000");
    options.set("rw_timeout", "8000000");
    options.set("buffer_size", "8388608");
    options.set("reconnect", "1");
    options.set("reconnect_streamed", "1");
    options.set("reconnect_delay_max", "4");

    if url.contains(".m3u8") {
        info!("🎬 HLS 流检测，应用 HLS 选项");
        options.set("live_start_index", "-1");
        options.set("max_reload", "10");
        options.set("http_persistent", "1");
    }
    options
}

/// 基于 FFmpeg 的数据包源：本地文件、网络 URL 或任意字节流
pub struct FfmpegDemuxer {
    // 先于 io 释放
    input: format::context::Input,
    io: Option<CustomIo>,
    video_index: usize,
    audio_index: Option<usize>,
    streams: StreamSet,
    description: String,
    packets_read: u64,
}

// 数据包源只在持有队列锁时访问，任一时刻只有一个线程使用
unsafe impl Send for FfmpegDemuxer {}

impl FfmpegDemuxer {
    pub fn open(source: MediaSource) -> Result<Self> {
        let (input, io, description) = match source {
            MediaSource::LocalFile(path) => {
                let description = path.display().to_string();
                info!("📁 打开本地文件: {}", description);
                let input = format::input(&path)
                    .map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", description, e)))?;
                (input, None, description)
            }
            MediaSource::Url(url) => {
                info!("🌐 打开网络流: {}", url);
                let input = format::input_with_dictionary(&url, network_options(&url))
                    .map_err(|e| PlayerError::OpenError(format!("无法打开网络流 {}: {}", url, e)))?;
                (input, None, url)
            }
            MediaSource::Reader(reader) => {
                info!("📥 打开字节流");
                let io = unsafe { CustomIo::new(reader)? };
                let input = unsafe { open_custom_input(&io)? };
                (input, Some(io), "byte stream".to_string())
            }
        };

        let video_index = input.streams().best(media::Type::Video).map(|s| s.index());
        let audio_index = input.streams().best(media::Type::Audio).map(|s| s.index());

        debug!("视频流索引: {:?}", video_index);
        debug!("音频流索引: {:?}", audio_index);

        // 先组装，出错时按字段顺序释放（input 先于 io）
        let mut demuxer = Self {
            input,
            io,
            video_index: 0,
            audio_index,
            streams: StreamSet {
                video: None,
                audio: None,
            },
            description,
            packets_read: 0,
        };
        demuxer.video_index = video_index.ok_or(PlayerError::NoVideoStream)?;
        Ok(demuxer)
    }

    /// 为选中的视频流创建解码器
    pub fn open_video_decoder(&mut self) -> Result<FfmpegVideoDecoder> {
        let stream = self.input.stream(self.video_index).ok_or(PlayerError::NoVideoStream)?;
        let decoder = FfmpegVideoDecoder::from_stream(&stream)?;
        self.streams.video = Some(decoder.info().clone());
        Ok(decoder)
    }

    /// 为选中的音频流创建解码器；没有音频流时返回 Ok(None)，有音频流但无法创建解码器时返回错误
    pub fn open_audio_decoder(&mut self) -> Result<Option<FfmpegAudioDecoder>> {
        let Some(index) = self.audio_index else {
            return Ok(None);
        };
        let stream = self
            .input
            .stream(index)
            .ok_or_else(|| PlayerError::DecoderInit(format!("音频流 #{} 不存在", index)))?;
        let decoder = FfmpegAudioDecoder::from_stream(&stream)?;
        self.streams.audio = Some(decoder.info().clone());
        Ok(Some(decoder))
    }

    fn classify(&self, index: usize) -> Option<StreamKind> {
        if index == self.video_index {
            Some(StreamKind::Video)
        } else if Some(index) == self.audio_index {
            Some(StreamKind::Audio)
        } else {
            None
        }
    }
}

impl PacketSource for FfmpegDemuxer {
    fn streams(&self) -> &StreamSet {
        &self.streams
    }

    fn read_next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let mut av_packet = ffmpeg::Packet::empty();
            match av_packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    debug!("📄 {} 到达末尾（共 {} 个包）", self.description, self.packets_read);
                    return Ok(None);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => continue,
                Err(e) => return Err(e.into()),
            }

            // 其他流（字幕、数据）直接丢弃
            let Some(stream) = self.classify(av_packet.stream()) else {
                continue;
            };
            self.packets_read += 1;
            return Ok(Some(Packet {
                stream,
                data: av_packet.data().map(|d| d.to_vec()).unwrap_or_default(),
                pts: av_packet.pts(),
                dts: av_packet.dts(),
                duration: av_packet.duration(),
                keyframe: av_packet.is_key(),
            }));
        }
    }

    fn description(&self) -> String {
        match &self.io {
            Some(io) => format!("{}（已读取 {} 字节）", self.description, io.bytes_read()),
            None => self.description.clone(),
        }
    }
}
