use crate::core::{Packet, Result, StreamSet};

/// 数据包源抽象接口
///
/// 不同的媒体源（本地文件、网络流、字节流回调等）都实现这个接口，
/// 解码核心只通过它按顺序拉取已解封装的数据包
pub trait PacketSource: Send {
    /// 打开时选中的视频/音频流
    fn streams(&self) -> &StreamSet;

    /// 读取下一个数据包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个视频或音频包
    /// - Ok(None): 到达末尾
    /// - Err(e): 读取错误
    fn read_next_packet(&mut self) -> Result<Option<Packet>>;

    /// 获取描述信息（用于日志）
    fn description(&self) -> String;
}
