//! 音频声道布局.
//!
//! 头部只给出声道数时布局未指定; 探测结束时单声道和立体声会补成标准布局.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// 扬声器位置掩码
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelMask: u64 {
        const FRONT_LEFT    = 1 << 0;
        const FRONT_RIGHT   = 1 << 1;
        const FRONT_CENTER  = 1 << 2;
        /// 低频效果
        const LOW_FREQUENCY = 1 << 3;
        const BACK_LEFT     = 1 << 4;
        const BACK_RIGHT    = 1 << 5;
        const SIDE_LEFT     = 1 << 9;
        const SIDE_RIGHT    = 1 << 10;
    }
}

/// 声道布局
///
/// `mask` 为空表示只知道声道数, 排列未指定.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelLayout {
    pub channels: u32,
    pub mask: ChannelMask,
}

impl ChannelLayout {
    pub const MONO: Self = Self {
        channels: 1,
        mask: ChannelMask::FRONT_CENTER,
    };

    pub const STEREO: Self = Self {
        channels: 2,
        mask: ChannelMask::FRONT_LEFT.union(ChannelMask::FRONT_RIGHT),
    };

    /// 只有声道数, 排列未指定
    pub fn unspecified(channels: u32) -> Self {
        Self {
            channels,
            mask: ChannelMask::empty(),
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.mask.is_empty()
    }

    /// 单声道和立体声的标准布局, 其他声道数没有默认排列
    pub fn native_for(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(Self::MONO),
            2 => Some(Self::STEREO),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MONO => write!(f, "mono"),
            Self::STEREO => write!(f, "stereo"),
            _ if self.is_unspecified() => write!(f, "{} channels", self.channels),
            _ => write!(f, "{}ch({:#x})", self.channels, self.mask.bits()),
        }
    }
}
