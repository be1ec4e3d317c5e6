use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem::size_of;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::deadline::Deadline;

pub const RPC_MAGIC: [u8; 2] = [b'%', b'N'];

/// Which of the four call patterns a method uses. Immutable once a call
/// session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Unary,
    ServerStream,
    ClientStream,
    BidiStream,
}

impl CallShape {
    #[inline]
    pub(crate) fn wire(self) -> u8 {
        match self {
            Self::Unary => 1,
            Self::ServerStream => 2,
            Self::ClientStream => 3,
            Self::BidiStream => 4,
        }
    }

    #[inline]
    pub(crate) fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Unary),
            2 => Some(Self::ServerStream),
            3 => Some(Self::ClientStream),
            4 => Some(Self::BidiStream),
            _ => None,
        }
    }

    /// The caller may send at most one application message
    #[inline(always)]
    pub fn single_request(&self) -> bool {
        matches!(self, Self::Unary | Self::ServerStream)
    }

    /// The serving side may send at most one application message
    #[inline(always)]
    pub fn single_response(&self) -> bool {
        matches!(self, Self::Unary | Self::ClientStream)
    }
}

/// Identifies a service method and its shape
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CallDesc {
    pub method: &'static str,
    pub shape: CallShape,
}

impl fmt::Debug for CallDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({:?})", self.method, self.shape)
    }
}

/// Frame kinds carried on a call stream.
///
/// HEADERS opens the call; MSG carries one application message;
/// CLOSE_SEND half-closes the sender's direction; CANCEL carries the
/// initiator's terminal status to the peer; STATUS carries the serving
/// side's terminal status (the trailer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Headers = 1,
    Msg = 2,
    CloseSend = 3,
    Cancel = 4,
    Status = 5,
}

impl FrameKind {
    #[inline]
    fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Headers),
            2 => Some(Self::Msg),
            3 => Some(Self::CloseSend),
            4 => Some(Self::Cancel),
            5 => Some(Self::Status),
            _ => None,
        }
    }
}

/// Every frame on a call stream starts with this head:
///
/// Fixed len of FrameHead = 8B
/// | 2B   |1B | 1B  | 4B      |
/// | magic|ver| kind| body_len|
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, PartialEq, Clone, Copy)]
#[repr(packed)]
pub struct FrameHead {
    pub magic: [u8; 2],
    pub ver: u8,
    pub kind: u8,
    pub body_len: u32,
}

pub const FRAME_HEAD_LEN: usize = size_of::<FrameHead>();

impl fmt::Display for FrameHead {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = self.kind;
        let body_len = self.body_len;
        write!(f, "[frame kind:{} body:{}]", kind, body_len)
    }
}

impl fmt::Debug for FrameHead {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A borrowed view of a decoded frame
#[derive(Debug, PartialEq)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub body: &'a [u8],
}

#[inline]
pub fn encode_frame(kind: FrameKind, body: &[u8]) -> Vec<u8> {
    let head = FrameHead {
        magic: RPC_MAGIC,
        ver: 1,
        kind: kind as u8,
        body_len: body.len() as u32,
    };
    let mut buf = Vec::with_capacity(FRAME_HEAD_LEN + body.len());
    buf.extend_from_slice(head.as_bytes());
    buf.extend_from_slice(body);
    buf
}

#[inline]
pub fn decode_frame(buf: &[u8]) -> Result<Frame<'_>, ()> {
    let Some(head) = FrameHead::read_from_prefix(buf) else {
        warn!("short frame of {} bytes", buf.len());
        return Err(());
    };
    if head.magic != RPC_MAGIC {
        warn!("wrong magic received {:?}", head.magic);
        return Err(());
    }
    if head.ver != 1 {
        warn!("frame version {} not supported", head.ver);
        return Err(());
    }
    let Some(kind) = FrameKind::from_wire(head.kind) else {
        warn!("unknown frame kind {}", head.kind);
        return Err(());
    };
    let body = &buf[FRAME_HEAD_LEN..];
    if body.len() != head.body_len as usize {
        warn!("frame length mismatch: head says {}, got {}", { head.body_len }, body.len());
        return Err(());
    }
    Ok(Frame { kind, body })
}

/// The call-initiation record carried in the HEADERS frame body.
///
/// The timeout travels as relative millis and is re-anchored to an absolute
/// instant by the receiving hop; 0 means no deadline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallHeader {
    pub method: String,
    pub shape: u8,
    pub timeout_ms: u64,
}

impl CallHeader {
    pub fn new(desc: &CallDesc, deadline: Option<Deadline>) -> Self {
        Self {
            method: desc.method.to_string(),
            shape: desc.shape.wire(),
            timeout_ms: deadline.map(|d| d.to_timeout_ms()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_len() {
        assert_eq!(FRAME_HEAD_LEN, 8);
    }

    #[test]
    fn test_frame_roundtrip() {
        let buf = encode_frame(FrameKind::Msg, b"hello");
        let frame = decode_frame(&buf).expect("decode");
        assert_eq!(frame.kind, FrameKind::Msg);
        assert_eq!(frame.body, b"hello");
    }

    #[test]
    fn test_frame_empty_body() {
        let buf = encode_frame(FrameKind::CloseSend, b"");
        let frame = decode_frame(&buf).expect("decode");
        assert_eq!(frame.kind, FrameKind::CloseSend);
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_frame_bad_magic() {
        let mut buf = encode_frame(FrameKind::Msg, b"x");
        buf[0] = b'!';
        assert!(decode_frame(&buf).is_err());
    }

    #[test]
    fn test_frame_bad_kind() {
        let mut buf = encode_frame(FrameKind::Msg, b"x");
        buf[3] = 99;
        assert!(decode_frame(&buf).is_err());
    }

    #[test]
    fn test_shape_wire() {
        for shape in
            [CallShape::Unary, CallShape::ServerStream, CallShape::ClientStream, CallShape::BidiStream]
        {
            assert_eq!(CallShape::from_wire(shape.wire()), Some(shape));
        }
        assert_eq!(CallShape::from_wire(0), None);
        assert_eq!(CallShape::from_wire(5), None);
    }
}
