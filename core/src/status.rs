use crate::Codec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status taxonomy.
///
/// The numeric values follow the common gRPC assignment so the envelope is
/// readable by peers that speak that contract. Membership is fixed; a wire
/// value outside it decodes to [Code::Unknown] rather than failing.
#[derive(strum::Display, strum::EnumString, strum::AsRefStr, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Code {
    #[strum(serialize = "OK")]
    Ok = 0,
    #[strum(serialize = "CANCELLED")]
    Cancelled = 1,
    #[strum(serialize = "UNKNOWN")]
    Unknown = 2,
    #[strum(serialize = "INVALID_ARGUMENT")]
    InvalidArgument = 3,
    #[strum(serialize = "DEADLINE_EXCEEDED")]
    DeadlineExceeded = 4,
    #[strum(serialize = "NOT_FOUND")]
    NotFound = 5,
    #[strum(serialize = "FAILED_PRECONDITION")]
    FailedPrecondition = 9,
    #[strum(serialize = "INTERNAL")]
    Internal = 13,
    #[strum(serialize = "UNAVAILABLE")]
    Unavailable = 14,
    #[strum(serialize = "UNAUTHENTICATED")]
    Unauthenticated = 16,
}

// The default Debug derive would ignore the strum strings
impl fmt::Debug for Code {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<u32> for Code {
    fn from(v: u32) -> Self {
        match v {
            0 => Self::Ok,
            1 => Self::Cancelled,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            9 => Self::FailedPrecondition,
            13 => Self::Internal,
            14 => Self::Unavailable,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }
}

impl Serialize for Code {
    #[inline]
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(*self as u32)
    }
}

impl<'de> Deserialize<'de> for Code {
    #[inline]
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Code::from(u32::deserialize(d)?))
    }
}

/// One typed payload attached to a [Status].
///
/// `kind` names the payload type (e.g. "note.FieldViolation"); `data` is the
/// payload encoded with the ordinary message codec. A reader that does not
/// know the kind keeps the detail as an opaque blob.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorDetail {
    pub kind: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[detail {} {}B]", self.kind, self.data.len())
    }
}

/// The terminal outcome of a call session.
///
/// Produced at most once per session; immutable after construction.
/// Travels in the STATUS frame, encoded with the same codec as application
/// messages.
#[derive(thiserror::Error, Serialize, Deserialize, Clone, PartialEq)]
pub struct Status {
    pub code: Code,
    pub message: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

impl Status {
    #[inline]
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), domain: None, reason: None, details: Vec::new() }
    }

    #[inline]
    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    #[inline]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    #[inline]
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    #[inline]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    #[inline]
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    #[inline]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    #[inline]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach a typed detail payload. Construction never fails: if the
    /// payload does not encode, the status is returned without it.
    pub fn with_detail<T: Serialize, C: Codec>(
        mut self, kind: impl Into<String>, payload: &T, codec: &C,
    ) -> Self {
        if let Ok(data) = codec.encode(payload) {
            self.details.push(ErrorDetail { kind: kind.into(), data });
        }
        self
    }

    /// Decode the first detail of the given kind. Unknown kinds and
    /// undecodable payloads yield None; the raw detail stays in `details`.
    pub fn detail_as<'a, T: Deserialize<'a>, C: Codec>(
        &'a self, kind: &str, codec: &C,
    ) -> Option<T> {
        for d in self.details.iter() {
            if d.kind == kind {
                if let Ok(v) = codec.decode(&d.data) {
                    return Some(v);
                }
            }
        }
        None
    }

    #[inline(always)]
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Serialize for the terminal-status frame. Falls back to a bare
    /// INTERNAL envelope so the peer always gets something decodable.
    pub fn encode<C: Codec>(&self, codec: &C) -> Vec<u8> {
        match codec.encode(self) {
            Ok(buf) => buf,
            Err(()) => {
                let bare = Status::internal("status encode failed");
                codec.encode(&bare).unwrap_or_default()
            }
        }
    }

    /// Inverse of [Status::encode]. An undecodable buffer maps to UNKNOWN
    /// instead of surfacing a codec error in place of the peer's status.
    pub fn decode<C: Codec>(codec: &C, buf: &[u8]) -> Self {
        match codec.decode::<Status>(buf) {
            Ok(st) => st,
            Err(()) => Status::new(Code::Unknown, "undecodable status frame"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(reason) = self.reason.as_ref() {
            write!(f, "({})", reason)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Status {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_code_strings() {
        assert_eq!(Code::DeadlineExceeded.as_ref(), "DEADLINE_EXCEEDED");
        let c = Code::from_str("CANCELLED").expect("parse");
        assert_eq!(c, Code::Cancelled);
        assert!(Code::from_str("NO_SUCH_CODE").is_err());
    }

    #[test]
    fn test_code_unknown_wire_value() {
        assert_eq!(Code::from(2u32), Code::Unknown);
        assert_eq!(Code::from(999u32), Code::Unknown);
        assert_eq!(Code::from(9u32), Code::FailedPrecondition);
    }

    #[test]
    fn test_status_display() {
        let st = Status::not_found("no such note")
            .with_domain("notes.example.com")
            .with_reason("NOTE_MISSING");
        let s = format!("{}", st);
        assert_eq!(s, "NOT_FOUND(NOTE_MISSING): no such note");
    }
}
