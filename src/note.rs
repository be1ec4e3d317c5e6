//! Message types of the Note Service.
//!
//! Field presence follows the schema contract: optional scalars are
//! `Option` (unset is distinct from the zero value), repeated and map
//! fields are always present and default to empty, the attachment group is
//! exclusive (setting one member clears the other), and enum fields decode
//! unknown wire values to an `Unrecognized` marker instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who can see a note. Encoded as i32 on the wire so new values added by a
/// newer peer never break an older reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Private,
    Shared,
    Public,
    Unrecognized(i32),
}

impl Visibility {
    #[inline]
    pub fn from_wire(v: i32) -> Self {
        match v {
            0 => Self::Private,
            1 => Self::Shared,
            2 => Self::Public,
            other => Self::Unrecognized(other),
        }
    }

    #[inline]
    pub fn wire(self) -> i32 {
        match self {
            Self::Private => 0,
            Self::Shared => 1,
            Self::Public => 2,
            Self::Unrecognized(v) => v,
        }
    }
}

impl Serialize for Visibility {
    #[inline]
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i32(self.wire())
    }
}

impl<'de> Deserialize<'de> for Visibility {
    #[inline]
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Visibility::from_wire(i32::deserialize(d)?))
    }
}

/// The exclusive attachment group: at most one member is set at a time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Attachment {
    Link(String),
    Sketch(Vec<u8>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Note {
    #[serde(default)]
    pub id: String,
    pub title: String,
    /// Unset carries no value, distinct from an empty string
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    attachment: Option<Attachment>,
}

impl Note {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Default::default() }
    }

    /// Set the link member. Switching from a sketch clears it; re-setting
    /// an active link overwrites the value in place, with no transient
    /// unset state.
    pub fn set_link(&mut self, url: impl Into<String>) {
        match self.attachment.as_mut() {
            Some(Attachment::Link(l)) => *l = url.into(),
            _ => self.attachment = Some(Attachment::Link(url.into())),
        }
    }

    /// Set the sketch member; the counterpart of [Note::set_link].
    pub fn set_sketch(&mut self, data: Vec<u8>) {
        match self.attachment.as_mut() {
            Some(Attachment::Sketch(s)) => *s = data,
            _ => self.attachment = Some(Attachment::Sketch(data)),
        }
    }

    #[inline]
    pub fn link(&self) -> Option<&str> {
        match self.attachment.as_ref() {
            Some(Attachment::Link(l)) => Some(l.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn sketch(&self) -> Option<&[u8]> {
        match self.attachment.as_ref() {
            Some(Attachment::Sketch(s)) => Some(s.as_slice()),
            _ => None,
        }
    }

    #[inline]
    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CreateNoteRequest {
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GetNoteRequest {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListByTagRequest {
    pub tag: String,
}

/// Reply of the client-streaming import: how many notes were stored.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ImportSummary {
    pub count: u64,
}

/// Per-upsert ack on the bidirectional sync stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub id: String,
    /// Position of the upsert within this sync session
    pub seq: u64,
}

/// Field-level validation failure, attached to INVALID_ARGUMENT statuses
/// as a typed detail.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldViolation {
    pub field: String,
    pub description: String,
}

/// Detail kind under which [FieldViolation] travels.
pub const FIELD_VIOLATION_KIND: &str = "note.FieldViolation";

#[cfg(test)]
mod tests {
    use super::*;
    use note_rpc_codec::MsgpCodec;
    use note_rpc_core::Codec;

    #[test]
    fn test_exclusive_attachment() {
        let mut note = Note::new("draft");
        assert!(note.attachment().is_none());

        note.set_link("https://example.com/a");
        assert_eq!(note.link(), Some("https://example.com/a"));
        assert_eq!(note.sketch(), None);

        // setting the other member clears the first
        note.set_sketch(vec![1, 2, 3]);
        assert_eq!(note.link(), None);
        assert_eq!(note.sketch(), Some(&[1u8, 2, 3][..]));

        // re-setting the active member just overwrites the value
        note.set_sketch(vec![4]);
        assert_eq!(note.sketch(), Some(&[4u8][..]));

        note.clear_attachment();
        assert!(note.attachment().is_none());
    }

    #[test]
    fn test_optional_text_presence() {
        let codec = MsgpCodec::default();
        let mut note = Note::new("n");
        assert_eq!(note.text, None);
        let decoded: Note = codec.decode(&codec.encode(&note).expect("enc")).expect("dec");
        assert_eq!(decoded.text, None);

        note.text = Some(String::new());
        let decoded: Note = codec.decode(&codec.encode(&note).expect("enc")).expect("dec");
        // set-to-empty survives as set, not as unset
        assert_eq!(decoded.text, Some(String::new()));
    }

    #[test]
    fn test_note_roundtrip() {
        let codec = MsgpCodec::default();
        let mut note = Note::new("groceries");
        note.id = "note-7".to_string();
        note.tags = vec!["errand".to_string(), "home".to_string()];
        note.labels.insert("prio".to_string(), "low".to_string());
        note.visibility = Visibility::Shared;
        note.set_link("https://example.com/list");
        let decoded: Note = codec.decode(&codec.encode(&note).expect("enc")).expect("dec");
        assert_eq!(decoded, note);
    }

    #[test]
    fn test_unknown_visibility_decodes_to_unrecognized() {
        let codec = MsgpCodec::default();
        // a newer peer writes a visibility value this reader does not know
        #[derive(serde::Serialize)]
        struct NewerNote {
            title: String,
            visibility: i32,
        }
        let wire = codec.encode(&NewerNote { title: "x".to_string(), visibility: 7 }).expect("enc");
        let decoded: Note = codec.decode(&wire).expect("dec");
        assert_eq!(decoded.visibility, Visibility::Unrecognized(7));
        // and it re-encodes with the original wire value preserved
        assert_eq!(decoded.visibility.wire(), 7);
    }
}
