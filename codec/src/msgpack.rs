use crate::Codec;
use serde::{Deserialize, Serialize};

#[derive(Default)]
pub struct MsgpCodec();

impl Codec for MsgpCodec {
    #[inline(always)]
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, ()> {
        match rmp_serde::encode::to_vec_named(msg) {
            Ok(buf) => return Ok(buf),
            Err(e) => {
                log::error!("encode error: {:?}", e);
                return Err(());
            }
        }
    }

    /// Serialize the msg into buf (with std::io::Write), and return the size written
    fn encode_into<T: Serialize>(&self, msg: &T, buf: &mut Vec<u8>) -> Result<usize, ()> {
        let pre_len = buf.len();
        if let Err(e) = rmp_serde::encode::write_named(buf, msg) {
            log::error!("encode error: {:?}", e);
            return Err(());
        } else {
            Ok(buf.len() - pre_len)
        }
    }

    #[inline(always)]
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, ()> {
        match rmp_serde::decode::from_slice::<T>(buf) {
            Err(e) => {
                log::warn!("decode error: {:?}", e);
                return Err(());
            }
            Ok(s) => return Ok(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use note_rpc_core::status::{Code, ErrorDetail, Status};

    #[test]
    fn test_msgp() {
        let codec = MsgpCodec::default();
        let encoded = codec.encode(&()).expect("encode");
        println!("encoded () size :{}", encoded.len());
        let _decoded: () = codec.decode(&encoded).expect("decode");
    }

    #[test]
    fn test_status_roundtrip_bare() {
        let codec = MsgpCodec::default();
        let st = Status::ok();
        let decoded = Status::decode(&codec, &st.encode(&codec));
        assert_eq!(decoded, st);
    }

    #[test]
    fn test_status_roundtrip_full() {
        let codec = MsgpCodec::default();
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct FieldViolation {
            field: String,
            description: String,
        }
        let violation =
            FieldViolation { field: "title".to_string(), description: "must not be empty".to_string() };
        let st = Status::invalid_argument("bad request")
            .with_domain("notes.example.com")
            .with_reason("TITLE_EMPTY")
            .with_detail("note.FieldViolation", &violation, &codec)
            .with_detail("note.Opaque", &vec![1u8, 2, 3], &codec);
        assert_eq!(st.details.len(), 2);

        let decoded = Status::decode(&codec, &st.encode(&codec));
        assert_eq!(decoded, st);
        let got: FieldViolation =
            decoded.detail_as("note.FieldViolation", &codec).expect("detail");
        assert_eq!(got, violation);
        // unknown kind stays opaque instead of failing the decode
        assert!(decoded.detail_as::<FieldViolation, _>("note.Opaque", &codec).is_none());
    }

    #[test]
    fn test_status_roundtrip_many_details() {
        let codec = MsgpCodec::default();
        let mut st = Status::internal("boom");
        for i in 0..5 {
            st.details.push(ErrorDetail { kind: format!("k{}", i), data: vec![i as u8; i] });
        }
        let decoded = Status::decode(&codec, &st.encode(&codec));
        assert_eq!(decoded, st);
        assert_eq!(decoded.code, Code::Internal);
    }

    #[test]
    fn test_status_decode_garbage() {
        let codec = MsgpCodec::default();
        let st = Status::decode(&codec, b"\xff\xff\xff");
        assert_eq!(st.code, Code::Unknown);
    }
}
