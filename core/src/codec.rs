use serde::{Deserialize, Serialize};

/*
 *  There is no unified output interface across serde backends, so whatever
 *  we serialize into (std::io::Write / Vec<u8>), the codec impl has to match.
 */

/// Interface for `note-rpc-codec`
///
/// The codec is immutable; if it needs changing state (like setting up a
/// cipher), it should have inner mutability.
pub trait Codec: Default + Send + Sync + Sized + 'static {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, ()>;

    /// Serialize the msg into buf (with std::io::Write), and return the size written
    fn encode_into<T: Serialize>(&self, msg: &T, buf: &mut Vec<u8>) -> Result<usize, ()>;

    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, ()>;
}
