use crate::conn::MemCall;
use crossfire::*;
use note_rpc_engine::transport::{CallConnector, Closed};
use std::fmt;

/// Client endpoint of an in-process connection.
pub struct MemConnector {
    accept_tx: MTx<MemCall>,
    window: usize,
}

impl MemConnector {
    pub(crate) fn new(accept_tx: MTx<MemCall>, window: usize) -> Self {
        Self { accept_tx, window }
    }
}

impl fmt::Debug for MemConnector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mem connector (window {})", self.window)
    }
}

impl CallConnector for MemConnector {
    type Conn = MemCall;

    async fn open_call(&self) -> Result<MemCall, Closed> {
        let (c2s_tx, c2s_rx) = mpsc::bounded_async::<Vec<u8>>(self.window);
        let (s2c_tx, s2c_rx) = mpsc::bounded_async::<Vec<u8>>(self.window);
        let server_half = MemCall { tx: s2c_tx, rx: c2s_rx };
        if self.accept_tx.send(server_half).is_err() {
            debug!("{:?} peer acceptor is gone", self);
            return Err(Closed);
        }
        Ok(MemCall { tx: c2s_tx, rx: s2c_rx })
    }
}
