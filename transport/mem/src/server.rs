use crate::conn::MemCall;
use crossfire::*;
use note_rpc_engine::transport::{CallAcceptor, Closed};
use std::fmt;

/// Server endpoint of an in-process connection.
pub struct MemAcceptor {
    accept_rx: AsyncRx<MemCall>,
}

impl MemAcceptor {
    pub(crate) fn new(accept_rx: AsyncRx<MemCall>) -> Self {
        Self { accept_rx }
    }
}

impl fmt::Debug for MemAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mem acceptor")
    }
}

impl CallAcceptor for MemAcceptor {
    type Conn = MemCall;

    async fn accept_call(&mut self) -> Result<MemCall, Closed> {
        self.accept_rx.recv().await.map_err(|_| Closed)
    }
}
