use crossfire::*;
use note_rpc_engine::transport::{CallConn, Closed, FrameRx, FrameTx};

/// One in-process call stream endpoint: a bounded queue per direction.
pub struct MemCall {
    pub(crate) tx: MAsyncTx<Vec<u8>>,
    pub(crate) rx: AsyncRx<Vec<u8>>,
}

impl CallConn for MemCall {
    type Tx = MemFrameTx;
    type Rx = MemFrameRx;

    fn split(self) -> (MemFrameTx, MemFrameRx) {
        (MemFrameTx { tx: Some(self.tx) }, MemFrameRx { rx: self.rx })
    }
}

pub struct MemFrameTx {
    tx: Option<MAsyncTx<Vec<u8>>>,
}

impl FrameTx for MemFrameTx {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), Closed> {
        match self.tx.as_ref() {
            None => Err(Closed),
            Some(tx) => tx.send(frame).await.map_err(|_| Closed),
        }
    }

    fn close(&mut self) {
        // dropping the sender lets the peer drain in-flight frames and
        // then observe Closed
        self.tx.take();
    }
}

pub struct MemFrameRx {
    pub(crate) rx: AsyncRx<Vec<u8>>,
}

impl FrameRx for MemFrameRx {
    async fn recv_frame(&mut self) -> Result<Vec<u8>, Closed> {
        self.rx.recv().await.map_err(|_| Closed)
    }
}
