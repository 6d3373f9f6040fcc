//! The L2 collaborator contract: the record cryptography/framing layer
//! below the content-framing driver. Out of this crate's scope to
//! implement for real (no crypto, no transport I/O) — these traits are
//! the seam the driver is built against, exactly as the spec's external
//! interfaces section describes.

use crate::error::Error;
use crate::proto::{ContentType, Epoch};
use crate::splice::{Reader, Writer};

/// What `read_start` yields: the next available record's content type,
/// epoch, and a reader over its (already decrypted) bytes.
pub struct ReadStart {
    pub typ: ContentType,
    pub epoch: Epoch,
    pub rd: Reader,
}

pub trait L2Read {
    fn read_start(&mut self) -> Result<ReadStart, Error>;
    /// Releases the current reader; must be called before the next
    /// `read_start`.
    fn read_done(&mut self) -> Result<(), Error>;
}

pub trait L2Write {
    /// Begin a record of the given type/epoch, handing over an
    /// already-fed writer to splice content into.
    fn write_start(&mut self, typ: ContentType, epoch: Epoch) -> Result<Writer, Error>;
    /// Close the current record for dispatch, taking the writer back.
    fn write_done(&mut self, wr: Writer) -> Result<(), Error>;
    /// Drain all pending records to the transport.
    fn write_flush(&mut self) -> Result<(), Error>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! An in-memory L2 stand-in used by the content-framing driver's
    //! unit tests: records are plain `type | u24-length | body` framed
    //! byte strings in a shared `Vec<u8>`, with a small fixed write
    //! buffer size so writer-queue overflow paths actually get exercised.
    use super::*;
    use std::collections::VecDeque;

    pub(crate) const WRITE_BUF_SIZE: usize = 32;

    pub(crate) struct MockL2 {
        pub(crate) wire: Vec<u8>,
        incoming: VecDeque<(ContentType, Epoch, Vec<u8>)>,
        current_write: Option<(ContentType, Epoch, Vec<u8>)>,
    }

    impl MockL2 {
        pub(crate) fn new() -> Self {
            Self {
                wire: Vec::new(),
                incoming: VecDeque::new(),
                current_write: None,
            }
        }

        /// Feed a decoded record straight into the read queue (as if it
        /// had arrived over the wire and been decrypted by L2).
        pub(crate) fn push_incoming(&mut self, typ: ContentType, epoch: Epoch, body: Vec<u8>) {
            self.incoming.push_back((typ, epoch, body));
        }

        /// Split the most recently flushed wire bytes back into records
        /// a test can inspect or re-feed as `push_incoming`.
        pub(crate) fn take_wire(&mut self) -> Vec<u8> {
            std::mem::take(&mut self.wire)
        }
    }

    impl L2Read for MockL2 {
        fn read_start(&mut self) -> Result<ReadStart, Error> {
            let (typ, epoch, body) = self
                .incoming
                .pop_front()
                .ok_or(Error::Retry)?;
            Ok(ReadStart {
                typ,
                epoch,
                rd: Reader::new(body),
            })
        }

        fn read_done(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    impl L2Write for MockL2 {
        fn write_start(&mut self, typ: ContentType, epoch: Epoch) -> Result<Writer, Error> {
            let mut wr = Writer::new(Some(vec![0u8; 4096]));
            wr.feed(vec![0u8; WRITE_BUF_SIZE])?;
            self.current_write = Some((typ, epoch, Vec::new()));
            Ok(wr)
        }

        fn write_done(&mut self, mut wr: Writer) -> Result<(), Error> {
            let (typ, _epoch, mut body) = self.current_write.take().ok_or(Error::InternalError)?;

            // `reclaim` only ever reports the currently-held `out` buffer;
            // any committed bytes that spilled into the writer's queue
            // need further feed/reclaim cycles to drain, exactly as a
            // real provider's event loop would do between record writes.
            loop {
                let reclaimed = wr.reclaim(true)?;
                body.extend_from_slice(&reclaimed.buffer[..reclaimed.written]);
                if reclaimed.queued == 0 {
                    break;
                }
                loop {
                    match wr.feed(vec![0u8; WRITE_BUF_SIZE]) {
                        Ok(()) => break,
                        Err(Error::NeedMore) => continue,
                        Err(e) => return Err(e),
                    }
                }
            }

            // This mock ships every closed record to the wire immediately;
            // it has no transport-level batching to defer, so there is
            // nothing for `write_flush` to drain.
            self.wire.push(typ.to_u8());
            let len = body.len() as u32;
            self.wire.extend_from_slice(&len.to_be_bytes()[1..]);
            self.wire.extend_from_slice(&body);
            Ok(())
        }

        fn write_flush(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }
}
