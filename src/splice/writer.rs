//! A stateful buffer splicer: adapts a provider of record-sized output
//! buffers to a consumer emitting variable-size logical writes.
//!
//! A [`Writer`] cycles between two states:
//!
//! - **Providing**: no output buffer is held; the writer is waiting for
//!   [`Writer::feed`].
//! - **Consuming**: an output buffer (`out`) is held, plus an optional
//!   overflow `queue` that absorbs writes too large for `out`.
//!
//! The state is an explicit field rather than encoded in the type,
//! because a single `Writer` value is reused across many feed/reclaim
//! cycles and the queue's bookkeeping (`queue_next`, `queue_remaining`)
//! must survive the transition back to Providing.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Providing,
    Consuming,
}

/// What [`Writer::reclaim`] handed back: the buffer the provider gave us
/// (now free to reuse or ship), plus how many of its bytes the consumer
/// actually committed, and how many committed bytes spilled into the
/// queue for the next cycle to drain.
#[derive(Debug)]
pub struct Reclaimed {
    pub buffer: Vec<u8>,
    pub written: usize,
    pub queued: usize,
}

/// See the module docs for the state machine this implements.
pub struct Writer {
    out: Option<Vec<u8>>,
    out_len: usize,
    queue: Option<Vec<u8>>,
    queue_len: usize,
    committed: usize,
    end: usize,
    queue_next: usize,
    queue_remaining: usize,
    state: State,
}

impl Writer {
    /// Start in Providing, with an optional overflow queue of the given
    /// buffer's length.
    pub fn new(queue_buf: Option<Vec<u8>>) -> Self {
        let queue_len = queue_buf.as_ref().map_or(0, |q| q.len());
        Self {
            out: None,
            out_len: 0,
            queue: queue_buf,
            queue_len,
            committed: 0,
            end: 0,
            queue_next: 0,
            queue_remaining: 0,
            state: State::Providing,
        }
    }

    fn require_consuming(&self) -> Result<(), Error> {
        match self.state {
            State::Consuming => Ok(()),
            State::Providing => Err(Error::OperationUnexpected),
        }
    }

    /// Providing -> Consuming. Adopts `buf` as the current output buffer.
    ///
    /// If a queue is carrying bytes left over from a previous
    /// [`Writer::reclaim`], they are copied into `buf` first. If `buf`
    /// isn't big enough to drain the whole queue, this returns
    /// [`Error::NeedMore`] and stays in Providing: call `feed` again
    /// with a fresh buffer.
    pub fn feed(&mut self, mut buf: Vec<u8>) -> Result<(), Error> {
        if self.state != State::Providing {
            return Err(Error::OperationUnexpected);
        }

        let mut copied = 0;
        if self.queue_remaining > 0 {
            let queue = self.queue.as_ref().expect("queue_remaining > 0 implies queue");
            let n = self.queue_remaining.min(buf.len());
            buf[..n].copy_from_slice(&queue[self.queue_next..self.queue_next + n]);
            self.queue_next += n;
            self.queue_remaining -= n;
            copied = n;

            if self.queue_remaining > 0 {
                return Err(Error::NeedMore);
            }
            self.queue_next = 0;
        }

        self.out_len = buf.len();
        self.out = Some(buf);
        self.committed = copied;
        self.end = copied;
        self.state = State::Consuming;
        Ok(())
    }

    /// Hand out the next `desired` bytes of the consumer's logical
    /// stream. If `buflen` is `Some`, a shorter-than-`desired` chunk may
    /// be returned (its length is written back); if `buflen` is `None`,
    /// anything less than `desired` fails with [`Error::OutOfData`].
    pub fn get(&mut self, desired: usize, mut buflen: Option<&mut usize>) -> Result<&mut [u8], Error> {
        self.require_consuming()?;

        if self.end > self.out_len {
            // Already serving out of the queue.
            let served = self.end - self.out_len;
            let remaining_cap = self.queue_len - (self.queue_next + served);
            let d = if remaining_cap >= desired {
                desired
            } else {
                match buflen.as_deref_mut() {
                    None => return Err(Error::OutOfData),
                    Some(_) => remaining_cap,
                }
            };
            let start = self.queue_next + served;
            self.end += d;
            if let Some(bl) = buflen {
                *bl = d;
            }
            return Ok(&mut self.queue.as_mut().unwrap()[start..start + d]);
        }

        let avail = self.out_len - self.end;
        if avail >= desired {
            let start = self.end;
            self.end += desired;
            if let Some(bl) = buflen {
                *bl = desired;
            }
            return Ok(&mut self.out.as_mut().unwrap()[start..start + desired]);
        }

        if self.queue.is_some() && self.queue_len > avail {
            // Out is too small for `desired` but the queue can take the
            // overflow: the tail `avail` bytes of `out` logically equal
            // the head `avail` bytes of `queue`, physically copied at
            // commit time.
            if buflen.is_none() && desired > self.queue_len {
                return Err(Error::OutOfData);
            }
            let d = desired.min(self.queue_len);
            self.queue_next = avail;
            self.end += d;
            if let Some(bl) = buflen {
                *bl = d;
            }
            return Ok(&mut self.queue.as_mut().unwrap()[0..d]);
        }

        // Out too small, no (or too-small) queue: truncate to what's left.
        if buflen.is_none() {
            return Err(Error::OutOfData);
        }
        let start = self.end;
        self.end += avail;
        if let Some(bl) = buflen {
            *bl = avail;
        }
        Ok(&mut self.out.as_mut().unwrap()[start..start + avail])
    }

    /// Retroactively write `data` into an already-fetched-but-possibly-
    /// uncommitted range `[offset, offset + data.len())` of the logical
    /// stream. Used to backfill a header whose length field is only
    /// known once the body has been written.
    pub fn patch(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        self.require_consuming()?;
        let patch_end = offset + data.len();
        if patch_end > self.end {
            return Err(Error::InvalidArg);
        }

        if patch_end <= self.out_len {
            self.out.as_mut().unwrap()[offset..patch_end].copy_from_slice(data);
            return Ok(());
        }

        if offset >= self.out_len {
            let q = self.queue_next + (offset - self.out_len);
            self.queue.as_mut().unwrap()[q..q + data.len()].copy_from_slice(data);
            return Ok(());
        }

        let in_out = self.out_len - offset;
        self.out.as_mut().unwrap()[offset..self.out_len].copy_from_slice(&data[..in_out]);
        let q = self.queue_next;
        self.queue.as_mut().unwrap()[q..q + (data.len() - in_out)].copy_from_slice(&data[in_out..]);
        Ok(())
    }

    /// Mark `end - omit` bytes final. `commit()` is `commit_partial(0)`.
    pub fn commit_partial(&mut self, omit: usize) -> Result<(), Error> {
        self.require_consuming()?;
        if omit > self.end - self.committed {
            return Err(Error::InvalidArg);
        }

        let new_commit = self.end - omit;

        if self.end > self.out_len
            && self.committed < self.out_len
            && new_commit > self.out_len - self.queue_next
        {
            // Physically copy the overlap region so `out` holds
            // everything committed up to its own end.
            let out_len = self.out_len;
            let qn = self.queue_next;
            let queue = self.queue.as_ref().unwrap();
            let src: Vec<u8> = queue[..qn].to_vec();
            self.out.as_mut().unwrap()[out_len - qn..out_len].copy_from_slice(&src);
        }

        if new_commit < self.out_len {
            self.queue_next = 0;
        }

        self.committed = new_commit;
        self.end = new_commit;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        self.commit_partial(0)
    }

    /// Consuming -> Providing. Gives the current `out` buffer back,
    /// reporting how much of it (and how much of the queue) the
    /// consumer committed. If some bytes of `out` were fetched but
    /// never committed and `force` is false, this fails with
    /// [`Error::DataLeft`] and the writer stays in Consuming.
    pub fn reclaim(&mut self, force: bool) -> Result<Reclaimed, Error> {
        self.require_consuming()?;

        let commit = self.committed;
        let out_len = self.out_len;

        let (written, queued) = if commit <= out_len {
            self.queue_next = 0;
            if commit < out_len && !force {
                return Err(Error::DataLeft);
            }
            (commit, 0)
        } else {
            self.queue_remaining = commit - out_len;
            (out_len, commit - out_len)
        };

        let buffer = self.out.take().unwrap();
        self.out_len = 0;
        self.committed = 0;
        self.end = 0;
        self.state = State::Providing;

        Ok(Reclaimed {
            buffer,
            written,
            queued,
        })
    }

    /// Bytes committed so far in the current Consuming cycle.
    ///
    /// The original header for this call asserted Providing state, but
    /// `committed` is only meaningful while Consuming; that disagreement
    /// looks like a documentation bug rather than intended behaviour, so
    /// this accessor follows the body and requires Consuming instead.
    pub fn bytes_written(&self) -> Result<usize, Error> {
        self.require_consuming()?;
        Ok(self.committed)
    }

    pub fn is_consuming(&self) -> bool {
        self.state == State::Consuming
    }

    /// Logical offset of the next byte `get` would hand out. Lets a
    /// caller remember where a reservation started so it can `patch` it
    /// later, without holding a live borrow across intervening calls.
    pub fn fetched(&self) -> Result<usize, Error> {
        self.require_consuming()?;
        Ok(self.end)
    }
}
