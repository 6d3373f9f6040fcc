//! A hierarchical, size-bounded accountant stacked on top of a
//! [`Writer`](super::writer::Writer): enforces logical message and
//! nested group boundaries, with an optional "hold" mode that defers
//! commits until the final logical size is known.

use super::writer::Writer;
use crate::error::Error;

/// Small constant, statically sufficient for the nesting the framing
/// driver ever produces (header / body / extension, at most).
pub const MAX_GROUPS: usize = 5;

/// Sentinel for "this group's size isn't known yet" — used internally
/// for the root group of a handshake message whose length is backfilled
/// at dispatch time. Callers of the framing driver use `Option<u32>`
/// instead; this is purely an implementation detail of the group stack.
pub const UNKNOWN: usize = usize::MAX;

/// Commit propagation policy. `Blocked` is latched: once a `Hold`
/// attachment sees a partial commit, no further `get_ext`/`commit_ext`
/// is allowed until `detach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passthrough {
    Pass,
    Hold,
    Blocked,
}

/// What [`ExtendedWriter::detach`] reports about the logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachReport {
    pub committed: usize,
    pub uncommitted: usize,
}

pub struct ExtendedWriter {
    wr: Option<Writer>,
    grp_end: [usize; MAX_GROUPS],
    cur_grp: usize,
    ofs_fetch: usize,
    ofs_commit: usize,
    passthrough: Passthrough,
}

impl ExtendedWriter {
    /// Root group of `size` bytes (use [`UNKNOWN`] for a length learned
    /// only once the body has been written), not attached.
    pub fn init_ext(size: usize) -> Self {
        let mut grp_end = [0; MAX_GROUPS];
        grp_end[0] = size;
        Self {
            wr: None,
            grp_end,
            cur_grp: 0,
            ofs_fetch: 0,
            ofs_commit: 0,
            passthrough: Passthrough::Pass,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.wr.is_some()
    }

    /// Bind an underlying writer, taking ownership of it for the
    /// duration of the attachment.
    pub fn attach(&mut self, wr: Writer, pass: Passthrough) -> Result<(), Error> {
        if self.wr.is_some() {
            return Err(Error::OperationUnexpected);
        }
        self.wr = Some(wr);
        self.passthrough = pass;
        Ok(())
    }

    /// Unbind, reporting committed/uncommitted logical offsets and
    /// dropping any uncommitted bytes from the logical accounting.
    /// Returns the underlying writer to its caller.
    pub fn detach(&mut self) -> Result<(Writer, DetachReport), Error> {
        let wr = self.wr.take().ok_or(Error::OperationUnexpected)?;
        let report = DetachReport {
            committed: self.ofs_commit,
            uncommitted: self.ofs_fetch - self.ofs_commit,
        };
        self.ofs_fetch = self.ofs_commit;
        self.passthrough = Passthrough::Pass;
        Ok((wr, report))
    }

    fn require_active(&self) -> Result<(), Error> {
        if self.wr.is_none() {
            return Err(Error::OperationUnexpected);
        }
        if self.passthrough == Passthrough::Blocked {
            return Err(Error::OperationUnexpected);
        }
        Ok(())
    }

    pub fn get_ext(&mut self, desired: usize, buflen: Option<&mut usize>) -> Result<&mut [u8], Error> {
        self.require_active()?;
        let logic_avail = self.grp_end[self.cur_grp] - self.ofs_fetch;
        if desired > logic_avail {
            return Err(Error::BoundsViolation);
        }

        let mut actual = desired;
        let wr = self.wr.as_mut().unwrap();
        let chunk = if let Some(bl) = buflen {
            let out = wr.get(desired, Some(bl))?;
            actual = *bl;
            out
        } else {
            wr.get(desired, None)?
        };
        self.ofs_fetch += actual;
        Ok(chunk)
    }

    pub fn commit_partial_ext(&mut self, omit: usize) -> Result<(), Error> {
        self.require_active()?;
        if omit > self.ofs_fetch - self.ofs_commit {
            return Err(Error::BoundsViolation);
        }
        self.ofs_commit = self.ofs_fetch - omit;

        match self.passthrough {
            Passthrough::Pass => {
                self.wr.as_mut().unwrap().commit_partial(omit)?;
                self.ofs_fetch = self.ofs_commit;
            }
            Passthrough::Hold if omit > 0 => {
                self.passthrough = Passthrough::Blocked;
            }
            Passthrough::Hold => {}
            Passthrough::Blocked => unreachable!("require_active rejects Blocked"),
        }
        Ok(())
    }

    pub fn commit_ext(&mut self) -> Result<(), Error> {
        self.commit_partial_ext(0)
    }

    pub fn group_open(&mut self, size: usize) -> Result<(), Error> {
        if self.cur_grp == MAX_GROUPS - 1 {
            return Err(Error::TooManyGroups);
        }
        if size > self.grp_end[self.cur_grp] - self.ofs_fetch {
            return Err(Error::BoundsViolation);
        }
        self.grp_end[self.cur_grp + 1] = self.ofs_fetch + size;
        self.cur_grp += 1;
        Ok(())
    }

    pub fn group_close(&mut self) -> Result<(), Error> {
        if self.grp_end[self.cur_grp] != self.ofs_fetch {
            return Err(Error::BoundsViolation);
        }
        self.cur_grp = self.cur_grp.saturating_sub(1);
        Ok(())
    }

    pub fn check_done(&self) -> bool {
        self.cur_grp == 0 && (self.grp_end[0] == UNKNOWN || self.ofs_commit == self.grp_end[0])
    }

    pub fn ofs_fetch(&self) -> usize {
        self.ofs_fetch
    }

    pub fn ofs_commit(&self) -> usize {
        self.ofs_commit
    }
}
