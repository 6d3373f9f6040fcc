//! Read-side twin of [`super::ext_writer::ExtendedWriter`].
//!
//! The spec only requires a single size bound on the read side (no
//! nested groups: a handshake message being read never needs to carve
//! out sub-extents the way the writer does for header backfill), so
//! this is the minimal `attach`/`get_ext`/`commit_ext`/`check_done`
//! contract described in the external-interfaces section.

use super::reader::Reader;
use crate::error::Error;

pub struct ExtendedReader {
    rd: Option<Reader>,
    bound: usize,
    ofs_fetch: usize,
    ofs_commit: usize,
}

impl ExtendedReader {
    pub fn init_ext(bound: usize) -> Self {
        Self {
            rd: None,
            bound,
            ofs_fetch: 0,
            ofs_commit: 0,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.rd.is_some()
    }

    pub fn attach(&mut self, rd: Reader) -> Result<(), Error> {
        if self.rd.is_some() {
            return Err(Error::OperationUnexpected);
        }
        self.rd = Some(rd);
        Ok(())
    }

    pub fn detach(&mut self) -> Result<Reader, Error> {
        self.rd.take().ok_or(Error::OperationUnexpected)
    }

    pub fn get_ext(&mut self, desired: usize, buflen: Option<&mut usize>) -> Result<&[u8], Error> {
        let logic_avail = self.bound - self.ofs_fetch;
        if desired > logic_avail {
            return Err(Error::BoundsViolation);
        }
        let rd = self.rd.as_mut().ok_or(Error::OperationUnexpected)?;

        let mut actual = desired;
        let chunk = if let Some(bl) = buflen {
            let out = rd.get(desired, Some(bl))?;
            actual = *bl;
            out
        } else {
            rd.get(desired, None)?
        };
        self.ofs_fetch += actual;
        Ok(chunk)
    }

    pub fn commit_ext(&mut self) -> Result<(), Error> {
        self.rd.as_mut().ok_or(Error::OperationUnexpected)?.commit()?;
        self.ofs_commit = self.ofs_fetch;
        Ok(())
    }

    pub fn check_done(&self) -> bool {
        self.ofs_commit == self.bound
    }

    pub fn remaining(&self) -> usize {
        self.bound - self.ofs_fetch
    }

    pub fn bound(&self) -> usize {
        self.bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_enforced() {
        let mut ext = ExtendedReader::init_ext(4);
        ext.attach(Reader::new(vec![1, 2, 3, 4, 5])).unwrap();
        assert_eq!(ext.get_ext(5, None).unwrap_err(), Error::BoundsViolation);
        ext.get_ext(4, None).unwrap();
        ext.commit_ext().unwrap();
        assert!(ext.check_done());
    }
}
