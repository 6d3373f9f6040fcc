//! Read-side twin of [`super::writer::Writer`].
//!
//! Out of the core's required scope (the spec treats the reader's
//! internal algorithm as an external collaborator, specified only at the
//! interface level), but a concrete implementation is needed to actually
//! exercise the content-framing driver end to end, so this mirrors the
//! writer's `get`/`commit` contract over a single already-received
//! record's bytes. `get` returns [`crate::error::Error::OutOfData`] once
//! the record's content is exhausted — that's the record-boundary
//! condition the framing driver reacts to with `RETRY` in TLS mode.

use crate::error::Error;

pub struct Reader {
    buf: Vec<u8>,
    committed: usize,
    end: usize,
}

impl Reader {
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            buf,
            committed: 0,
            end: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.end
    }

    pub fn get(&mut self, desired: usize, buflen: Option<&mut usize>) -> Result<&[u8], Error> {
        let avail = self.remaining();
        let d = if avail >= desired {
            desired
        } else {
            match buflen {
                None => return Err(Error::OutOfData),
                Some(bl) => {
                    *bl = avail;
                    avail
                }
            }
        };
        let start = self.end;
        self.end += d;
        Ok(&self.buf[start..start + d])
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        self.committed = self.end;
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_within_bounds() {
        let mut r = Reader::new(vec![1, 2, 3, 4]);
        let chunk = r.get(2, None).unwrap();
        assert_eq!(chunk, &[1, 2]);
        r.commit().unwrap();
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn get_past_end_fails_without_buflen() {
        let mut r = Reader::new(vec![1, 2]);
        assert_eq!(r.get(4, None).unwrap_err(), Error::OutOfData);
    }

    #[test]
    fn get_past_end_shortens_with_buflen() {
        let mut r = Reader::new(vec![1, 2]);
        let mut n = 0;
        let chunk = r.get(4, Some(&mut n)).unwrap();
        assert_eq!(n, 2);
        assert_eq!(chunk, &[1, 2]);
    }
}
