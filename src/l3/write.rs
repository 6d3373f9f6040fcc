//! Outgoing half of the content-framing driver.

use super::header::{encode_dtls_hs_header, encode_tls_hs_header, DTLS_HS_HEADER_LEN, TLS_HS_HEADER_LEN};
use super::{ChannelState, HandshakeState, HandshakeWrite};
use crate::error::Error;
use crate::l2::L2Write;
use crate::proto::{ContentType, Epoch, Protocol};
use crate::splice::{ExtendedWriter, Passthrough, Writer};
use crate::splice::ext_writer::UNKNOWN;
use crate::log::trace;

struct HsOut {
    state: HandshakeState,
    ext: Option<ExtendedWriter>,
    typ: u8,
    epoch: Epoch,
    len: Option<u32>,
    seq_nr: Option<u16>,
    frag_offset: u32,
    frag_len: Option<u32>,
    header_offset: usize,
}

impl HsOut {
    fn new() -> Self {
        Self {
            state: HandshakeState::None,
            ext: None,
            typ: 0,
            epoch: Epoch(0),
            len: None,
            seq_nr: None,
            frag_offset: 0,
            frag_len: None,
            header_offset: 0,
        }
    }
}

pub struct L3Out {
    protocol: Protocol,
    state: ChannelState,
    raw: Option<Writer>,
    hs: HsOut,
    clearing: bool,
    allow_interleaved_sending: bool,
}

impl L3Out {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            state: ChannelState::None,
            raw: None,
            hs: HsOut::new(),
            clearing: false,
            allow_interleaved_sending: false,
        }
    }

    /// TLS allows non-handshake content (alerts, CCS) to be sent while a
    /// handshake message is paused; off by default, matching mbedTLS's
    /// conservative default.
    pub fn set_allow_interleaved_sending(&mut self, allow: bool) {
        self.allow_interleaved_sending = allow;
    }

    fn check_clear(&mut self, l2: &mut impl L2Write) -> Result<(), Error> {
        if self.clearing {
            l2.write_flush()?;
            self.clearing = false;
        }
        Ok(())
    }

    pub fn flush(&mut self, l2: &mut impl L2Write) -> Result<(), Error> {
        self.clearing = true;
        self.check_clear(l2)
    }

    fn prepare_write(
        &mut self,
        l2: &mut impl L2Write,
        typ: ContentType,
        epoch: Epoch,
    ) -> Result<(), Error> {
        if self.state != ChannelState::None {
            return Err(Error::OperationUnexpected);
        }
        if self.hs.state == HandshakeState::Paused
            && typ != ContentType::Handshake
            && !self.allow_interleaved_sending
        {
            return Err(Error::NoInterleaving);
        }
        self.check_clear(l2)?;

        let state = match typ {
            ContentType::Handshake => ChannelState::Handshake,
            ContentType::Alert => ChannelState::Alert,
            ContentType::ChangeCipherSpec => ChannelState::Ccs,
            ContentType::ApplicationData => ChannelState::App,
            ContentType::Ack | ContentType::Unknown(_) => return Err(Error::InvalidArg),
        };

        let writer = l2.write_start(typ, epoch)?;
        self.raw = Some(writer);
        self.state = state;
        Ok(())
    }

    /// Closes whatever channel is currently open: commits the CCS/alert
    /// byte(s) already written, backfills and closes the current
    /// handshake message, or simply hands application data off — then
    /// returns the writer to L2.
    pub fn dispatch(&mut self, l2: &mut impl L2Write) -> Result<(), Error> {
        match self.state {
            ChannelState::None => return Err(Error::OperationUnexpected),
            ChannelState::Handshake => {
                let ext = self.hs.ext.as_ref().ok_or(Error::InternalError)?;
                if !ext.check_done() {
                    return Err(Error::UnfinishedHsMsg);
                }
                let (mut writer, report) = self.hs.ext.as_mut().unwrap().detach()?;

                if self.hs.len.is_none() {
                    let committed = report.committed as u32;
                    self.hs.len = Some(committed);
                    let header: Vec<u8> = match self.protocol {
                        Protocol::Tls => encode_tls_hs_header(self.hs.typ, committed).to_vec(),
                        Protocol::Dtls => {
                            self.hs.frag_len = Some(committed);
                            encode_dtls_hs_header(
                                self.hs.typ,
                                committed,
                                self.hs.seq_nr.unwrap_or(0),
                                self.hs.frag_offset,
                                committed,
                            )
                            .to_vec()
                        }
                    };
                    writer.patch(self.hs.header_offset, &header)?;
                }

                writer.commit_partial(report.uncommitted)?;
                self.raw = Some(writer);
                self.hs.ext = None;
                self.hs.state = HandshakeState::None;
                trace!("dispatched handshake message, type {}", self.hs.typ);
            }
            ChannelState::Alert | ChannelState::Ccs => {
                self.raw.as_mut().ok_or(Error::InternalError)?.commit()?;
            }
            ChannelState::App | ChannelState::Ack => {}
        }

        let writer = self.raw.take().ok_or(Error::InternalError)?;
        l2.write_done(writer)?;
        self.state = ChannelState::None;
        Ok(())
    }

    fn abort_current(&mut self, l2: &mut impl L2Write) -> Result<(), Error> {
        self.clearing = true;
        self.state = ChannelState::None;
        if let Some(writer) = self.raw.take() {
            l2.write_done(writer)?;
        }
        Ok(())
    }

    pub fn write_alert(
        &mut self,
        l2: &mut impl L2Write,
        epoch: Epoch,
        level: u8,
        description: u8,
    ) -> Result<(), Error> {
        self.prepare_write(l2, ContentType::Alert, epoch)?;
        let writer = self.raw.as_mut().ok_or(Error::InternalError)?;
        match writer.get(2, None) {
            Ok(chunk) => {
                chunk[0] = level;
                chunk[1] = description;
            }
            Err(Error::OutOfData) => {
                self.abort_current(l2)?;
                return Err(Error::Retry);
            }
            Err(e) => return Err(e),
        }
        self.dispatch(l2)
    }

    pub fn write_ccs(&mut self, l2: &mut impl L2Write, epoch: Epoch) -> Result<(), Error> {
        self.prepare_write(l2, ContentType::ChangeCipherSpec, epoch)?;
        let writer = self.raw.as_mut().ok_or(Error::InternalError)?;
        match writer.get(1, None) {
            Ok(chunk) => chunk[0] = 1,
            Err(Error::OutOfData) => {
                self.abort_current(l2)?;
                return Err(Error::Retry);
            }
            Err(e) => return Err(e),
        }
        self.dispatch(l2)
    }

    /// Opens an application-data record and hands back the raw writer
    /// directly — unlike alert/CCS/handshake, app data has no framing of
    /// its own for this driver to manage. The caller writes via
    /// `get`/`commit` and closes the record with [`L3Out::dispatch`].
    pub fn write_app(&mut self, l2: &mut impl L2Write, epoch: Epoch) -> Result<&mut Writer, Error> {
        self.prepare_write(l2, ContentType::ApplicationData, epoch)?;
        self.raw.as_mut().ok_or(Error::InternalError)
    }

    /// Starts a new handshake message, or resumes one previously
    /// suspended by [`L3Out::pause_handshake`]. Returns the extended
    /// writer the caller should `get_ext`/`commit_ext`/`group_*` against;
    /// finish with [`L3Out::dispatch`].
    pub fn write_handshake(
        &mut self,
        l2: &mut impl L2Write,
        req: HandshakeWrite,
    ) -> Result<&mut ExtendedWriter, Error> {
        match self.hs.state {
            HandshakeState::Active => return Err(Error::OperationUnexpected),
            HandshakeState::Paused => {
                if self.protocol != Protocol::Tls {
                    return Err(Error::OperationUnexpected);
                }
                if req.epoch != self.hs.epoch || req.typ != self.hs.typ || req.len != self.hs.len {
                    return Err(Error::InvalidArg);
                }
            }
            HandshakeState::None => {}
        }

        if self.protocol == Protocol::Dtls {
            if req.frag_len.is_some() && req.len.is_none() {
                return Err(Error::InvalidArg);
            }
            if let (Some(len), Some(frag_len)) = (req.len, req.frag_len) {
                if req.frag_offset + frag_len > len {
                    return Err(Error::InvalidArg);
                }
            }
        }

        let resuming = self.hs.state == HandshakeState::Paused;
        self.prepare_write(l2, ContentType::Handshake, req.epoch)?;
        let mut writer = self.raw.take().ok_or(Error::InternalError)?;

        if resuming {
            self.hs
                .ext
                .as_mut()
                .ok_or(Error::InternalError)?
                .attach(writer, Passthrough::Pass)?;
            self.hs.state = HandshakeState::Active;
            return Ok(self.hs.ext.as_mut().unwrap());
        }

        let hdr_len = match self.protocol {
            Protocol::Tls => TLS_HS_HEADER_LEN,
            Protocol::Dtls => DTLS_HS_HEADER_LEN,
        };
        // `write_start` always hands back a writer mid-feed-cycle, so this
        // never actually fails; propagate anyway rather than unwrap.
        let header_offset = writer.fetched()?;

        let known_len = match self.protocol {
            Protocol::Tls => req.len,
            Protocol::Dtls => req.frag_len,
        };

        match writer.get(hdr_len, None) {
            Ok(chunk) => {
                if let Some(len) = known_len {
                    let header: Vec<u8> = match self.protocol {
                        Protocol::Tls => encode_tls_hs_header(req.typ, len).to_vec(),
                        Protocol::Dtls => encode_dtls_hs_header(
                            req.typ,
                            req.len.unwrap(),
                            req.seq_nr.unwrap_or(0),
                            req.frag_offset,
                            len,
                        )
                        .to_vec(),
                    };
                    chunk.copy_from_slice(&header);
                }
                // else: header bytes stay reserved-but-unwritten, backfilled
                // once the body length is known (`dispatch`).
            }
            Err(Error::OutOfData) => {
                self.raw = Some(writer);
                self.abort_current(l2)?;
                return Err(Error::Retry);
            }
            Err(e) => return Err(e),
        }

        let bound = known_len.map(|v| v as usize).unwrap_or(UNKNOWN);
        let pass = if bound == UNKNOWN {
            Passthrough::Hold
        } else {
            Passthrough::Pass
        };

        self.hs.typ = req.typ;
        self.hs.epoch = req.epoch;
        self.hs.len = req.len;
        self.hs.seq_nr = req.seq_nr;
        self.hs.frag_offset = req.frag_offset;
        self.hs.frag_len = req.frag_len;
        self.hs.header_offset = header_offset;
        self.hs.ext = Some(ExtendedWriter::init_ext(bound));
        self.hs.ext.as_mut().unwrap().attach(writer, pass)?;
        self.hs.state = HandshakeState::Active;
        Ok(self.hs.ext.as_mut().unwrap())
    }

    /// Suspends the in-progress handshake message, flushing whatever has
    /// been committed so far as a short record and releasing the raw
    /// writer. TLS only — DTLS fragments are resumed by sending a new
    /// record with the next `frag_offset`, not by pausing mid-record.
    /// Requires the final length to already be known (`req.len` was
    /// `Some` when the message was opened).
    pub fn pause_handshake(&mut self, l2: &mut impl L2Write) -> Result<(), Error> {
        if self.protocol != Protocol::Tls {
            return Err(Error::OperationUnexpected);
        }
        if self.state != ChannelState::Handshake || self.hs.state != HandshakeState::Active {
            return Err(Error::OperationUnexpected);
        }
        if self.hs.len.is_none() {
            return Err(Error::InvalidArg);
        }

        trace!("pausing handshake message, type {}", self.hs.typ);
        let (mut writer, report) = self.hs.ext.as_mut().ok_or(Error::InternalError)?.detach()?;
        writer.commit_partial(report.uncommitted)?;
        l2.write_done(writer)?;

        self.raw = None;
        self.state = ChannelState::None;
        self.hs.state = HandshakeState::Paused;
        Ok(())
    }

    /// Abandons the in-progress handshake message. Only valid before
    /// anything has been committed — once a header or body byte has been
    /// committed, the message must be finished with `dispatch` instead.
    pub fn write_abort_handshake(&mut self, l2: &mut impl L2Write) -> Result<(), Error> {
        if self.state != ChannelState::Handshake {
            return Err(Error::OperationUnexpected);
        }
        let (writer, report) = self.hs.ext.as_mut().ok_or(Error::InternalError)?.detach()?;
        if report.committed != 0 {
            return Err(Error::OperationUnexpected);
        }

        self.raw = Some(writer);
        self.abort_current(l2)?;
        self.hs.ext = None;
        self.hs.state = HandshakeState::None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l2::mock::MockL2;

    fn open_hs(len: Option<u32>) -> HandshakeWrite {
        HandshakeWrite {
            typ: 1,
            epoch: Epoch(0),
            len,
            seq_nr: None,
            frag_offset: 0,
            frag_len: None,
        }
    }

    #[test]
    fn tls_handshake_with_known_length_writes_header_immediately() {
        let mut l2 = MockL2::new();
        let mut out = L3Out::new(Protocol::Tls);

        let ext = out.write_handshake(&mut l2, open_hs(Some(3))).unwrap();
        let chunk = ext.get_ext(3, None).unwrap();
        chunk.copy_from_slice(&[10, 20, 30]);
        ext.commit_ext().unwrap();
        out.dispatch(&mut l2).unwrap();

        let wire = l2.take_wire();
        assert_eq!(wire[0], ContentType::Handshake.to_u8());
        assert_eq!(&wire[4..8], &[1, 0, 0, 3]);
        assert_eq!(&wire[8..11], &[10, 20, 30]);
    }

    #[test]
    fn tls_handshake_with_unknown_length_backfills_on_dispatch() {
        let mut l2 = MockL2::new();
        let mut out = L3Out::new(Protocol::Tls);

        let ext = out.write_handshake(&mut l2, open_hs(None)).unwrap();
        let chunk = ext.get_ext(5, None).unwrap();
        chunk.copy_from_slice(&[1, 2, 3, 4, 5]);
        ext.commit_ext().unwrap();
        out.dispatch(&mut l2).unwrap();

        let wire = l2.take_wire();
        assert_eq!(&wire[4..8], &[1, 0, 0, 5]);
        assert_eq!(&wire[8..13], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn pause_then_resume_tls_handshake_reassembles_one_message() {
        let mut l2 = MockL2::new();
        let mut out = L3Out::new(Protocol::Tls);

        let ext = out.write_handshake(&mut l2, open_hs(Some(6))).unwrap();
        ext.get_ext(3, None).unwrap().copy_from_slice(&[1, 2, 3]);
        ext.commit_ext().unwrap();
        out.pause_handshake(&mut l2).unwrap();

        let ext = out.write_handshake(&mut l2, open_hs(Some(6))).unwrap();
        ext.get_ext(3, None).unwrap().copy_from_slice(&[4, 5, 6]);
        ext.commit_ext().unwrap();
        out.dispatch(&mut l2).unwrap();

        let wire = l2.take_wire();
        // Two records: the paused prefix, then the rest.
        assert_eq!(wire[0], ContentType::Handshake.to_u8());
        let first_len = u32::from_be_bytes([0, wire[1], wire[2], wire[3]]) as usize;
        let second = &wire[4 + first_len..];
        assert_eq!(second[0], ContentType::Handshake.to_u8());
    }

    #[test]
    fn dispatch_without_finishing_message_fails() {
        let mut l2 = MockL2::new();
        let mut out = L3Out::new(Protocol::Tls);
        let ext = out.write_handshake(&mut l2, open_hs(Some(4))).unwrap();
        ext.get_ext(2, None).unwrap();
        ext.commit_ext().unwrap();
        assert_eq!(out.dispatch(&mut l2).unwrap_err(), Error::UnfinishedHsMsg);
    }

    #[test]
    fn alert_while_handshake_paused_needs_interleaving_enabled() {
        let mut l2 = MockL2::new();
        let mut out = L3Out::new(Protocol::Tls);

        let ext = out.write_handshake(&mut l2, open_hs(Some(2))).unwrap();
        ext.get_ext(2, None).unwrap();
        ext.commit_ext().unwrap();
        out.pause_handshake(&mut l2).unwrap();

        assert_eq!(
            out.write_alert(&mut l2, Epoch(0), 2, 0).unwrap_err(),
            Error::NoInterleaving
        );

        out.set_allow_interleaved_sending(true);
        out.write_alert(&mut l2, Epoch(0), 2, 0).unwrap();
    }

    #[test]
    fn dtls_handshake_fragment_uses_explicit_lengths() {
        let mut l2 = MockL2::new();
        let mut out = L3Out::new(Protocol::Dtls);

        let req = HandshakeWrite {
            typ: 1,
            epoch: Epoch(0),
            len: Some(10),
            seq_nr: Some(7),
            frag_offset: 0,
            frag_len: Some(10),
        };
        let ext = out.write_handshake(&mut l2, req).unwrap();
        ext.get_ext(10, None).unwrap().copy_from_slice(&[9u8; 10]);
        ext.commit_ext().unwrap();
        out.dispatch(&mut l2).unwrap();

        let wire = l2.take_wire();
        assert_eq!(&wire[4..8], &[1, 0, 0, 10]); // type, len
        assert_eq!(&wire[8..10], &[0, 7]); // seq
        assert_eq!(&wire[10..13], &[0, 0, 0]); // frag offset
        assert_eq!(&wire[13..16], &[0, 0, 10]); // frag len
    }

    #[test]
    fn write_abort_handshake_requires_nothing_committed() {
        let mut l2 = MockL2::new();
        let mut out = L3Out::new(Protocol::Tls);
        let ext = out.write_handshake(&mut l2, open_hs(Some(4))).unwrap();
        ext.get_ext(2, None).unwrap();
        ext.commit_ext().unwrap();
        assert_eq!(
            out.write_abort_handshake(&mut l2).unwrap_err(),
            Error::OperationUnexpected
        );
    }
}
