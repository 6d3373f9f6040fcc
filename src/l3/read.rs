//! Incoming half of the content-framing driver.

use super::header::{decode_dtls_hs_header, decode_tls_hs_header, DTLS_HS_HEADER_LEN, TLS_HS_HEADER_LEN};
use super::{ChannelState, HandshakeState};
use crate::error::Error;
use crate::l2::{L2Read, ReadStart};
use crate::proto::{AlertLevel, ContentType, Epoch, Protocol};
use crate::splice::{ExtendedReader, Reader};
use crate::log::trace;

/// What [`L3In::read`] found. Handshake/app-data bodies aren't inlined
/// here — fetch them via [`L3In::hs_reader`]/[`L3In::app_reader`] after
/// matching on the event, then close the record with
/// [`L3In::read_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    Alert {
        epoch: Epoch,
        level: AlertLevel,
        description: u8,
    },
    Ccs {
        epoch: Epoch,
    },
    AppData {
        epoch: Epoch,
    },
    /// A new handshake message (TLS) or fragment (DTLS) started. `len`
    /// is the full logical message length; for DTLS, `frag_offset`/
    /// `frag_len` describe where this record's bytes sit within it —
    /// reassembling fragments that arrive out of order across separate
    /// `read` calls is left to the caller.
    Handshake {
        epoch: Epoch,
        typ: u8,
        len: u32,
        seq_nr: Option<u16>,
        frag_offset: u32,
        frag_len: u32,
    },
    /// A further TLS record continuing a message previously suspended
    /// with [`L3In::read_pause_handshake`]. Carries no header fields —
    /// the caller already has them from the original `Handshake` event.
    HandshakeContinuation {
        epoch: Epoch,
    },
}

struct HsIn {
    state: HandshakeState,
    ext: Option<ExtendedReader>,
    epoch: Epoch,
}

impl HsIn {
    fn new() -> Self {
        Self {
            state: HandshakeState::None,
            ext: None,
            epoch: Epoch(0),
        }
    }
}

pub struct L3In {
    protocol: Protocol,
    state: ChannelState,
    raw: Option<Reader>,
    hs: HsIn,
}

impl L3In {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            state: ChannelState::None,
            raw: None,
            hs: HsIn::new(),
        }
    }

    fn abort_current(&mut self, l2: &mut impl L2Read) -> Result<(), Error> {
        self.raw = None;
        self.hs.ext = None;
        self.hs.state = HandshakeState::None;
        self.state = ChannelState::None;
        l2.read_done()
    }

    /// Starts the next record. Fails with [`Error::OperationUnexpected`]
    /// if the previous one hasn't been closed with
    /// [`L3In::read_consume`]/[`L3In::read_pause_handshake`] yet.
    pub fn read(&mut self, l2: &mut impl L2Read) -> Result<ReadEvent, Error> {
        if self.state != ChannelState::None {
            return Err(Error::OperationUnexpected);
        }

        let ReadStart { typ, epoch, rd } = l2.read_start()?;

        if typ == ContentType::Handshake && self.hs.state == HandshakeState::Paused {
            if epoch != self.hs.epoch {
                self.raw = Some(rd);
                self.abort_current(l2)?;
                return Err(Error::InvalidContent);
            }
            self.hs.ext.as_mut().ok_or(Error::InternalError)?.attach(rd)?;
            self.state = ChannelState::Handshake;
            self.hs.state = HandshakeState::Active;
            return Ok(ReadEvent::HandshakeContinuation { epoch });
        }

        match typ {
            ContentType::Alert => {
                self.raw = Some(rd);
                self.state = ChannelState::Alert;
                let reader = self.raw.as_mut().unwrap();
                let mut n = 0;
                let chunk = match reader.get(2, Some(&mut n)) {
                    Ok(c) => c,
                    Err(e) => {
                        self.abort_current(l2)?;
                        return Err(e);
                    }
                };
                if n < 2 {
                    self.abort_current(l2)?;
                    return Err(Error::InvalidContent);
                }
                let level = AlertLevel::from_u8(chunk[0]);
                let description = chunk[1];
                self.raw.as_mut().unwrap().commit()?;
                if !level.is_known() {
                    self.abort_current(l2)?;
                    return Err(Error::InvalidContent);
                }
                Ok(ReadEvent::Alert {
                    epoch,
                    level,
                    description,
                })
            }
            ContentType::ChangeCipherSpec => {
                self.raw = Some(rd);
                self.state = ChannelState::Ccs;
                let reader = self.raw.as_mut().unwrap();
                let ok = match reader.get(1, None) {
                    Ok(chunk) => chunk[0] == 1,
                    Err(_) => false,
                };
                if !ok {
                    self.abort_current(l2)?;
                    return Err(Error::InvalidContent);
                }
                self.raw.as_mut().unwrap().commit()?;
                Ok(ReadEvent::Ccs { epoch })
            }
            ContentType::ApplicationData => {
                self.raw = Some(rd);
                self.state = ChannelState::App;
                Ok(ReadEvent::AppData { epoch })
            }
            ContentType::Ack => {
                self.raw = Some(rd);
                self.abort_current(l2)?;
                Err(Error::InvalidContent)
            }
            ContentType::Handshake => {
                self.raw = Some(rd);
                let reader = self.raw.as_mut().unwrap();

                let (hdr_typ, len, seq_nr, frag_offset, frag_len) = match self.protocol {
                    Protocol::Tls => {
                        let chunk = match reader.get(TLS_HS_HEADER_LEN, None) {
                            Ok(c) => c,
                            Err(_) => {
                                self.abort_current(l2)?;
                                return Err(Error::InvalidContent);
                            }
                        };
                        let (t, l) = match decode_tls_hs_header(chunk) {
                            Some(v) => v,
                            None => {
                                self.abort_current(l2)?;
                                return Err(Error::InvalidContent);
                            }
                        };
                        (t, l, None, 0u32, l)
                    }
                    Protocol::Dtls => {
                        let chunk = match reader.get(DTLS_HS_HEADER_LEN, None) {
                            Ok(c) => c,
                            Err(_) => {
                                self.abort_current(l2)?;
                                return Err(Error::InvalidContent);
                            }
                        };
                        match decode_dtls_hs_header(chunk) {
                            Some((t, l, seq, fo, fl)) if fo + fl <= l => (t, l, Some(seq), fo, fl),
                            _ => {
                                self.abort_current(l2)?;
                                return Err(Error::InvalidContent);
                            }
                        }
                    }
                };
                self.raw.as_mut().unwrap().commit()?;
                let rd = self.raw.take().unwrap();

                let bound = match self.protocol {
                    Protocol::Tls => len as usize,
                    Protocol::Dtls => frag_len as usize,
                };
                let mut ext = ExtendedReader::init_ext(bound);
                ext.attach(rd)?;
                self.hs.ext = Some(ext);
                self.hs.state = HandshakeState::Active;
                self.hs.epoch = epoch;
                self.state = ChannelState::Handshake;

                Ok(ReadEvent::Handshake {
                    epoch,
                    typ: hdr_typ,
                    len,
                    seq_nr,
                    frag_offset,
                    frag_len,
                })
            }
            ContentType::Unknown(_) => {
                self.raw = Some(rd);
                self.abort_current(l2)?;
                Err(Error::InvalidContent)
            }
        }
    }

    pub fn app_reader(&mut self) -> Result<&mut Reader, Error> {
        if self.state != ChannelState::App {
            return Err(Error::OperationUnexpected);
        }
        self.raw.as_mut().ok_or(Error::InternalError)
    }

    pub fn hs_reader(&mut self) -> Result<&mut ExtendedReader, Error> {
        if self.state != ChannelState::Handshake {
            return Err(Error::OperationUnexpected);
        }
        self.hs.ext.as_mut().ok_or(Error::InternalError)
    }

    /// Closes the current record. For a handshake message/fragment this
    /// requires the extended reader to report the whole logical extent
    /// consumed; use [`L3In::read_pause_handshake`] instead to stop
    /// partway through a TLS message that continues in a later record.
    pub fn read_consume(&mut self, l2: &mut impl L2Read) -> Result<(), Error> {
        match self.state {
            ChannelState::None => return Err(Error::OperationUnexpected),
            ChannelState::Handshake => {
                let ext = self.hs.ext.as_ref().ok_or(Error::InternalError)?;
                if !ext.check_done() {
                    return Err(Error::UnfinishedHsMsg);
                }
                self.hs.ext.as_mut().unwrap().detach()?;
                self.hs.ext = None;
                self.hs.state = HandshakeState::None;
            }
            ChannelState::Alert | ChannelState::Ccs | ChannelState::App | ChannelState::Ack => {}
        }
        self.raw = None;
        self.state = ChannelState::None;
        l2.read_done()
    }

    /// Suspends an in-progress TLS handshake message read, releasing
    /// the current record; the next `read` call that sees a further
    /// Handshake record resumes it as a [`ReadEvent::HandshakeContinuation`].
    pub fn read_pause_handshake(&mut self, l2: &mut impl L2Read) -> Result<(), Error> {
        if self.protocol != Protocol::Tls {
            return Err(Error::OperationUnexpected);
        }
        if self.state != ChannelState::Handshake || self.hs.state != HandshakeState::Active {
            return Err(Error::OperationUnexpected);
        }
        trace!("pausing handshake read");
        self.hs.ext.as_mut().ok_or(Error::InternalError)?.detach()?;
        self.state = ChannelState::None;
        self.hs.state = HandshakeState::Paused;
        l2.read_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l2::mock::MockL2;

    #[test]
    fn alert_round_trip() {
        let mut l2 = MockL2::new();
        l2.push_incoming(ContentType::Alert, Epoch(0), vec![2, 7]);
        let mut inp = L3In::new(Protocol::Tls);

        match inp.read(&mut l2).unwrap() {
            ReadEvent::Alert { level, description, .. } => {
                assert_eq!(level, AlertLevel::Fatal);
                assert_eq!(description, 7);
            }
            _ => panic!("expected alert"),
        }
        inp.read_consume(&mut l2).unwrap();
    }

    #[test]
    fn ccs_with_bad_byte_is_invalid_content() {
        let mut l2 = MockL2::new();
        l2.push_incoming(ContentType::ChangeCipherSpec, Epoch(0), vec![5]);
        let mut inp = L3In::new(Protocol::Tls);
        assert_eq!(inp.read(&mut l2).unwrap_err(), Error::InvalidContent);
    }

    #[test]
    fn ack_record_is_rejected_in_this_version() {
        let mut l2 = MockL2::new();
        l2.push_incoming(ContentType::Ack, Epoch(0), vec![0, 0]);
        let mut inp = L3In::new(Protocol::Tls);
        assert_eq!(inp.read(&mut l2).unwrap_err(), Error::InvalidContent);
    }

    #[test]
    fn single_record_handshake_message() {
        let mut l2 = MockL2::new();
        let mut body = vec![1, 0, 0, 3];
        body.extend_from_slice(&[9, 8, 7]);
        l2.push_incoming(ContentType::Handshake, Epoch(0), body);
        let mut inp = L3In::new(Protocol::Tls);

        match inp.read(&mut l2).unwrap() {
            ReadEvent::Handshake { typ, len, .. } => {
                assert_eq!(typ, 1);
                assert_eq!(len, 3);
            }
            _ => panic!("expected handshake"),
        }
        let ext = inp.hs_reader().unwrap();
        let chunk = ext.get_ext(3, None).unwrap().to_vec();
        assert_eq!(chunk, vec![9, 8, 7]);
        inp.hs_reader().unwrap().commit_ext().unwrap();
        inp.read_consume(&mut l2).unwrap();
    }

    #[test]
    fn handshake_paused_across_two_records() {
        let mut l2 = MockL2::new();
        let mut first = vec![1, 0, 0, 6];
        first.extend_from_slice(&[1, 2, 3]);
        l2.push_incoming(ContentType::Handshake, Epoch(0), first);
        l2.push_incoming(ContentType::Handshake, Epoch(0), vec![4, 5, 6]);
        let mut inp = L3In::new(Protocol::Tls);

        inp.read(&mut l2).unwrap();
        let ext = inp.hs_reader().unwrap();
        ext.get_ext(3, None).unwrap();
        ext.commit_ext().unwrap();
        inp.read_pause_handshake(&mut l2).unwrap();

        match inp.read(&mut l2).unwrap() {
            ReadEvent::HandshakeContinuation { .. } => {}
            _ => panic!("expected continuation"),
        }
        let ext = inp.hs_reader().unwrap();
        let chunk = ext.get_ext(3, None).unwrap().to_vec();
        assert_eq!(chunk, vec![4, 5, 6]);
        ext.commit_ext().unwrap();
        inp.read_consume(&mut l2).unwrap();
    }

    #[test]
    fn dtls_fragment_bounds_are_validated() {
        let mut l2 = MockL2::new();
        // frag_offset(3) + frag_len(3) > len(4): malformed.
        let body = vec![1, 0, 0, 4, 0, 0, 0, 0, 3, 0, 0, 3, 9, 9, 9];
        l2.push_incoming(ContentType::Handshake, Epoch(0), body);
        let mut inp = L3In::new(Protocol::Dtls);
        assert_eq!(inp.read(&mut l2).unwrap_err(), Error::InvalidContent);
    }
}
