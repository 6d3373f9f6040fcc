use std::fmt;

/// Every failure mode the splicer (writer/reader) and the content-framing
/// driver can report.
///
/// Variants fall into three families (see the module docs for the exact
/// contract of each operation):
///
/// - precondition violations (`OperationUnexpected`, `InvalidArg`,
///   `BoundsViolation`, `TooManyGroups`): the object is left unchanged and
///   remains usable. These are caller bugs.
/// - recoverable progress signals (`Retry`, `NeedMore`, `DataLeft`,
///   `OutOfData`): the object is in a well-defined state; the caller
///   should retry after supplying more buffer space, flushing, or feeding.
/// - fatal content errors (`InvalidContent`, `UnfinishedHsMsg`,
///   `InternalError`): the driver's state is unspecified after these;
///   tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `reclaim` without `force` when uncommitted bytes remain in `out`.
    DataLeft,
    /// A caller-supplied argument violates a documented precondition.
    InvalidArg,
    /// `feed` drained some, but not all, of a pending queue; feed again.
    NeedMore,
    /// The call is not valid in the object's current state.
    OperationUnexpected,
    /// There isn't enough room to satisfy a `get` without a `buflen` out
    /// parameter to report a shorter length.
    OutOfData,
    /// A `get_ext`/`group_open` request would cross a logical size bound.
    BoundsViolation,
    /// `group_open` was called with the group stack already at capacity.
    TooManyGroups,
    /// Parsed record content failed validation (bad alert level, CCS byte,
    /// DTLS fragment bounds, ...).
    InvalidContent,
    /// A handshake message was closed before the extended reader/writer
    /// considered it fully consumed/produced.
    UnfinishedHsMsg,
    /// Non-handshake content was dispatched while a TLS handshake is
    /// paused and interleaving is disallowed.
    NoInterleaving,
    /// The operation made no progress and should be retried once the
    /// caller has reacted to the described condition (flush, new record).
    Retry,
    /// Something that should be statically impossible happened; the
    /// driver must be torn down.
    InternalError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DataLeft => "uncommitted data remains in the output buffer",
            Self::InvalidArg => "invalid argument",
            Self::NeedMore => "queue not fully drained, feed another buffer",
            Self::OperationUnexpected => "operation not valid in current state",
            Self::OutOfData => "not enough buffer space available",
            Self::BoundsViolation => "request crosses a logical size bound",
            Self::TooManyGroups => "group stack is at capacity",
            Self::InvalidContent => "record content failed validation",
            Self::UnfinishedHsMsg => "handshake message not fully consumed",
            Self::NoInterleaving => "cannot interleave content into a paused handshake",
            Self::Retry => "no progress made, retry",
            Self::InternalError => "internal error",
        };
        f.write_str(s)
    }
}

impl std::error::Error for Error {}
