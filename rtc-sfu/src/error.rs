use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("id already registered: {0}")]
    ErrDuplicateId(String),
    #[error("ssrc already claimed by another producer: {0}")]
    ErrSsrcConflict(u32),
    #[error("not found: {0}")]
    ErrNotFound(String),
    #[error("compound packet of {0} bytes exceeds the rtcp buffer")]
    ErrBufferOverflow(usize),
    #[error("malformed packet: {0}")]
    ErrMalformedPacket(String),
    #[error("transport closed")]
    ErrTransportClosed,
    #[error("send buffer size must be a power of two between 1 and 32768")]
    ErrInvalidSendBufferSize,

    #[error("{0}")]
    OtherRtcpErr(String),
    #[error("{0}")]
    OtherRtpErr(String),
}

impl From<rtcp::Error> for Error {
    fn from(e: rtcp::Error) -> Self {
        Error::OtherRtcpErr(e.to_string())
    }
}

impl From<util::Error> for Error {
    fn from(e: util::Error) -> Self {
        Error::OtherRtpErr(e.to_string())
    }
}
