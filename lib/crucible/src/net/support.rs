use std::io;
use std::net;

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Two-armed error taxonomy for the non-blocking plumbing. `Wait` means the
/// operation cannot progress right now and control should return to the
/// readiness loop; `Fatal` faults terminate the connection (or, during
/// initialisation, the process).
#[derive(Debug, Eq, PartialEq)]
pub enum NetworkError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorType {
    FrameTooLarge,
    TooManyArgs,
    Malformed,
    AddrParse,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}
