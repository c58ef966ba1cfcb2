use crate::net::buffer::Buffer;
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io;
use std::io::Write;

/// Upper bound on the byte length of a single frame body, counting everything
/// after the leading length field.
pub const MAX_MSG: usize = 4096;
/// Upper bound on the number of arguments in one request.
pub const MAX_ARGS: usize = 1024;
/// Bytes taken by the leading total-length field.
pub const HEADER_SIZE: usize = 4;

/// Reply status carried in the first four bytes of every response body.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResCode {
    Ok = 0,
    Err = 1,
    Nx = 2,
}

impl From<ResCode> for u32 {
    #[inline]
    fn from(code: ResCode) -> Self {
        code as u32
    }
}

impl ResCode {
    /// Decode a wire rescode. Anything outside the known set is a protocol
    /// violation on the sender's part.
    #[inline]
    pub fn from_wire(value: u32) -> NetworkResult<ResCode> {
        match value {
            0 => Ok(ResCode::Ok),
            1 => Ok(ResCode::Err),
            2 => Ok(ResCode::Nx),
            _ => Err(NetworkError::Fatal(ErrorType::Malformed)),
        }
    }
}

/// Parse one request body (the bytes after the total-length field) into its
/// argument vector. The arguments borrow from the input.
///
/// Fails when the argument count exceeds the limit, when any argument extends
/// past the body, or when bytes trail the last argument.
pub fn parse_request(body: &[u8]) -> NetworkResult<Vec<&[u8]>> {
    if body.len() < 4 {
        return Err(NetworkError::Fatal(ErrorType::Malformed));
    }

    let argc = LittleEndian::read_u32(&body[..4]) as usize;

    if argc > MAX_ARGS {
        return Err(NetworkError::Fatal(ErrorType::TooManyArgs));
    }

    let mut args = Vec::with_capacity(argc);
    let mut rest = &body[4..];

    for _ in 0..argc {
        if rest.len() < 4 {
            return Err(NetworkError::Fatal(ErrorType::Malformed));
        }

        let arg_len = LittleEndian::read_u32(&rest[..4]) as usize;
        rest = &rest[4..];

        if arg_len > rest.len() {
            return Err(NetworkError::Fatal(ErrorType::Malformed));
        }

        args.push(&rest[..arg_len]);
        rest = &rest[arg_len..];
    }

    if !rest.is_empty() {
        return Err(NetworkError::Fatal(ErrorType::Malformed));
    }

    Ok(args)
}

/// Append one complete response frame (length, rescode, payload) to the
/// write buffer. The caller guarantees the buffer has room for it: replies
/// are drained before the next request is extracted, and a maximal reply
/// exactly fits an empty buffer.
pub fn write_response(buffer: &mut Buffer, code: ResCode, payload: &[u8]) {
    let body_len = 4 + payload.len();

    assert!(body_len <= MAX_MSG, "reply body exceeds the frame limit");
    assert!(
        buffer.free_capacity() >= HEADER_SIZE + body_len,
        "reply does not fit in the write buffer"
    );

    let written = {
        let mut stream = buffer.write_slice();
        stream
            .write_u32::<LittleEndian>(body_len as u32)
            .expect("Error writing reply length");
        stream
            .write_u32::<LittleEndian>(u32::from(code))
            .expect("Error writing rescode");
        stream.write_all(payload).expect("Error writing reply payload");
        HEADER_SIZE + body_len
    };

    buffer.advance(written);
}

/// Encode one complete request frame onto the supplied writer. Used by the
/// blocking client side, so a partial write is driven to completion by the
/// writer itself.
pub fn write_request<W: io::Write>(mut stream: W, args: &[&[u8]]) -> NetworkResult<()> {
    if args.len() > MAX_ARGS {
        return Err(NetworkError::Fatal(ErrorType::TooManyArgs));
    }

    let mut body_len = 4;
    for arg in args {
        body_len += 4 + arg.len();
    }

    if body_len > MAX_MSG {
        return Err(NetworkError::Fatal(ErrorType::FrameTooLarge));
    }

    stream.write_u32::<LittleEndian>(body_len as u32)?;
    stream.write_u32::<LittleEndian>(args.len() as u32)?;

    for arg in args {
        stream.write_u32::<LittleEndian>(arg.len() as u32)?;
        stream.write_all(arg)?;
    }

    Ok(())
}

/// Split one response body (the bytes after the total-length field) into the
/// rescode and payload.
pub fn parse_response(body: &[u8]) -> NetworkResult<(ResCode, &[u8])> {
    if body.len() < 4 {
        return Err(NetworkError::Fatal(ErrorType::Malformed));
    }

    let code = ResCode::from_wire(LittleEndian::read_u32(&body[..4]))?;

    Ok((code, &body[4..]))
}
