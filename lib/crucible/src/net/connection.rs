use crate::command;
use crate::net::buffer::Buffer;
use crate::net::frame;
use crate::table::Table;
use byteorder::{ByteOrder, LittleEndian};
use flint::logging;
use mio;
use mio::net::TcpStream;
use std::io;
use std::io::{Read, Write};

/// Per-connection buffer capacity: one maximal frame plus its length prefix.
const BUF_SIZE: usize = frame::HEADER_SIZE + frame::MAX_MSG;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    /// Accumulating request bytes.
    Reading,
    /// Draining a queued reply.
    Writing,
    /// Marked for teardown; the endpoint reaps it on the way out.
    Closing,
}

/// A single client connection: the stream, the framing buffers and the state
/// machine that turns readiness into request/reply traffic.
///
/// The stream is generic over `Read + Write` so the state machine can be
/// driven without a socket; the endpoint instantiates it with a non-blocking
/// `TcpStream`.
pub struct Connection<S> {
    id: usize,
    stream: S,
    state: ConnectionState,
    read_buffer: Buffer,
    write_buffer: Buffer,
    log: logging::Logger,
}

impl<S: Read + Write> Connection<S> {
    /// Wraps a freshly accepted stream. The connection starts out Reading.
    #[inline]
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(stream: S, id: usize, log: L) -> Connection<S> {
        let log = match log.into() {
            Some(log) => log.new(logging::o!("connection_id" => id)),
            None => logging::Logger::root(logging::Discard, logging::o!()),
        };

        Connection {
            id,
            stream,
            state: ConnectionState::Reading,
            read_buffer: Buffer::new(BUF_SIZE),
            write_buffer: Buffer::new(BUF_SIZE),
            log,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Dispatch on the connection state. The endpoint reaps Closing
    /// connections before handing out further readiness events.
    #[inline]
    pub fn drive(&mut self, table: &mut Table) {
        match self.state {
            ConnectionState::Reading => self.drive_read(table),
            ConnectionState::Writing => self.drive_write(),
            ConnectionState::Closing => unreachable!("Drove a closing connection"),
        }
    }

    /// Fill the read buffer from the stream and extract whole requests until
    /// the stream would block or the state leaves Reading.
    fn drive_read(&mut self, table: &mut Table) {
        loop {
            debug_assert!(self.read_buffer.free_capacity() > 0);

            match self.read_buffer.ingress(&mut self.stream) {
                Ok(0) => {
                    // A zero-byte read is the peer closing. Mid-frame it is
                    // worth flagging; otherwise it is an orderly goodbye.
                    if self.read_buffer.is_empty() {
                        logging::debug!(self.log, "peer closed");
                    } else {
                        logging::warn!(self.log, "peer closed mid-frame";
                                       "buffered" => self.read_buffer.len());
                    }
                    self.state = ConnectionState::Closing;
                    return;
                }
                Ok(received) => {
                    logging::trace!(self.log, "received data"; "count" => received);

                    while self.extract_one(table) {}

                    if self.state != ConnectionState::Reading {
                        return;
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    logging::warn!(self.log, "read failed"; "error" => %err);
                    self.state = ConnectionState::Closing;
                    return;
                }
            }
        }
    }

    /// Try to consume one complete request frame off the read buffer.
    ///
    /// Returns true when a frame was consumed and its reply departed
    /// synchronously, meaning the caller should immediately try for the next
    /// pipelined frame.
    fn extract_one(&mut self, table: &mut Table) -> bool {
        let buffered = self.read_buffer.read_slice();

        if buffered.len() < frame::HEADER_SIZE {
            return false;
        }

        let body_len = LittleEndian::read_u32(&buffered[..frame::HEADER_SIZE]) as usize;

        if body_len > frame::MAX_MSG {
            logging::warn!(self.log, "oversized frame"; "body_len" => body_len);
            self.state = ConnectionState::Closing;
            return false;
        }

        if buffered.len() < frame::HEADER_SIZE + body_len {
            return false;
        }

        let body = &buffered[frame::HEADER_SIZE..frame::HEADER_SIZE + body_len];

        let args = match frame::parse_request(body) {
            Ok(args) => args,
            Err(err) => {
                // No resynchronisation point exists mid-stream, so a bad
                // frame takes the connection down with it.
                logging::warn!(self.log, "malformed request"; "error" => ?err);
                self.state = ConnectionState::Closing;
                return false;
            }
        };

        let reply = command::execute(table, &args);
        frame::write_response(&mut self.write_buffer, reply.code, reply.payload);

        self.read_buffer.consume(frame::HEADER_SIZE + body_len);
        self.state = ConnectionState::Writing;
        self.drive_write();

        self.state == ConnectionState::Reading
    }

    /// Drain the queued reply. On completion the connection returns to
    /// Reading; a would-block leaves it Writing until the next readiness
    /// event.
    fn drive_write(&mut self) {
        match self.write_buffer.egress(&mut self.stream) {
            Ok(sent) => {
                logging::trace!(self.log, "reply drained"; "count" => sent);
                self.state = ConnectionState::Reading;
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => (),
            Err(err) => {
                logging::warn!(self.log, "write failed"; "error" => %err);
                self.state = ConnectionState::Closing;
            }
        }
    }

    /// Poll interest matching the current state.
    #[inline]
    pub fn interest(&self) -> mio::Ready {
        match self.state {
            ConnectionState::Reading => mio::Ready::readable(),
            ConnectionState::Writing => mio::Ready::writable(),
            ConnectionState::Closing => mio::Ready::empty(),
        }
    }
}

impl Connection<TcpStream> {
    /// Registers the stream on the supplied poll with level triggering.
    #[inline]
    pub fn register(&self, token: mio::Token, poll: &mio::Poll) -> io::Result<()> {
        poll.register(&self.stream, token, self.interest(), mio::PollOpt::level())
    }

    /// Re-registers the stream after a state transition changed the interest.
    #[inline]
    pub fn reregister(&self, token: mio::Token, poll: &mio::Poll) -> io::Result<()> {
        poll.reregister(&self.stream, token, self.interest(), mio::PollOpt::level())
    }

    /// Deregisters the stream from the supplied poll.
    #[inline]
    pub fn deregister(&self, poll: &mio::Poll) -> io::Result<()> {
        poll.deregister(&self.stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::frame::ResCode;
    use std::cmp::min;

    /// Scripted byte stream: reads dribble out of `input` in `read_chunk`
    /// sized pieces up to `read_limit`, writes land in `output` until
    /// `write_limit` is reached, and `closed` turns exhaustion into EOF
    /// instead of would-block.
    struct MockStream {
        input: Vec<u8>,
        read_pos: usize,
        read_chunk: usize,
        read_limit: usize,
        closed: bool,
        output: Vec<u8>,
        write_limit: usize,
    }

    impl MockStream {
        fn new(input: Vec<u8>) -> MockStream {
            let read_limit = input.len();

            MockStream {
                input,
                read_pos: 0,
                read_chunk: usize::max_value(),
                read_limit,
                closed: false,
                output: Vec::new(),
                write_limit: usize::max_value(),
            }
        }

        fn closed(input: Vec<u8>) -> MockStream {
            let mut stream = MockStream::new(input);
            stream.closed = true;
            stream
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let readable = min(self.read_limit, self.input.len());

            if self.read_pos == readable {
                if self.closed {
                    return Ok(0);
                }
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let count = min(min(self.read_chunk, buf.len()), readable - self.read_pos);
            buf[..count].copy_from_slice(&self.input[self.read_pos..self.read_pos + count]);
            self.read_pos += count;

            Ok(count)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.output.len() >= self.write_limit {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let count = min(buf.len(), self.write_limit - self.output.len());
            self.output.extend(&buf[..count]);

            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn request(args: &[&[u8]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        frame::write_request(&mut bytes, args).unwrap();
        bytes
    }

    fn reply(code: ResCode, payload: &[u8]) -> Vec<u8> {
        let mut buffer = Buffer::new(BUF_SIZE);
        frame::write_response(&mut buffer, code, payload);
        buffer.read_slice().to_vec()
    }

    fn connection(stream: MockStream) -> Connection<MockStream> {
        Connection::new(stream, 0, None)
    }

    #[test]
    fn test_set_then_get() {
        let mut input = request(&[b"set", b"k", b"v"]);
        input.extend(request(&[b"get", b"k"]));

        let mut table = Table::new();
        let mut conn = connection(MockStream::new(input));

        conn.drive(&mut table);

        let mut expected = reply(ResCode::Ok, b"");
        expected.extend(reply(ResCode::Ok, b"v"));

        assert_eq!(conn.stream.output, expected);
        assert_eq!(conn.state(), ConnectionState::Reading);
        assert_eq!(table.get(b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn test_get_missing_replies_nx() {
        let input = request(&[b"get", b"missing"]);

        let mut table = Table::new();
        let mut conn = connection(MockStream::new(input));

        conn.drive(&mut table);

        // len=4, rescode=2, empty payload
        assert_eq!(conn.stream.output, vec![4, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_del_then_get() {
        let mut input = request(&[b"del", b"k"]);
        input.extend(request(&[b"get", b"k"]));

        let mut table = Table::new();
        table.set(b"k", b"v");

        let mut conn = connection(MockStream::new(input));
        conn.drive(&mut table);

        let mut expected = reply(ResCode::Ok, b"");
        expected.extend(reply(ResCode::Nx, b""));

        assert_eq!(conn.stream.output, expected);
        assert_eq!(table.get(b"k"), None);
    }

    #[test]
    fn test_unknown_command_keeps_connection() {
        let input = request(&[b"incr", b"k"]);

        let mut table = Table::new();
        let mut conn = connection(MockStream::new(input));

        conn.drive(&mut table);

        assert_eq!(conn.stream.output, reply(ResCode::Err, b"Unknown cmd"));
        assert_eq!(conn.state(), ConnectionState::Reading);
    }

    #[test]
    fn test_pipelined_requests_reply_in_order() {
        let mut input = request(&[b"set", b"a", b"1"]);
        input.extend(request(&[b"set", b"b", b"2"]));
        input.extend(request(&[b"get", b"a"]));
        input.extend(request(&[b"get", b"b"]));

        let mut table = Table::new();
        let mut conn = connection(MockStream::new(input));

        conn.drive(&mut table);

        let mut expected = reply(ResCode::Ok, b"");
        expected.extend(reply(ResCode::Ok, b""));
        expected.extend(reply(ResCode::Ok, b"1"));
        expected.extend(reply(ResCode::Ok, b"2"));

        assert_eq!(conn.stream.output, expected);
        assert_eq!(conn.state(), ConnectionState::Reading);
    }

    #[test]
    fn test_request_split_across_reads() {
        let input = request(&[b"set", b"k", b"v"]);
        let split = input.len() - 3;

        let mut stream = MockStream::new(input);
        stream.read_limit = split;

        let mut table = Table::new();
        let mut conn = connection(stream);

        // First readiness: only a partial frame arrives, nothing departs.
        conn.drive(&mut table);
        assert!(conn.stream.output.is_empty());
        assert_eq!(conn.state(), ConnectionState::Reading);

        // The tail arrives with the next readiness event.
        conn.stream.read_limit = usize::max_value();
        conn.drive(&mut table);

        assert_eq!(conn.stream.output, reply(ResCode::Ok, b""));
        assert_eq!(table.get(b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn test_backpressure_resumes_write() {
        let input = request(&[b"get", b"k"]);

        let mut table = Table::new();
        table.set(b"k", b"a longer stored value");

        let mut stream = MockStream::new(input);
        stream.write_limit = 5;

        let mut conn = connection(stream);
        conn.drive(&mut table);

        // Only part of the reply fit; the connection parks in Writing.
        assert_eq!(conn.state(), ConnectionState::Writing);
        assert_eq!(conn.stream.output.len(), 5);

        conn.stream.write_limit = usize::max_value();
        conn.drive(&mut table);

        assert_eq!(conn.state(), ConnectionState::Reading);
        assert_eq!(conn.stream.output, reply(ResCode::Ok, b"a longer stored value"));
    }

    #[test]
    fn test_oversized_frame_closes_without_reply() {
        // total_len = 0x1001 exceeds the frame limit by one.
        let input = vec![0x01, 0x10, 0x00, 0x00];

        let mut table = Table::new();
        let mut conn = connection(MockStream::closed(input));

        conn.drive(&mut table);

        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.stream.output.is_empty());
    }

    #[test]
    fn test_malformed_request_closes_without_reply() {
        // argc claims two arguments but the body ends after the first.
        let mut input = Vec::new();
        input.extend(&[13u8, 0, 0, 0]);
        input.extend(&[2u8, 0, 0, 0]);
        input.extend(&[3u8, 0, 0, 0]);
        input.extend(b"get");
        input.extend(&[9u8, 0]);

        let mut table = Table::new();
        let mut conn = connection(MockStream::new(input));

        conn.drive(&mut table);

        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.stream.output.is_empty());
    }

    #[test]
    fn test_orderly_eof() {
        let mut table = Table::new();
        let mut conn = connection(MockStream::closed(Vec::new()));

        conn.drive(&mut table);

        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_premature_eof() {
        // Half a frame, then the peer goes away.
        let input = request(&[b"get", b"k"])[..6].to_vec();

        let mut table = Table::new();
        let mut conn = connection(MockStream::closed(input));

        conn.drive(&mut table);

        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.stream.output.is_empty());
    }

    #[test]
    fn test_connections_are_isolated() {
        let mut table = Table::new();

        // A malformed frame takes down the first connection...
        let mut bad = connection(MockStream::new(vec![2, 0, 0, 0, 0xff, 0xff]));
        bad.drive(&mut table);
        assert_eq!(bad.state(), ConnectionState::Closing);

        // ...while the second keeps serving off the same table.
        let mut input = request(&[b"set", b"k", b"v"]);
        input.extend(request(&[b"get", b"k"]));

        let mut good = connection(MockStream::new(input));
        good.drive(&mut table);

        let mut expected = reply(ResCode::Ok, b"");
        expected.extend(reply(ResCode::Ok, b"v"));

        assert_eq!(good.state(), ConnectionState::Reading);
        assert_eq!(good.stream.output, expected);
    }

    #[test]
    fn test_exact_wire_bytes() {
        // set k v, byte for byte off the wire.
        let input = vec![
            0x15, 0x00, 0x00, 0x00, // total_len = 21
            0x03, 0x00, 0x00, 0x00, // argc = 3
            0x03, 0x00, 0x00, 0x00, b's', b'e', b't', // "set"
            0x01, 0x00, 0x00, 0x00, b'k', // "k"
            0x01, 0x00, 0x00, 0x00, b'v', // "v"
        ];

        let mut table = Table::new();
        let mut conn = connection(MockStream::new(input));

        conn.drive(&mut table);

        assert_eq!(conn.stream.output, vec![4, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(table.get(b"k"), Some(&b"v"[..]));
    }
}
