use std::io;

/// A fixed-capacity FIFO byte buffer. Data is appended at the tail and
/// consumed from the front; consuming shifts the residue to the front so the
/// free region is always one contiguous slice.
pub struct Buffer {
    data: Box<[u8]>,
    len: usize,
}

impl Buffer {
    #[inline]
    pub fn new(capacity: usize) -> Buffer {
        Buffer {
            data: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// The number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true in case the buffer is empty, false otherwise.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remaining free capacity in the buffer.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.data.len() - self.len
    }

    /// Slice containing data.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Slice containing free capacity to be written.
    #[inline]
    pub fn write_slice(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.data[len..]
    }

    /// Marks `count` bytes of the free region as written.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        debug_assert!(count <= self.free_capacity());
        self.len += count;
    }

    /// Drops `count` bytes from the front, shifting the residue down.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        assert!(count <= self.len, "consumed past the end of buffered data");
        self.data.copy_within(count..self.len, 0);
        self.len -= count;
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// One read attempt from the supplied reader into the free region.
    /// Interrupted reads retry in place. Returns `Ok(0)` on end of stream.
    #[inline]
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        loop {
            let len = self.len;
            match reader.read(&mut self.data[len..]) {
                Ok(count) => {
                    self.len += count;
                    return Ok(count);
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Write the contents of the buffer to the supplied writer until it is
    /// drained, advancing the read offset. Interrupted writes retry in place.
    #[inline]
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.len;

        while self.len > 0 {
            match writer.write(&self.data[..self.len]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => self.consume(count),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(orig_len)
    }
}
