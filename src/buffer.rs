//! Fixed-size per-side buffer: cursors, framing flags, and the two
//! buffer-local operations (`pull`, `find_last_chunk`) that do not need a
//! socket to run.
//!
//! An [`Endpoint`] owns only bytes and cursors, not the socket that fills
//! it — [`crate::connection::Connection`] pairs one `Endpoint` with one
//! `TcpStream` per side. Keeping the two separate avoids a self-referential
//! struct across the `.await` points in the read/write handlers.

use crate::limits::BUFFER_SIZE;

/// The literal terminator of a chunked-transfer body.
const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// One side's byte plumbing: buffer, cursors, and incremental framing state.
pub struct Endpoint {
    pub buffer: Box<[u8; BUFFER_SIZE]>,
    /// Offset one past the last byte received.
    pub read_index: usize,
    /// Offset of the next byte to write out from `buffer`.
    pub write_index: usize,
    /// Bytes still expected before the current message is complete.
    pub to_read: usize,
    /// Bytes still to emit from `buffer[write_index..]`.
    pub to_write: usize,
    /// Offset of a pipelined follow-up message already sitting in `buffer`;
    /// `0` means none.
    pub next_index: usize,
    /// Parsed `Content-Length`, if any.
    pub content_len: usize,
    /// `true` iff `Transfer-Encoding: chunked` was seen.
    pub chunked: bool,
    /// `true` once `CRLF CRLF` has been located and `headers` set.
    pub headers_found: bool,
    /// `(offset, len)` of the parsed header block within `buffer`.
    pub headers: (usize, usize),
    /// How many leading bytes of `LAST_CHUNK` are matched going into the
    /// next unscanned byte. Restartable across reads: `find_last_chunk`
    /// never rescans a byte it has already folded into this count.
    last_chunk_matched: u8,
    /// Absolute offset of the next byte `find_last_chunk` has not yet
    /// folded into `last_chunk_matched`.
    last_chunk_scan_pos: usize,
}

impl Endpoint {
    pub fn new() -> Self {
        Self {
            buffer: Box::new([0u8; BUFFER_SIZE]),
            read_index: 0,
            write_index: 0,
            to_read: 0,
            to_write: 0,
            next_index: 0,
            content_len: 0,
            chunked: false,
            headers_found: false,
            headers: (0, 0),
            last_chunk_matched: 0,
            last_chunk_scan_pos: 0,
        }
    }

    /// Clears all per-message state. Buffer contents are untouched; callers
    /// that need pipelined bytes preserved call [`Self::pull`] first.
    pub fn reset(&mut self) {
        self.read_index = 0;
        self.write_index = 0;
        self.to_read = 0;
        self.to_write = 0;
        self.next_index = 0;
        self.content_len = 0;
        self.chunked = false;
        self.headers_found = false;
        self.headers = (0, 0);
        self.last_chunk_matched = 0;
        self.last_chunk_scan_pos = 0;
    }

    /// The bytes received so far that have not yet been consumed by a
    /// parser: `buffer[..read_index]`.
    pub fn received(&self) -> &[u8] {
        &self.buffer[..self.read_index]
    }

    pub fn header_slice(&self) -> &[u8] {
        let (offset, len) = self.headers;
        &self.buffer[offset..offset + len]
    }

    pub fn is_full(&self) -> bool {
        self.read_index >= BUFFER_SIZE - 1
    }

    /// Compacts a pipelined follow-up message to the start of the buffer.
    ///
    /// Precondition: `read_index > next_index` (there is in fact a
    /// follow-up message buffered). A no-op if `next_index == 0`.
    pub fn pull(&mut self) {
        if self.next_index == 0 {
            return;
        }
        debug_assert!(
            self.read_index > self.next_index,
            "pull() called with next_index >= read_index"
        );

        let tail_len = self.read_index - self.next_index;
        self.buffer.copy_within(self.next_index..self.read_index, 0);
        self.read_index = tail_len;
        self.next_index = 0;
        self.to_read = BUFFER_SIZE - self.read_index - 1;
        self.headers_found = false;
    }

    /// Resets the buffer to receive the next slice of an in-progress
    /// response body, after the bytes accumulated so far have been flushed
    /// to the client. `content_len`/`chunked` (the framing already decided
    /// for this message) and `last_chunk_matched` (the partial match
    /// carried across the flush) are preserved; everything positional is
    /// not, since the next byte written lands at offset 0.
    pub fn rewind_body_buffer(&mut self) {
        self.read_index = 0;
        self.write_index = 0;
        self.next_index = 0;
        self.headers = (0, 0);
        self.last_chunk_scan_pos = 0;
    }

    /// Searches `buffer[headers.len()..read_index]` for the chunked
    /// terminator `"0\r\n\r\n"`, resuming from whatever prefix was matched
    /// on a previous call.
    ///
    /// Returns `true` once the full terminator has been seen, in which case
    /// `next_index` is set to one past the terminator if further buffered
    /// bytes follow (pipelined next response on this upstream connection).
    pub fn find_last_chunk(&mut self) -> bool {
        let (header_offset, header_len) = self.headers;
        let scan_start = header_offset + header_len;
        if self.last_chunk_scan_pos < scan_start {
            self.last_chunk_scan_pos = scan_start;
        }

        // `LAST_CHUNK` has no internal self-overlap (no proper prefix is
        // also a proper suffix), so on a mismatch the only possible resync
        // point is "does this byte restart the match at position 0".
        while self.last_chunk_scan_pos < self.read_index {
            let byte = self.buffer[self.last_chunk_scan_pos];
            self.last_chunk_scan_pos += 1;

            if byte == LAST_CHUNK[self.last_chunk_matched as usize] {
                self.last_chunk_matched += 1;
                if self.last_chunk_matched as usize == LAST_CHUNK.len() {
                    let terminator_end = self.last_chunk_scan_pos;
                    self.last_chunk_matched = 0;
                    self.next_index = if terminator_end < self.read_index {
                        terminator_end
                    } else {
                        0
                    };
                    return true;
                }
            } else if byte == LAST_CHUNK[0] {
                self.last_chunk_matched = 1;
            } else {
                self.last_chunk_matched = 0;
            }
        }
        false
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(ep: &mut Endpoint, data: &[u8]) {
        ep.buffer[ep.read_index..ep.read_index + data.len()].copy_from_slice(data);
        ep.read_index += data.len();
    }

    #[test]
    fn pull_compacts_pipelined_bytes_to_start() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"GET / HTTP/1.1\r\n\r\nGET /two HTTP/1.1\r\n\r\n");
        ep.next_index = 19;
        ep.pull();
        assert_eq!(ep.read_index, 21);
        assert_eq!(&ep.buffer[..21], b"GET /two HTTP/1.1\r\n\r\n");
        assert_eq!(ep.next_index, 0);
        assert!(!ep.headers_found);
    }

    #[test]
    fn pull_is_noop_without_pipelined_bytes() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"GET / HTTP/1.1\r\n\r\n");
        let before = ep.read_index;
        ep.pull();
        assert_eq!(ep.read_index, before);
    }

    #[test]
    fn find_last_chunk_whole_in_one_read() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"7\r\nMozilla\r\n0\r\n\r\n");
        ep.headers = (0, 0);
        assert!(ep.find_last_chunk());
        assert_eq!(ep.next_index, 0);
    }

    #[test]
    fn find_last_chunk_not_yet_present() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"7\r\nMozilla\r\n");
        ep.headers = (0, 0);
        assert!(!ep.find_last_chunk());
    }

    #[test]
    fn find_last_chunk_split_across_two_reads() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"0\r\n");
        ep.headers = (0, 0);
        assert!(!ep.find_last_chunk());
        assert_eq!(ep.last_chunk_matched, 3);

        fill(&mut ep, b"\r\n");
        assert!(ep.find_last_chunk());
        assert_eq!(ep.next_index, 0);
    }

    #[test]
    fn find_last_chunk_split_leaves_trailing_pipelined_bytes() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"0\r\n");
        ep.headers = (0, 0);
        assert!(!ep.find_last_chunk());

        fill(&mut ep, b"\r\nGET /two HTTP/1.1\r\n\r\n");
        assert!(ep.find_last_chunk());
        assert_eq!(ep.next_index, 5);
    }

    #[test]
    fn find_last_chunk_false_prefix_does_not_wedge_the_matcher() {
        let mut ep = Endpoint::new();
        fill(&mut ep, b"3\r\nabc\r\n0\r\nX");
        ep.headers = (0, 0);
        assert!(!ep.find_last_chunk());
        assert_eq!(ep.last_chunk_matched, 0);
    }
}
