use std::cmp;
use std::io::{Read, Write};
use std::net::Shutdown;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;
use crate::net::NetSocket;
use crate::protocol::{BUFFER_INCREMENT, MAX_BLOCK};

/// The framed byte stream under a connection.
///
/// A logical message is a sequence of minor blocks, each prefixed by a
/// 16-bit little-endian header carrying the payload length in the upper 15
/// bits and the last-block flag in bit 0. The stream also keeps one spare
/// read buffer so that back-to-back commands reuse the same allocation.
pub(crate) struct MonetStream {
    socket: NetSocket,
    stashed_buffer: Option<Vec<u8>>,
}

impl MonetStream {
    pub(crate) fn new(socket: NetSocket) -> Self {
        Self {
            socket,
            stashed_buffer: None,
        }
    }

    pub(crate) fn socket_mut(&mut self) -> &mut NetSocket {
        &mut self.socket
    }

    /// Frame `payload` into minor blocks and write them out.
    ///
    /// The last flag is only raised when `finish` is set; a payload that is
    /// an exact multiple of the block size gets a trailing empty block to
    /// carry it.
    pub(crate) fn write_block(&mut self, payload: &[u8], finish: bool) -> Result<(), Error> {
        let mut pos = 0;

        loop {
            let chunk = &payload[pos..cmp::min(pos + MAX_BLOCK, payload.len())];
            let last = chunk.len() < MAX_BLOCK;

            let mut header = [0u8; 2];
            LittleEndian::write_u16(
                &mut header,
                ((chunk.len() as u16) << 1) | u16::from(last && finish),
            );

            self.socket.write_all(&header)?;
            self.socket.write_all(chunk)?;

            pos += chunk.len();
            if last {
                break;
            }
        }

        self.socket.flush()?;

        Ok(())
    }

    /// Read one whole message into `buffer` starting at `offset`, enlarging
    /// the buffer as necessary, and return the end offset of the payload.
    pub(crate) fn read_block(&mut self, buffer: &mut Vec<u8>, offset: usize) -> Result<usize, Error> {
        let mut offset = offset;

        loop {
            let (end, last) = self.read_minor_block(buffer, offset)?;
            offset = end;
            if last {
                return Ok(offset);
            }
        }
    }

    // The two header bytes land in the buffer first and are then overwritten
    // by the payload, so they never show up in the message.
    fn read_minor_block(
        &mut self,
        buffer: &mut Vec<u8>,
        offset: usize,
    ) -> Result<(usize, bool), Error> {
        self.read_exact_at(buffer, offset, 2)?;

        let header = LittleEndian::read_u16(&buffer[offset..offset + 2]);
        let length = (header >> 1) as usize;
        let last = header & 1 == 1;

        let offset = if length > 0 {
            self.read_exact_at(buffer, offset, length)?
        } else {
            offset
        };

        Ok((offset, last))
    }

    /// Read exactly `count` bytes into `buffer` starting at `offset`.
    fn read_exact_at(
        &mut self,
        buffer: &mut Vec<u8>,
        offset: usize,
        count: usize,
    ) -> Result<usize, Error> {
        let end = offset + count;
        if buffer.len() < end {
            let nblocks = 1 + (end - buffer.len()) / BUFFER_INCREMENT;
            buffer.resize(buffer.len() + nblocks * BUFFER_INCREMENT, 0);
        }

        let mut pos = offset;
        while pos < end {
            match self.socket.read(&mut buffer[pos..end]) {
                Ok(0) => {
                    return Err(Error::Interface("server closed connection".into()));
                }
                Ok(n) => pos += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(end)
    }

    /// Drain the socket until the server closes it. Raw control connections
    /// do not frame their responses.
    pub(crate) fn recv_to_end(&mut self) -> Result<String, Error> {
        let mut data = Vec::new();
        self.socket.read_to_end(&mut data)?;

        let text = std::str::from_utf8(&data)
            .map_err(|_| Error::Data("server response is not valid UTF-8".into()))?;

        Ok(text.trim().to_owned())
    }

    /// Write everything and shut down the write half; the raw control
    /// protocol marks end-of-message with the shutdown.
    pub(crate) fn send_all_and_shutdown(&mut self, data: &[u8]) -> Result<(), Error> {
        self.socket.write_all(data)?;
        self.socket.flush()?;

        // The peer may already be gone.
        let _ = self.socket.shutdown(Shutdown::Write);

        Ok(())
    }

    /// Retrieve the stashed read buffer, or allocate a fresh one.
    pub(crate) fn take_buffer(&mut self) -> Vec<u8> {
        self.stashed_buffer
            .take()
            .unwrap_or_else(|| vec![0u8; BUFFER_INCREMENT])
    }

    /// Stash a buffer and hand back a view of its first `len` bytes. The
    /// view stays valid until the buffer is taken again.
    pub(crate) fn stash_buffer_view(&mut self, buffer: Vec<u8>, len: usize) -> &[u8] {
        let stashed = self.stashed_buffer.insert(buffer);
        &stashed[..len]
    }

    /// Keep a used buffer for reuse; the larger of the stashed and the
    /// returned buffer survives.
    pub(crate) fn stash_buffer(&mut self, buffer: Vec<u8>) {
        if self
            .stashed_buffer
            .as_ref()
            .map_or(true, |stashed| stashed.len() < buffer.len())
        {
            self.stashed_buffer = Some(buffer);
        }
    }

    pub(crate) fn shutdown(&self, how: Shutdown) -> std::io::Result<()> {
        self.socket.shutdown(how)
    }
}
