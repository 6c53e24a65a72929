use std::fmt::{self, Debug, Formatter};
use std::net::Shutdown;

use crate::error::Error;
use crate::filetransfer::{FileTransferChannel, FileTransferHandler};
use crate::options::MonetConnectOptions;
use crate::protocol::handshake::HandshakeOption;
use crate::protocol::{ServerEndian, MAX_BLOCK, MSG_FILETRANS, MSG_MORE, MSG_OK, MSG_QUPDATE};

mod establish;
mod stream;

pub(crate) use stream::MonetStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Ready,
}

/// A low-level MAPI connection to a MonetDB server.
///
/// The connection owns its socket exclusively. Commands and their responses
/// are strictly serialized; a connection is not meant to be shared between
/// threads without external synchronization.
pub struct MonetConnection {
    options: MonetConnectOptions,
    stream: Option<MonetStream>,
    state: State,
    is_raw_control: bool,
    server_endian: ServerEndian,
    binexport_level: u32,
    remaining_handshake_options: Vec<HandshakeOption>,
    file_handler: Option<Box<dyn FileTransferHandler>>,
}

impl Debug for MonetConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonetConnection").finish()
    }
}

impl MonetConnection {
    /// Put a MAPI command on the line and return the textual response.
    ///
    /// Update responses are scanned for in-band errors; error responses are
    /// classified by SQLSTATE and raised; informational responses are logged
    /// and swallowed. File transfer requests arriving inside the response
    /// are dispatched transparently.
    pub fn cmd(&mut self, operation: &str) -> Result<String, Error> {
        log::debug!("executing command {:?}", operation);

        if self.state != State::Ready {
            return Err(not_connected());
        }

        self.put_block(operation.as_bytes())?;
        let response = self.read_response()?;

        if response.is_empty() {
            return Ok(String::new());
        }
        if let Some(rest) = response.strip_prefix(MSG_OK) {
            return Ok(rest.trim().to_owned());
        }
        if response == MSG_MORE {
            // tell the server it is not going to get more
            return self.cmd("");
        }

        // An update response can record a failure, e.g. a failed
        // transaction, on any of its lines.
        if response.starts_with(MSG_QUPDATE) {
            if let Some(line) = response.split('\n').find(|line| line.starts_with('!')) {
                return Err(Error::from_server(&line[1..]));
            }
        }

        match response.as_bytes()[0] {
            b'&' | b'%' | b'[' => Ok(response),
            b'!' => Err(Error::from_server(&response[1..])),
            b'#' => {
                log::info!("{}", &response[1..]);
                Ok(String::new())
            }
            _ if self.is_raw_control => match response.strip_prefix("OK") {
                Some(rest) => Ok(rest.trim().to_owned()),
                None => Ok(response),
            },
            _ => Err(Error::Programming(format!("unknown state: {response}"))),
        }
    }

    /// Put a MAPI command on the line and return the raw response bytes.
    ///
    /// The returned view is only valid until the next operation on this
    /// connection.
    pub fn binary_cmd(&mut self, operation: &str) -> Result<&[u8], Error> {
        log::debug!("executing binary command {:?}", operation);

        if self.state != State::Ready {
            return Err(not_connected());
        }

        self.put_block(operation.as_bytes())?;

        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        let mut buffer = stream.take_buffer();
        let end = match stream.read_block(&mut buffer, 0) {
            Ok(end) => end,
            Err(e) => {
                stream.stash_buffer(buffer);
                return Err(e);
            }
        };

        // Errors come back as a textual `!` message even here.
        if buffer[..end].starts_with(b"!") {
            let message = &buffer[1..end];
            let message = match memchr::memchr(b'\n', message) {
                Some(nl) => &message[..nl],
                None => message,
            };
            let err = match std::str::from_utf8(message) {
                Ok(message) => Error::from_server(message),
                Err(_) => Error::Data("server response is not valid UTF-8".into()),
            };
            stream.stash_buffer(buffer);
            return Err(err);
        }

        Ok(stream.stash_buffer_view(buffer, end))
    }

    /// Set the number of rows the server returns ahead of fetches.
    pub fn set_reply_size(&mut self, size: i64) -> Result<(), Error> {
        self.cmd(&format!("Xreply_size {size}"))?;
        Ok(())
    }

    /// Enable or disable auto-commit on the live session.
    pub fn set_autocommit(&mut self, autocommit: bool) -> Result<(), Error> {
        self.cmd(&format!("Xauto_commit {}", i32::from(autocommit)))?;
        Ok(())
    }

    /// Register the collaborator that fulfills server-initiated file
    /// transfer requests.
    pub fn set_file_transfer_handler(&mut self, handler: impl FileTransferHandler + 'static) {
        self.file_handler = Some(Box::new(handler));
    }

    /// Deregister the file transfer collaborator.
    pub fn clear_file_transfer_handler(&mut self) {
        self.file_handler = None;
    }

    /// Byte order the server reported in the login challenge.
    pub fn server_endian(&self) -> ServerEndian {
        self.server_endian
    }

    /// Highest binary result-set level the server offers, `0` when binary
    /// result sets are unavailable.
    pub fn binexport_level(&self) -> u32 {
        self.binexport_level
    }

    /// The connection's private copy of the target options, as mutated by
    /// any redirects followed during login.
    pub fn options(&self) -> &MonetConnectOptions {
        &self.options
    }

    /// Whether the connection is logged in and ready for commands.
    pub fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    /// Whether this is a raw control-channel connection, which uses neither
    /// framing nor file transfers.
    pub fn is_raw_control(&self) -> bool {
        self.is_raw_control
    }

    /// Kill the connection in a way the server is certain to register as an
    /// error: a block header far over the legal size followed by a body
    /// that is not valid UTF-8, then a hangup. Aborts server-side work that
    /// a plain close could leave running. I/O failures are ignored.
    pub fn sabotage(&mut self) {
        let stream = self.stream.take();
        self.state = State::Init;

        if let Some(mut stream) = stream {
            let mut garbage = Vec::with_capacity(13);
            garbage.extend_from_slice(&((((MAX_BLOCK + 3) as u16) << 1).to_le_bytes()));
            garbage.extend_from_slice(b"ERROR\x80ERROR");

            use std::io::Write;
            let _ = stream.socket_mut().write_all(&garbage);
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Disconnect from the server and drop the socket.
    pub fn disconnect(&mut self) {
        log::info!("disconnecting from server");
        self.state = State::Init;
        self.stream = None;
    }

    fn put_block(&mut self, data: &[u8]) -> Result<(), Error> {
        let raw = self.is_raw_control;
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        if raw {
            // control does not use the blocking protocol
            stream.send_all_and_shutdown(data)
        } else {
            stream.write_block(data, true)
        }
    }

    /// Read one message as text, without watching for file transfers. Login
    /// traffic never carries them.
    fn read_block_string(&mut self) -> Result<String, Error> {
        let raw = self.is_raw_control;
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        if raw {
            return stream.recv_to_end();
        }

        let mut buffer = stream.take_buffer();
        let text = match stream.read_block(&mut buffer, 0) {
            Ok(end) => text_from(&buffer[..end]),
            Err(e) => Err(e),
        };
        stream.stash_buffer(buffer);

        text
    }

    /// Read one message as text, dispatching any file transfer requests the
    /// server interleaves with it.
    fn read_response(&mut self) -> Result<String, Error> {
        if self.is_raw_control {
            let stream = self.stream.as_mut().ok_or_else(not_connected)?;
            return stream.recv_to_end();
        }

        // The stream leaves `self` for the duration so the transfer handler
        // can borrow both it and the connection state.
        let mut stream = self.stream.take().ok_or_else(not_connected)?;
        let result = self.read_response_framed(&mut stream);
        self.stream = Some(stream);

        result
    }

    fn read_response_framed(&mut self, stream: &mut MonetStream) -> Result<String, Error> {
        let mut buffer = stream.take_buffer();
        let mut offset = 0;

        let result = loop {
            let old = offset;
            offset = match stream.read_block(&mut buffer, old) {
                Ok(end) => end,
                Err(e) => break Err(e),
            };

            // A transfer request ends the block with the sentinel and a
            // single command line: ...\x01\x03\nr 0 data.csv\n
            let window = if offset > old { &buffer[old..offset - 1] } else { &[][..] };
            let request = match memchr::memrchr(b'\n', window) {
                Some(found) => {
                    let nl = old + found;
                    if nl >= old + 2 && &buffer[nl - 2..=nl] == MSG_FILETRANS {
                        Some(nl)
                    } else {
                        None
                    }
                }
                None => None,
            };

            match request {
                Some(nl) => {
                    let command = match text_from(&buffer[nl + 1..offset - 1]) {
                        Ok(command) => command,
                        Err(e) => break Err(e),
                    };

                    // Chop the request off the response.
                    offset = nl - 2;

                    if let Err(e) = self.dispatch_file_transfer(stream, &command) {
                        break Err(e);
                    }
                }
                None => break Ok(offset),
            }
        };

        let text = match result {
            Ok(end) => text_from(&buffer[..end]),
            Err(e) => Err(e),
        };
        stream.stash_buffer(buffer);

        text
    }

    fn dispatch_file_transfer(
        &mut self,
        stream: &mut MonetStream,
        command: &str,
    ) -> Result<(), Error> {
        log::debug!("server requested file transfer: {:?}", command);

        match self.file_handler.as_deref_mut() {
            Some(handler) => {
                let mut channel = FileTransferChannel::new(stream);
                handler.handle(command, &mut channel)
            }

            // The request must still be answered or the protocol derails.
            None => stream.write_block(
                b"!HY000!cannot transfer files: no file transfer handler has been registered\n",
                true,
            ),
        }
    }
}

fn not_connected() -> Error {
    Error::Programming("Not connected".into())
}

fn text_from(bytes: &[u8]) -> Result<String, Error> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| Error::Data("server response is not valid UTF-8".into()))
}
