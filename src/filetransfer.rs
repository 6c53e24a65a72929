use crate::connection::MonetStream;
use crate::error::Error;

/// Collaborator that fulfills server-initiated file transfer requests.
///
/// While a response is being read, the server may interject a single-line
/// request such as `r 0 data.csv` (read a file from the client) or
/// `w data.csv` (write a file to the client). The handler talks back over
/// the same connection through the framed [`FileTransferChannel`]; when it
/// returns, the connection resumes reading the command's final response.
///
/// The application logic of uploads and downloads lives outside this crate;
/// register a handler with
/// [`MonetConnection::set_file_transfer_handler`][set].
///
/// [set]: crate::MonetConnection::set_file_transfer_handler
pub trait FileTransferHandler {
    fn handle(
        &mut self,
        command: &str,
        channel: &mut FileTransferChannel<'_>,
    ) -> Result<(), Error>;
}

/// Block-level access to the connection, scoped to one transfer.
pub struct FileTransferChannel<'a> {
    stream: &'a mut MonetStream,
}

impl<'a> FileTransferChannel<'a> {
    pub(crate) fn new(stream: &'a mut MonetStream) -> FileTransferChannel<'a> {
        FileTransferChannel { stream }
    }

    /// Read one whole message into the start of `buffer`, growing it as
    /// needed, and return the payload length.
    pub fn read_block(&mut self, buffer: &mut Vec<u8>) -> Result<usize, Error> {
        self.stream.read_block(buffer, 0)
    }

    /// Write one message. `finish` raises the last flag on the final chunk,
    /// ending the transfer body.
    pub fn write_block(&mut self, data: &[u8], finish: bool) -> Result<(), Error> {
        self.stream.write_block(data, finish)
    }
}
