use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;

use rustls::{ClientConnection, StreamOwned};

use crate::error::Error;
use crate::options::MonetConnectOptions;

/// A connected stream socket, possibly wrapped in TLS.
///
/// All I/O is synchronous and blocking; the connect timeout applies to the
/// connect call only.
pub(crate) enum NetSocket {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl NetSocket {
    pub(crate) fn is_tcp(&self) -> bool {
        match self {
            NetSocket::Tcp(_) | NetSocket::Tls(_) => true,
            #[cfg(unix)]
            NetSocket::Unix(_) => false,
        }
    }

    pub(crate) fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            NetSocket::Tcp(s) => s.shutdown(how),
            #[cfg(unix)]
            NetSocket::Unix(s) => s.shutdown(how),
            NetSocket::Tls(s) => s.get_ref().shutdown(how),
        }
    }
}

impl Read for NetSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            NetSocket::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            NetSocket::Unix(s) => s.read(buf),
            NetSocket::Tls(s) => s.read(buf),
        }
    }
}

impl Write for NetSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            NetSocket::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            NetSocket::Unix(s) => s.write(buf),
            NetSocket::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            NetSocket::Tcp(s) => s.flush(),
            #[cfg(unix)]
            NetSocket::Unix(s) => s.flush(),
            NetSocket::Tls(s) => s.flush(),
        }
    }
}

/// Produce a connected socket for the target.
///
/// The Unix domain socket is attempted first when configured; on failure the
/// TCP host is resolved and each address is tried in order. The last
/// OS-level error propagates if nothing connects.
pub(crate) fn connect(options: &MonetConnectOptions) -> Result<NetSocket, Error> {
    if options.tls && options.sock.is_some() {
        return Err(Error::config(
            "TLS is not possible over Unix domain sockets",
        ));
    }

    let mut last_err: Option<io::Error> = None;

    #[cfg(unix)]
    if let Some(path) = &options.sock {
        match connect_uds(path, options.connect_timeout) {
            Ok(stream) => return Ok(NetSocket::Unix(stream)),
            Err(e) => last_err = Some(e),
        }
    }

    if let Some(host) = &options.host {
        // IPv6 addresses in URLs may be wrapped in brackets and the `url`
        // crate doesn't trim those.
        let host = host.trim_matches(&['[', ']'][..]);

        for addr in (host, options.port).to_socket_addrs()? {
            match connect_tcp(addr, options.connect_timeout) {
                Ok(stream) => return Ok(NetSocket::Tcp(stream)),
                Err(e) => last_err = Some(e),
            }
        }
    }

    match last_err {
        Some(err) => Err(err.into()),
        None => Err(Error::Internal(
            "neither a unix socket nor a tcp host to connect to".into(),
        )),
    }
}

fn connect_tcp(addr: SocketAddr, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let stream = match timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };

    stream.set_nodelay(true)?;
    socket2::SockRef::from(&stream).set_keepalive(true)?;

    Ok(stream)
}

#[cfg(unix)]
fn connect_uds(path: &Path, timeout: Option<Duration>) -> io::Result<UnixStream> {
    use socket2::{Domain, SockAddr, Socket, Type};

    let addr = SockAddr::unix(path)?;
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;

    match timeout {
        Some(timeout) => socket.connect_timeout(&addr, timeout)?,
        None => socket.connect(&addr)?,
    }

    Ok(UnixStream::from(std::os::fd::OwnedFd::from(socket)))
}
