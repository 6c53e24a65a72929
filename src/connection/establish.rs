use std::io::Write;
use std::mem;

use crate::connection::{MonetConnection, MonetStream, State};
use crate::error::Error;
use crate::net::{self, NetSocket};
use crate::options::MonetConnectOptions;
use crate::protocol::challenge::Challenge;
use crate::protocol::handshake::derive_options;
use crate::protocol::response::build_response;
use crate::protocol::{Prompt, ServerEndian};

// A login may bounce through several servers; the merovingian daemon keeps
// the socket open for another round, a full redirect reconnects. Either way
// the chain is cut off after this many attempts.
const MAX_REDIRECTS: usize = 10;

impl MonetConnection {
    /// Open a connection to the configured target and log in.
    ///
    /// The options are cloned; redirects received during login mutate the
    /// connection's private copy, never the caller's value.
    pub fn establish(options: &MonetConnectOptions) -> Result<MonetConnection, Error> {
        let mut conn = MonetConnection {
            options: options.clone(),
            stream: None,
            state: State::Init,
            is_raw_control: false,
            server_endian: ServerEndian::Little,
            binexport_level: 0,
            remaining_handshake_options: Vec::new(),
            file_handler: None,
        };

        conn.connect()?;

        Ok(conn)
    }

    fn connect(&mut self) -> Result<(), Error> {
        // Whatever socket is left over is unusable now.
        self.stream = None;

        let mut logged_in = false;
        for _ in 0..MAX_REDIRECTS {
            // Maybe the previous round left the socket open and only wants
            // another login attempt; otherwise dial the (updated) target.
            if self.stream.is_none() {
                let socket = net::connect(&self.options)?;
                self.is_raw_control = false;

                let socket = if socket.is_tcp() {
                    self.prime_or_wrap(socket)?
                } else if self.options.language == "control" {
                    self.is_raw_control = true;
                    socket
                } else {
                    // One '0' byte declines the file-handle passing protocol.
                    let mut socket = socket;
                    socket.write_all(b"0")?;
                    socket
                };

                self.stream = Some(MonetStream::new(socket));
            }

            if self.is_raw_control {
                // no login needed
                logged_in = true;
                break;
            }

            // On failure, `login` has either closed the socket after
            // updating the target, or left it open for another attempt.
            if self.login()? {
                logged_in = true;
                break;
            }
        }

        if !logged_in {
            return Err(Error::Operational("too many redirects".into()));
        }

        self.state = State::Ready;

        // Take care of the options the handshake could not carry.
        for opt in mem::take(&mut self.remaining_handshake_options) {
            log::debug!("applying deferred handshake option {}", opt.name);
            self.cmd(&opt.fallback)?;
        }

        Ok(())
    }

    fn prime_or_wrap(&self, socket: NetSocket) -> Result<NetSocket, Error> {
        if !self.options.tls {
            // Prime the connection with NUL bytes. A MAPI server ignores
            // them; a TLS server reached by mistake errors out instead of
            // hanging.
            let mut socket = socket;
            socket.write_all(&[0u8; 8])?;
            return Ok(socket);
        }

        match socket {
            NetSocket::Tcp(stream) => net::wrap(stream, &self.options),
            _ => Err(Error::Internal("TLS wrap on a non-TCP socket".into())),
        }
    }

    /// Read the challenge, answer it, and interpret the server's verdict.
    /// `Ok(false)` means the redirect handler has set up another round.
    fn login(&mut self) -> Result<bool, Error> {
        let challenge = self.read_block_string()?;
        let response = self.challenge_response(&challenge)?;
        self.put_block(response.as_bytes())?;

        let prompt_block = self.read_block_string()?;
        let prompt = prompt_block.trim();

        match Prompt::parse(prompt) {
            Prompt::Ready | Prompt::Ok("") => Ok(true),

            Prompt::Info(message) => {
                log::info!("{}", message);
                Ok(true)
            }

            Prompt::Error(message) => {
                log::error!("{}", message);
                Err(Error::Database(message.to_owned()))
            }

            Prompt::Redirect(rest) => {
                // A redirect response can carry several locations; only the
                // first is used.
                let redirect = rest.split('\n').next().unwrap_or("").to_owned();
                self.handle_redirect(&redirect)?;
                Ok(false)
            }

            _ => Err(Error::Programming(format!("unknown state: {prompt}"))),
        }
    }

    fn handle_redirect(&mut self, redirect: &str) -> Result<(), Error> {
        if redirect.starts_with("mapi:merovingian:") {
            // The daemon wants the real credentials next, on this socket.
            log::debug!("restarting authentication");
            self.options.apply_merovingian_redirect(redirect)
        } else {
            log::debug!("redirect to {}", redirect);
            self.options.apply_redirect(redirect)?;

            // Close the socket; the next round reconnects to the updated
            // target, even when it names the same endpoint.
            self.stream = None;
            Ok(())
        }
    }

    fn challenge_response(&mut self, challenge: &str) -> Result<String, Error> {
        let challenge = Challenge::parse(challenge)?;

        self.server_endian = challenge.endian;
        self.binexport_level = challenge.binexport_level;

        let mut handshake_options = derive_options(&self.options, challenge.binexport_level);
        let response = build_response(&challenge, &self.options, &mut handshake_options)?;

        self.remaining_handshake_options = handshake_options
            .into_iter()
            .filter(|opt| !opt.sent)
            .collect();

        Ok(response)
    }
}
