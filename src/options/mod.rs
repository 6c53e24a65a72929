use std::path::{Path, PathBuf};
use std::time::Duration;

mod parse;

bitflags::bitflags! {
    /// TLS verification steps that can be switched off.
    ///
    /// Disabling either check makes the connection vulnerable to
    /// man-in-the-middle attacks; both are implied when a certificate
    /// fingerprint is pinned, because the fingerprint replaces them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TlsChecks: u8 {
        /// Ignore a host name mismatch in the server certificate.
        const HOST = 1;
        /// Ignore a bad certificate chain.
        const CERT = 2;
    }
}

/// Options and flags which can be used to configure a MonetDB connection.
///
/// The resolved connection target: which endpoint to dial, how to secure it,
/// who to log in as and the session parameters negotiated during the
/// handshake. A redirect received during login may overwrite the
/// connection-relevant fields of the connection's private copy.
///
/// # Example
///
/// ```rust,no_run
/// # use monetdb_core::{MonetConnection, MonetConnectOptions};
/// # fn main() -> Result<(), monetdb_core::Error> {
/// let conn = MonetConnection::establish(
///     &MonetConnectOptions::new()
///         .host("localhost")
///         .user("monetdb")
///         .password("monetdb")
///         .database("demo"),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MonetConnectOptions {
    pub(crate) host: Option<String>,
    pub(crate) port: u16,
    pub(crate) sock: Option<PathBuf>,
    pub(crate) user: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) database: Option<String>,
    pub(crate) language: String,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) tls: bool,
    pub(crate) cert: Option<PathBuf>,
    pub(crate) client_key: Option<PathBuf>,
    pub(crate) client_cert: Option<PathBuf>,
    pub(crate) client_key_password: Option<String>,
    pub(crate) fingerprint: Option<String>,
    pub(crate) dangerous_tls_nocheck: TlsChecks,
    pub(crate) autocommit: bool,
    pub(crate) replysize: i64,
    pub(crate) maxprefetch: i64,
    pub(crate) binary_level: u32,
    pub(crate) schema: Option<String>,
    pub(crate) timezone: Option<i32>,
}

impl Default for MonetConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl MonetConnectOptions {
    /// Creates a new, default set of options ready for configuration.
    pub fn new() -> Self {
        Self {
            host: None,
            port: 50000,
            sock: None,
            user: None,
            password: None,
            database: None,
            language: String::from("sql"),
            connect_timeout: None,
            tls: false,
            cert: None,
            client_key: None,
            client_cert: None,
            client_key_password: None,
            fingerprint: None,
            dangerous_tls_nocheck: TlsChecks::empty(),
            autocommit: false,
            replysize: 100,
            maxprefetch: 2500,
            binary_level: 1,
            schema: None,
            timezone: None,
        }
    }

    /// Sets the name of the host to connect to.
    ///
    /// When a Unix domain socket is also configured, the socket is tried
    /// first and the host is the fallback.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_owned());
        self
    }

    /// Sets the port to connect to at the server host.
    ///
    /// The default port for MonetDB is `50000`.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Pass a path to a Unix domain socket to dial before any TCP host.
    pub fn sock(mut self, path: impl AsRef<Path>) -> Self {
        self.sock = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the user name to authenticate as.
    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_owned());
        self
    }

    /// Sets the password to authenticate with.
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_owned());
        self
    }

    /// Sets the database to attach to.
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_owned());
        self
    }

    /// Sets the server-side language. The default is `sql`; `control`
    /// selects the raw daemon control channel, which skips login entirely
    /// on Unix domain sockets.
    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_owned();
        self
    }

    /// Apply a timeout to the connect call. The timeout governs only the
    /// connection attempt; once connected the socket blocks without limit.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Secure (encrypt) the connection with TLS.
    ///
    /// TLS is only possible over TCP; combining this with [`sock`] is
    /// rejected at connect time.
    ///
    /// [`sock`]: Self::sock
    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the name of a file containing the PEM certificate(s) to verify
    /// the server with, replacing the default trust roots.
    pub fn cert(mut self, file_name: impl AsRef<Path>) -> Self {
        self.cert = Some(file_name.as_ref().to_owned());
        self
    }

    /// Sets the path of a PEM key to present to the server for client
    /// authentication.
    pub fn client_key(mut self, file_name: impl AsRef<Path>) -> Self {
        self.client_key = Some(file_name.as_ref().to_owned());
        self
    }

    /// Sets the path of the certificate belonging to [`client_key`]. When
    /// not set, the certificate is read from the key file itself.
    ///
    /// [`client_key`]: Self::client_key
    pub fn client_cert(mut self, file_name: impl AsRef<Path>) -> Self {
        self.client_cert = Some(file_name.as_ref().to_owned());
        self
    }

    /// Password for an encrypted client key.
    pub fn client_key_password(mut self, password: &str) -> Self {
        self.client_key_password = Some(password.to_owned());
        self
    }

    /// Pin the server certificate to a fingerprint instead of verifying the
    /// certificate chain and host name.
    ///
    /// The fingerprint is a comma-separated list of specifiers of the form
    /// `{algo}hexdigits`; the algorithm defaults to `sha1` and colons in the
    /// digits are ignored. A specifier matches when the hex digest of the
    /// server certificate in DER form starts with its digits.
    pub fn fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = Some(fingerprint.to_owned());
        self
    }

    /// Skip the given TLS verification steps.
    pub fn dangerous_tls_nocheck(mut self, checks: TlsChecks) -> Self {
        self.dangerous_tls_nocheck = checks;
        self
    }

    /// Enable or disable auto-commit. Disabled by default.
    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    /// Number of rows the server returns immediately after query execution;
    /// `-1` means everything. The default is `100`.
    pub fn replysize(mut self, replysize: i64) -> Self {
        self.replysize = replysize;
        self
    }

    /// Maximum number of additional rows a cursor layer may fetch ahead.
    /// Carried in the target for the benefit of that layer; the protocol
    /// core does not act on it.
    pub fn maxprefetch(mut self, maxprefetch: i64) -> Self {
        self.maxprefetch = maxprefetch;
        self
    }

    /// Highest binary result-set level the caller is prepared to consume,
    /// `0` to disable binary result sets.
    pub fn binary_level(mut self, level: u32) -> Self {
        self.binary_level = level;
        self
    }

    /// The schema to select after connecting. Carried in the target for the
    /// benefit of the cursor layer.
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_owned());
        self
    }

    /// The session time zone, in minutes east of UTC.
    pub fn timezone(mut self, minutes_east: i32) -> Self {
        self.timezone = Some(minutes_east);
        self
    }

    pub fn get_host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_sock(&self) -> Option<&Path> {
        self.sock.as_deref()
    }

    pub fn get_user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn get_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn get_language(&self) -> &str {
        &self.language
    }

    pub fn get_autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn get_replysize(&self) -> i64 {
        self.replysize
    }

    pub fn get_maxprefetch(&self) -> i64 {
        self.maxprefetch
    }

    pub fn get_binary_level(&self) -> u32 {
        self.binary_level
    }

    pub fn get_schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn get_timezone(&self) -> Option<i32> {
        self.timezone
    }
}
