use std::borrow::Cow;
use std::path::PathBuf;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::Error;
use crate::options::MonetConnectOptions;

// Redirects arrive as `mapi:monetdb://host:port/database?key=value` or, for a
// Unix domain socket, `mapi:monetdb:///path/to/socket?database=demo`. The
// merovingian daemon instead answers `mapi:merovingian:proceed`, possibly
// with a query string, to request another login round on the same socket.

impl MonetConnectOptions {
    /// Overwrite the connection-relevant fields from a `mapi:monetdb://`
    /// redirect URL.
    pub(crate) fn apply_redirect(&mut self, redirect: &str) -> Result<(), Error> {
        let rest = redirect
            .strip_prefix("mapi:")
            .ok_or_else(|| Error::Database(format!("invalid redirect: {redirect}")))?;

        let url: Url = rest
            .parse()
            .map_err(|e| Error::Database(format!("invalid redirect {redirect}: {e}")))?;

        if url.scheme() != "monetdb" {
            return Err(Error::Database(format!(
                "unsupported redirect scheme: {}",
                url.scheme()
            )));
        }

        match url.host_str() {
            Some(host) if !host.is_empty() => {
                self.host = Some(host.to_owned());
                self.port = url.port().unwrap_or(50000);
                self.sock = None;

                let database = url.path().trim_matches('/');
                if !database.is_empty() {
                    self.database = Some(decode(database)?.into_owned());
                }
            }

            // No host: the path is a Unix domain socket.
            _ => {
                let path = decode(url.path())?;
                if path.is_empty() {
                    return Err(Error::Database(format!(
                        "redirect carries neither host nor socket: {redirect}"
                    )));
                }
                self.sock = Some(PathBuf::from(path.into_owned()));
                self.host = None;
            }
        }

        if !url.username().is_empty() {
            self.user = Some(decode(url.username())?.into_owned());
        }
        if let Some(password) = url.password() {
            self.password = Some(decode(password)?.into_owned());
        }

        for (key, value) in url.query_pairs() {
            self.apply_url_param(&key, &value);
        }

        Ok(())
    }

    /// Apply a `mapi:merovingian:` redirect: the daemon restarts
    /// authentication on the same socket, optionally adjusting options
    /// through a query string.
    pub(crate) fn apply_merovingian_redirect(&mut self, redirect: &str) -> Result<(), Error> {
        let rest = redirect
            .strip_prefix("mapi:merovingian:")
            .ok_or_else(|| Error::Database(format!("invalid merovingian redirect: {redirect}")))?;

        if let Some((_, query)) = rest.split_once('?') {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                self.apply_url_param(&key, &value);
            }
        }

        Ok(())
    }

    fn apply_url_param(&mut self, key: &str, value: &str) {
        match key {
            "user" | "username" => self.user = Some(value.to_owned()),
            "password" => self.password = Some(value.to_owned()),
            "database" => self.database = Some(value.to_owned()),
            "language" => self.language = value.to_owned(),

            _ => log::warn!("ignoring unrecognized redirect parameter: {}={}", key, value),
        }
    }
}

fn decode(value: &str) -> Result<Cow<'_, str>, Error> {
    percent_decode_str(value)
        .decode_utf8()
        .map_err(|e| Error::Database(format!("invalid percent-encoding in redirect: {e}")))
}
