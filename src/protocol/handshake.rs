use crate::options::MonetConnectOptions;

/// A feature toggle negotiated inline with login.
///
/// The server advertises the highest option level it understands inside the
/// challenge (`sql=N`). An option below that level rides along in the login
/// response as `name=value`; an option at or above it is applied after login
/// by issuing `fallback` as an ordinary command.
#[derive(Debug, Clone)]
pub struct HandshakeOption {
    pub level: u32,
    pub name: &'static str,
    pub value: i64,
    pub fallback: String,
    pub(crate) sent: bool,
}

impl HandshakeOption {
    pub fn new(level: u32, name: &'static str, value: i64, fallback: String) -> HandshakeOption {
        HandshakeOption {
            level,
            name,
            value,
            fallback,
            sent: false,
        }
    }
}

/// Derive the handshake options for a target.
///
/// `binexport_level` is the binary export level the server advertised; it is
/// recorded on the connection for result-set consumers and reserved here for
/// options that may depend on it.
pub(crate) fn derive_options(
    options: &MonetConnectOptions,
    _binexport_level: u32,
) -> Vec<HandshakeOption> {
    let autocommit = i64::from(options.autocommit);

    let mut handshake = vec![
        HandshakeOption::new(
            1,
            "auto_commit",
            autocommit,
            format!("Xauto_commit {autocommit}"),
        ),
        HandshakeOption::new(
            2,
            "reply_size",
            options.replysize,
            format!("Xreply_size {}", options.replysize),
        ),
        HandshakeOption::new(3, "size_header", 1, String::from("Xsizeheader 1")),
    ];

    if let Some(minutes_east) = options.timezone {
        let seconds_east = i64::from(minutes_east) * 60;
        let sign = if minutes_east < 0 { '-' } else { '+' };
        let offset = minutes_east.unsigned_abs();

        handshake.push(HandshakeOption::new(
            5,
            "time_zone",
            seconds_east,
            format!(
                "sSET TIME ZONE INTERVAL '{sign}{:02}:{:02}' HOUR TO MINUTE;",
                offset / 60,
                offset % 60,
            ),
        ));
    }

    handshake
}

#[cfg(test)]
mod tests {
    use super::derive_options;
    use crate::options::MonetConnectOptions;

    #[test]
    fn it_derives_defaults() {
        let options = derive_options(&MonetConnectOptions::new(), 0);
        let summary: Vec<_> = options
            .iter()
            .map(|o| (o.level, o.name, o.value))
            .collect();

        assert_eq!(
            summary,
            vec![
                (1, "auto_commit", 0),
                (2, "reply_size", 100),
                (3, "size_header", 1),
            ]
        );
        assert_eq!(options[1].fallback, "Xreply_size 100");
    }

    #[test]
    fn it_maps_the_time_zone_to_seconds() {
        let target = MonetConnectOptions::new().autocommit(true).timezone(-330);
        let options = derive_options(&target, 0);

        assert_eq!(options[0].value, 1);

        let tz = options.last().unwrap();
        assert_eq!(tz.name, "time_zone");
        assert_eq!(tz.value, -330 * 60);
        assert_eq!(
            tz.fallback,
            "sSET TIME ZONE INTERVAL '-05:30' HOUR TO MINUTE;"
        );
    }
}
