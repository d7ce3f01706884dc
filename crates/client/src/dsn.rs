//! DSN parsing and formatting.
//!
//! A DSN is either scheme-qualified
//! (`dsql://<database_id>?use_leader=0&use_follower=1&mirror=<name>`) or a
//! bare database identifier. `format_dsn` omits default-valued and empty
//! options, so parse∘format is the identity and format output is
//! byte-stable under another parse/format round.

use url::Url;

use crate::error::{Error, Result};

/// The dsn scheme.
pub const DB_SCHEME: &str = "dsql";

/// Connection preferences for one database, parsed from a DSN.
///
/// `use_leader` and `use_follower` are independent: both may be set, in
/// which case reads pick from the whole peer set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// A 64-hex derived identifier or an opaque alias.
    pub database_id: String,
    /// Route queries to the leader (default true).
    pub use_leader: bool,
    /// Route queries to followers (default false).
    pub use_follower: bool,
    /// Named read-only mirror to prefer, if any.
    pub mirror: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_id: String::new(),
            use_leader: true,
            use_follower: false,
            mirror: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /// Parse a DSN. A string that is neither a valid scheme URL nor a
    /// valid bare identifier fails with `InvalidDsn` and yields no
    /// partial config.
    pub fn parse(dsn: &str) -> Result<Config> {
        if dsn.is_empty() {
            return Err(Error::InvalidDsn("empty dsn".into()));
        }

        // Bare identifiers are read by prepending the scheme, exactly as
        // a scheme-qualified DSN with no options would parse.
        let qualified;
        let dsn = if dsn.contains("://") {
            dsn
        } else {
            qualified = format!("{}://{}", DB_SCHEME, dsn);
            &qualified
        };

        let url = Url::parse(dsn).map_err(|e| Error::InvalidDsn(e.to_string()))?;
        if url.scheme() != DB_SCHEME {
            return Err(Error::InvalidDsn(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }

        let database_id = url.host_str().unwrap_or_default().to_string();
        if database_id.is_empty() {
            return Err(Error::InvalidDsn("missing database id".into()));
        }

        let mut cfg = Config {
            database_id,
            ..Config::default()
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "use_leader" => cfg.use_leader = parse_bool(&value)?,
                "use_follower" => cfg.use_follower = parse_bool(&value)?,
                "mirror" => {
                    if !value.is_empty() {
                        cfg.mirror = Some(value.into_owned());
                    }
                }
                // Unknown options pass through unmodified readers.
                _ => {}
            }
        }
        Ok(cfg)
    }

    /// Format back to a DSN, omitting options at their default value.
    pub fn format_dsn(&self) -> String {
        let mut dsn = format!("{}://{}", DB_SCHEME, self.database_id);
        let mut sep = '?';
        let mut push = |dsn: &mut String, key: &str, value: &str| {
            dsn.push(sep);
            dsn.push_str(key);
            dsn.push('=');
            dsn.push_str(value);
            sep = '&';
        };
        if !self.use_leader {
            push(&mut dsn, "use_leader", "0");
        }
        if self.use_follower {
            push(&mut dsn, "use_follower", "1");
        }
        if let Some(mirror) = self.mirror.as_deref() {
            if !mirror.is_empty() {
                push(&mut dsn, "mirror", mirror);
            }
        }
        dsn
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    match s {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(Error::InvalidDsn(format!("bad bool option {:?}", other))),
    }
}
