use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrmError;

const REDACTED: &str = "***";

/// Where a store lives:
/// `scheme://[user[:password]@]host[:port][,host[:port]...]/database[?key=value&...]`.
///
/// Scheme and hosts are lowercased when parsed, so equal addresses compare
/// identically. Credentials, the database name and options keep their case.
/// Credentials are kept as written, percent-encoding included.
///
/// `Display` and `Debug` mask the password. [`connection_string`] is the full
/// form; it is what the pool caches on and what serde writes.
///
/// [`connection_string`]: Address::connection_string
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    scheme: String,
    username: Option<String>,
    password: Option<String>,
    hosts: Vec<(String, Option<u16>)>,
    database: String,
    options: Vec<(String, String)>,
}

impl Address {
    pub fn parse(address: &str) -> Result<Self, OrmError> {
        let address = address.trim();
        let invalid = |reason: &str| OrmError::InvalidAddress {
            address: redact(address),
            reason: reason.to_string(),
        };

        let (scheme, rest) = address
            .split_once("://")
            .ok_or_else(|| invalid("missing `://` after the scheme"))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return Err(invalid("scheme must be alphanumeric"));
        }

        let (authority, tail) = rest.split_at(rest.find(['/', '?']).unwrap_or(rest.len()));
        let path = tail
            .strip_prefix('/')
            .ok_or_else(|| invalid("missing database name"))?;
        let (database, query) = match path.split_once('?') {
            Some((database, query)) => (database, Some(query)),
            None => (path, None),
        };

        let database = database.trim_end_matches('/');
        if database.is_empty() {
            return Err(invalid("missing database name"));
        }
        if database.contains(['/', ' ', '.', '$']) {
            return Err(invalid("database name contains a reserved character"));
        }

        let (userinfo, hosts) = match authority.rsplit_once('@') {
            Some((userinfo, hosts)) => (Some(userinfo), hosts),
            None => (None, authority),
        };
        let (username, password) = match userinfo {
            None => (None, None),
            Some(userinfo) => {
                let (user, password) = match userinfo.split_once(':') {
                    Some((user, password)) => (user, Some(password.to_string())),
                    None => (userinfo, None),
                };
                if user.is_empty() {
                    return Err(invalid("missing user name before `@`"));
                }
                (Some(user.to_string()), password)
            }
        };

        let hosts = hosts
            .split(',')
            .map(|host| parse_host(host).map_err(|reason| invalid(reason)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut options = Vec::new();
        for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    options.push((key.to_string(), value.to_string()))
                }
                _ => return Err(invalid("options must be `key=value` pairs")),
            }
        }

        Ok(Address {
            scheme: scheme.to_ascii_lowercase(),
            username,
            password,
            hosts,
            database: database.to_string(),
            options,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The first host.
    pub fn host(&self) -> &str {
        self.hosts.first().map_or("", |(host, _)| host.as_str())
    }

    /// Port of the first host.
    pub fn port(&self) -> Option<u16> {
        self.hosts.first().and_then(|(_, port)| *port)
    }

    /// Every host in the order given. IPv6 hosts keep their brackets.
    pub fn hosts(&self) -> impl Iterator<Item = (&str, Option<u16>)> {
        self.hosts.iter().map(|(host, port)| (host.as_str(), *port))
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    /// Value of an option. Option names match case-insensitively.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The full address, password included.
    pub fn connection_string(&self) -> String {
        self.render(self.password.as_deref())
    }

    fn render(&self, password: Option<&str>) -> String {
        let mut out = format!("{}://", self.scheme);
        if let Some(username) = &self.username {
            out.push_str(username);
            if let Some(password) = password {
                out.push(':');
                out.push_str(password);
            }
            out.push('@');
        }

        let hosts: Vec<String> = self
            .hosts
            .iter()
            .map(|(host, port)| match port {
                Some(port) => format!("{host}:{port}"),
                None => host.clone(),
            })
            .collect();
        out.push_str(&hosts.join(","));
        out.push('/');
        out.push_str(&self.database);

        if !self.options.is_empty() {
            let options: Vec<String> = self
                .options
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            out.push('?');
            out.push_str(&options.join("&"));
        }
        out
    }
}

/// `host`, `host:port`, `[v6]` or `[v6]:port`.
fn parse_host(host: &str) -> Result<(String, Option<u16>), &'static str> {
    let (name, port) = if host.starts_with('[') {
        let end = host.find(']').ok_or("unterminated `[` in host")?;
        let (name, rest) = host.split_at(end + 1);
        match rest {
            "" => (name, None),
            _ => match rest.strip_prefix(':') {
                Some(port) => (name, Some(port)),
                None => return Err("unexpected text after `]` in host"),
            },
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) => (name, Some(port)),
            None => (host, None),
        }
    };

    if name.is_empty() || name == "[]" {
        return Err("missing host");
    }
    let port = port
        .map(|port| port.parse::<u16>())
        .transpose()
        .map_err(|_| "port must be a number between 0 and 65535")?;
    Ok((name.to_ascii_lowercase(), port))
}

/// Mask the password in raw address text, for error messages.
fn redact(address: &str) -> String {
    let Some((scheme, rest)) = address.split_once("://") else {
        return address.to_string();
    };
    let (authority, tail) = rest.split_at(rest.find(['/', '?']).unwrap_or(rest.len()));
    match authority.rsplit_once('@') {
        Some((userinfo, hosts)) => match userinfo.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:{REDACTED}@{hosts}{tail}"),
            None => address.to_string(),
        },
        None => address.to_string(),
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(self.password.as_ref().map(|_| REDACTED)))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("hosts", &self.hosts)
            .field("database", &self.database)
            .field("options", &self.options)
            .finish()
    }
}

impl FromStr for Address {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = OrmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.connection_string()
    }
}
