// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::net::{SocketAddr, ToSocketAddrs};
use tower::BoxError;

/// Parse a single key-value pair
pub(crate) fn parse_key_val<T, U>(s: &str) -> Result<(T, U), BoxError>
where
    T: std::str::FromStr,
    T::Err: Error + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].trim().parse()?, s[pos + 1..].trim().parse()?))
}

/// Parse a listen address. Host names are resolved, `localhost` always maps
/// to the IPv4 loopback.
pub fn parse_endpoint(s: &str) -> Result<SocketAddr, Box<dyn Error + Send + Sync + 'static>> {
    let s = if s.starts_with("localhost:") {
        s.replace("localhost:", "127.0.0.1:")
    } else {
        s.to_string()
    };
    if let Ok(sa) = s.parse::<SocketAddr>() {
        return Ok(sa);
    }
    s.to_socket_addrs()?
        .next()
        .ok_or_else(|| format!("no address found for `{s}`").into())
}
