//! Request descriptors and request-to-site matching.
//!
//! A request is matched against the configured sites by hostname and port:
//!
//! 1. exact hostname and port;
//! 2. hostname of the default site (any port);
//! 3. the default site;
//! 4. any other hostname match.
//!
//! Only sites matching the hostname, plus the default site, are candidates.
//! A lone candidate always wins. When the best candidate is the default site
//! reached through rule 3 and exactly one hostname match exists besides it,
//! that hostname match is preferred. Several hostname matches with no
//! tie-breaker resolve to nothing.

use uuid::Uuid;

use crate::domain::entities::SiteRecord;

const DEFAULT_PORT: u16 = 80;

/// Request-like object the settings caches are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    id: Uuid,
    hostname: String,
    port: u16,
}

impl RequestInfo {
    /// Build from a `Host` header value and the port the server accepted the
    /// request on. The server port takes precedence: any `:port` inside the
    /// header is stripped and ignored for matching.
    pub fn new(host_header: &str, server_port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            hostname: split_hostname(host_header).to_ascii_lowercase(),
            port: server_port,
        }
    }

    /// Build from a host header alone, taking the port from the header when
    /// present and falling back to 80.
    pub fn from_host(host_header: &str) -> Self {
        let port = header_port(host_header).unwrap_or(DEFAULT_PORT);
        Self::new(host_header, port)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn split_hostname(host: &str) -> &str {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(inner, _)| inner);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

fn header_port(host: &str) -> Option<u16> {
    let host = host.trim();
    let tail = match host.strip_prefix('[') {
        Some(rest) => rest.split_once(']')?.1.strip_prefix(':')?,
        None => {
            let (name, port) = host.rsplit_once(':')?;
            if name.contains(':') {
                return None;
            }
            port
        }
    };
    tail.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SiteMatch {
    HostnamePort,
    HostnameDefault,
    Default,
    Hostname,
}

/// Pick the site serving `hostname:port`, following the rules in the module docs.
pub fn match_site<'a>(sites: &'a [SiteRecord], hostname: &str, port: u16) -> Option<&'a SiteRecord> {
    let mut candidates: Vec<(SiteMatch, &SiteRecord)> = sites
        .iter()
        .filter_map(|site| {
            let hostname_matches = site.hostname.eq_ignore_ascii_case(hostname);
            let rank = match (hostname_matches, site.port == port, site.is_default_site) {
                (true, true, _) => SiteMatch::HostnamePort,
                (true, false, true) => SiteMatch::HostnameDefault,
                (true, false, false) => SiteMatch::Hostname,
                (false, _, true) => SiteMatch::Default,
                (false, _, false) => return None,
            };
            Some((rank, site))
        })
        .collect();
    candidates.sort_by_key(|(rank, _)| *rank);

    let (best, site) = *candidates.first()?;
    if candidates.len() == 1 || matches!(best, SiteMatch::HostnamePort | SiteMatch::HostnameDefault)
    {
        return Some(site);
    }
    if best == SiteMatch::Default {
        let index = usize::from(candidates.len() == 2);
        return candidates.get(index).map(|(_, site)| *site);
    }
    None
}

/// The site flagged as the deployment default, if any.
pub fn default_site(sites: &[SiteRecord]) -> Option<&SiteRecord> {
    sites.iter().find(|site| site.is_default_site)
}
