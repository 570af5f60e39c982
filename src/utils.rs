use std::net::IpAddr;
use std::str::FromStr;
use tracing::{self, error};

use crate::error::AlertError;

// For signature verification
use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
type HmacSha256 = Hmac<Sha256>;

/// Source ranges GitHub documents for webhook deliveries (`hooks` in `/meta`).
pub const GITHUB_HOOK_RANGES: [&str; 6] = [
    "192.30.252.0/22",
    "185.199.108.0/22",
    "140.82.112.0/20",
    "143.55.64.0/20",
    "2a0a:a440::/29",
    "2606:50c0::/32",
];

/// Helper function for verifying GitHub webhook signature
pub fn verify_github_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    // Expected format: "sha256=..."
    let Some(git_signature) = signature_header.strip_prefix("sha256=") else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    // GitHub provides the signature as hex
    match hex_decode(git_signature) {
        // verify_slice compares in constant time
        Ok(git_signature_bytes) => mac.verify_slice(&git_signature_bytes).is_ok(),
        Err(_) => {
            error!("Signature header is not valid hex");
            false
        }
    }
}

/// `sha256=<hex>` header value for `payload`.
#[cfg(test)]
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for Cidr {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AlertError::Config(format!("Invalid CIDR range '{}'", s));

        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let network: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.trim().parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix > max {
            return Err(invalid());
        }
        Ok(Cidr { network, prefix })
    }
}

/// Source addresses allowed to post deliveries.
#[derive(Debug, Clone)]
pub struct AllowList {
    ranges: Vec<Cidr>,
    allow_localhost: bool,
}

impl AllowList {
    pub fn parse<S: AsRef<str>>(ranges: &[S], allow_localhost: bool) -> Result<Self, AlertError> {
        let ranges = ranges
            .iter()
            .map(|r| r.as_ref().parse())
            .collect::<Result<Vec<Cidr>, _>>()?;
        Ok(Self {
            ranges,
            allow_localhost,
        })
    }

    pub fn github_defaults(allow_localhost: bool) -> Self {
        Self::parse(&GITHUB_HOOK_RANGES, allow_localhost)
            .expect("built-in GitHub ranges are valid CIDRs")
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        if ip.is_loopback() {
            return self.allow_localhost;
        }
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn signature_round_trip() {
        let body = br#"{"zen":"Keep it logically awesome."}"#;
        let header = sign_payload("It's a Secret to Everybody", body);
        assert!(verify_github_signature("It's a Secret to Everybody", body, &header));
        assert!(!verify_github_signature("other secret", body, &header));
        assert!(!verify_github_signature("It's a Secret to Everybody", b"tampered", &header));
    }

    #[test]
    fn signature_matches_github_documentation_example() {
        assert!(verify_github_signature(
            "It's a Secret to Everybody",
            b"Hello, World!",
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        ));
    }

    #[test]
    fn malformed_signature_headers_are_rejected() {
        assert!(!verify_github_signature("s", b"body", "sha1=abcdef"));
        assert!(!verify_github_signature("s", b"body", "sha256=zz"));
        assert!(!verify_github_signature("s", b"body", ""));
    }

    #[test]
    fn cidr_membership() {
        let v4: Cidr = "140.82.112.0/20".parse().unwrap();
        assert!(v4.contains(IpAddr::V4(Ipv4Addr::new(140, 82, 115, 7))));
        assert!(!v4.contains(IpAddr::V4(Ipv4Addr::new(140, 82, 128, 1))));

        let v6: Cidr = "2606:50c0::/32".parse().unwrap();
        assert!(v6.contains("2606:50c0:1::1".parse().unwrap()));
        assert!(!v6.contains("2606:50c1::1".parse().unwrap()));
        assert!(!v6.contains(IpAddr::V4(Ipv4Addr::new(140, 82, 115, 7))));

        let any: Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }

    #[test]
    fn invalid_cidrs_are_config_errors() {
        assert!(matches!("10.0.0.0/33".parse::<Cidr>(), Err(AlertError::Config(_))));
        assert!("not-an-ip/8".parse::<Cidr>().is_err());
        assert_eq!(
            "10.1.2.3".parse::<Cidr>().unwrap(),
            "10.1.2.3/32".parse::<Cidr>().unwrap()
        );
    }

    #[test]
    fn allow_list_honours_localhost_flag_and_mapped_addresses() {
        let list = AllowList::github_defaults(true);
        assert_eq!(list.len(), GITHUB_HOOK_RANGES.len());
        assert!(list.is_allowed(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(list.is_allowed(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(list.is_allowed(IpAddr::V4(Ipv4Addr::new(192, 30, 252, 10))));
        assert!(list.is_allowed(IpAddr::V6(
            Ipv4Addr::new(192, 30, 252, 10).to_ipv6_mapped()
        )));
        assert!(!list.is_allowed(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));

        let strict = AllowList::github_defaults(false);
        assert!(!strict.is_allowed(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }
}
