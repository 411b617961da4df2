//! Pairing URL construction and parsing.
//!
//! `nostr+walletconnect://<provider_xonly_pub_hex>?relay=<ws_or_wss_url>&secret=<client_privkey_hex>`

use url::Url;

use crate::error::Error;
use crate::store::config_keys;

const SCHEME: &str = "nostr+walletconnect";

/// Build a pairing URL for `client_secret_hex`, resolving the effective
/// relay URL from config: `relay_alias` takes precedence; otherwise, if
/// `relay` is the sentinel, substitute `default_relay_url`.
pub fn build_pairing_url(
    provider_pubkey_hex: &str,
    relay: &str,
    relay_alias: Option<&str>,
    default_relay_url: &str,
    client_secret_hex: &str,
) -> String {
    let effective_relay = match relay_alias {
        Some(alias) if !alias.is_empty() => alias,
        _ if relay == config_keys::RELAY_SENTINEL_DEFAULT => default_relay_url,
        _ => relay,
    };

    let mut url = Url::parse(&format!("{SCHEME}://{provider_pubkey_hex}")).expect("scheme+host is always valid");
    url.query_pairs_mut()
        .append_pair("relay", effective_relay)
        .append_pair("secret", client_secret_hex);
    url.to_string()
}

/// The pieces of a parsed pairing URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingUrl {
    /// Provider's x-only pubkey, hex.
    pub provider_pubkey: String,
    /// Relay URL.
    pub relay: String,
    /// Client's secret key, hex.
    pub secret: String,
}

/// Parse a pairing URL produced by [`build_pairing_url`].
pub fn parse_pairing_url(input: &str) -> Result<PairingUrl, Error> {
    let url = Url::parse(input).map_err(|_| Error::Validation("malformed pairing url".into()))?;
    if url.scheme() != SCHEME {
        return Err(Error::Validation(format!("unexpected scheme: {}", url.scheme())));
    }
    let provider_pubkey = url
        .host_str()
        .ok_or_else(|| Error::Validation("missing provider pubkey".into()))?
        .to_string();

    let mut relay = None;
    let mut secret = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "relay" => relay = Some(value.into_owned()),
            "secret" => secret = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok(PairingUrl {
        provider_pubkey,
        relay: relay.ok_or_else(|| Error::Validation("missing relay".into()))?,
        secret: secret.ok_or_else(|| Error::Validation("missing secret".into()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_build_and_parse() {
        let url = build_pairing_url(
            "a".repeat(64).as_str(),
            config_keys::RELAY_SENTINEL_DEFAULT,
            None,
            "ws://127.0.0.1:4848",
            "b".repeat(64).as_str(),
        );
        let parsed = parse_pairing_url(&url).unwrap();
        assert_eq!(parsed.provider_pubkey, "a".repeat(64));
        assert_eq!(parsed.relay, "ws://127.0.0.1:4848");
        assert_eq!(parsed.secret, "b".repeat(64));
    }

    #[test]
    fn relay_alias_takes_precedence_over_sentinel_substitution() {
        let url = build_pairing_url(
            "a".repeat(64).as_str(),
            config_keys::RELAY_SENTINEL_DEFAULT,
            Some("wss://relay.example.com"),
            "ws://127.0.0.1:4848",
            "b".repeat(64).as_str(),
        );
        let parsed = parse_pairing_url(&url).unwrap();
        assert_eq!(parsed.relay, "wss://relay.example.com");
    }

    #[test]
    fn explicit_relay_is_used_verbatim() {
        let url = build_pairing_url(
            "a".repeat(64).as_str(),
            "wss://my-relay.example.com",
            None,
            "ws://127.0.0.1:4848",
            "b".repeat(64).as_str(),
        );
        let parsed = parse_pairing_url(&url).unwrap();
        assert_eq!(parsed.relay, "wss://my-relay.example.com");
    }
}
