//! Parser for metaprotocol URNs.
//!
//! Every inscription-bearing transaction carries a memo shaped
//!
//! ```text
//! urn:<protocol>:<chain-id>@<version>;<operation>$<key>=<value>,<key>=<value>,...
//! ```
//!
//! e.g. `urn:cft20:testchain-1@v1;mint$tic=MARS,amt=1000`. Values are
//! percent-encoded on the wire; keys are case-insensitive and must be unique.
//! The parameter section is optional for operations that take no arguments.

use percent_encoding::percent_decode_str;

use crate::error::{ProtocolError, ProtocolResult};

/// A fully parsed metaprotocol URN.
///
/// Parameters keep their wire order; lookups are by (lowercased) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrn {
    /// Metaprotocol name, e.g. "inscription", "cft20".
    pub protocol: String,
    /// Chain the operation is addressed to.
    pub chain_id: String,
    /// Metaprotocol version, e.g. "v1".
    pub version: String,
    /// Operation name, e.g. "deploy" or "list.cft20".
    pub operation: String,
    params: Vec<(String, String)>,
}

impl ParsedUrn {
    /// Parse a memo string into a [`ParsedUrn`].
    ///
    /// Fails with [`ProtocolError::MalformedUrn`] on any structural
    /// violation, including duplicate parameter keys.
    pub fn parse(input: &str) -> ProtocolResult<Self> {
        let input = input.trim();

        let rest = input
            .strip_prefix("urn:")
            .ok_or_else(|| malformed("missing 'urn:' prefix"))?;

        let (protocol, rest) = rest
            .split_once(':')
            .ok_or_else(|| malformed("missing protocol separator"))?;
        if protocol.is_empty() {
            return Err(malformed("empty protocol"));
        }

        let (address, payload) = rest
            .split_once(';')
            .ok_or_else(|| malformed("missing operation separator"))?;

        let (chain_id, version) = address
            .split_once('@')
            .ok_or_else(|| malformed("missing version separator"))?;
        if chain_id.is_empty() {
            return Err(malformed("empty chain id"));
        }
        if version.is_empty() {
            return Err(malformed("empty version"));
        }

        let (operation, raw_params) = match payload.split_once('$') {
            Some((op, params)) => (op, Some(params)),
            None => (payload, None),
        };
        if operation.is_empty() {
            return Err(malformed("empty operation"));
        }

        let mut params = Vec::new();
        if let Some(raw) = raw_params {
            for pair in raw.split(',') {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| malformed(&format!("parameter '{}' has no value", pair)))?;
                let key = key.trim().to_lowercase();
                if key.is_empty() {
                    return Err(malformed("empty parameter key"));
                }
                if params.iter().any(|(k, _)| *k == key) {
                    return Err(malformed(&format!("duplicate parameter '{}'", key)));
                }
                let value = percent_decode_str(value)
                    .decode_utf8()
                    .map_err(|_| malformed(&format!("parameter '{}' is not valid UTF-8", key)))?
                    .into_owned();
                params.push((key, value));
            }
        }

        Ok(Self {
            protocol: protocol.to_string(),
            chain_id: chain_id.to_string(),
            version: version.to_string(),
            operation: operation.to_string(),
            params,
        })
    }

    /// Look up a parameter by key (keys were lowercased at parse time).
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a required parameter, trimmed.
    pub fn require(&self, key: &'static str) -> ProtocolResult<&str> {
        match self.param(key).map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(ProtocolError::MissingParameter(key)),
        }
    }

    /// All parameters in wire order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

fn malformed(reason: &str) -> ProtocolError {
    ProtocolError::MalformedUrn(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_urn() {
        let urn =
            ParsedUrn::parse("urn:cft20:testchain-1@v1;deploy$nam=Mars,tic=MARS,sup=1000,dec=6")
                .unwrap();
        assert_eq!(urn.protocol, "cft20");
        assert_eq!(urn.chain_id, "testchain-1");
        assert_eq!(urn.version, "v1");
        assert_eq!(urn.operation, "deploy");
        assert_eq!(urn.param("tic"), Some("MARS"));
        assert_eq!(urn.param("sup"), Some("1000"));
    }

    #[test]
    fn operation_may_contain_dots() {
        let urn =
            ParsedUrn::parse("urn:marketplace:testchain-1@v1;list.cft20$tic=MARS,amt=100,ppt=2")
                .unwrap();
        assert_eq!(urn.operation, "list.cft20");
    }

    #[test]
    fn parameter_section_is_optional() {
        let urn = ParsedUrn::parse("urn:inscription:testchain-1@v1;burn").unwrap();
        assert_eq!(urn.operation, "burn");
        assert!(urn.params().is_empty());
    }

    #[test]
    fn values_are_percent_decoded() {
        let urn =
            ParsedUrn::parse("urn:inscription:testchain-1@v1;inscribe$nam=Hello%20World%2C%20hi")
                .unwrap();
        assert_eq!(urn.param("nam"), Some("Hello World, hi"));
    }

    #[test]
    fn keys_are_lowercased() {
        let urn = ParsedUrn::parse("urn:cft20:testchain-1@v1;mint$TIC=MARS,Amt=5").unwrap();
        assert_eq!(urn.param("tic"), Some("MARS"));
        assert_eq!(urn.param("amt"), Some("5"));
    }

    // Test critique: les clés dupliquées sont rejetées, pas écrasées
    #[test]
    fn duplicate_keys_are_rejected() {
        let err = ParsedUrn::parse("urn:cft20:testchain-1@v1;mint$tic=MARS,tic=VENUS").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedUrn(_)));
        assert!(err.to_string().contains("duplicate"));

        // Même clé sous des casses différentes = même clé
        let err = ParsedUrn::parse("urn:cft20:testchain-1@v1;mint$tic=MARS,TIC=VENUS").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn structural_violations_fail() {
        for bad in [
            "",
            "not a urn",
            "urn:",
            "urn:cft20",
            "urn:cft20:testchain-1",
            "urn:cft20:testchain-1;mint",
            "urn:cft20:@v1;mint",
            "urn:cft20:testchain-1@;mint",
            "urn:cft20:testchain-1@v1;",
            "urn:cft20:testchain-1@v1;mint$novalue",
            "urn::testchain-1@v1;mint",
        ] {
            assert!(
                matches!(ParsedUrn::parse(bad), Err(ProtocolError::MalformedUrn(_))),
                "expected malformed urn for {:?}",
                bad
            );
        }
    }

    #[test]
    fn require_rejects_blank_values() {
        let urn = ParsedUrn::parse("urn:cft20:testchain-1@v1;mint$tic=%20,amt=5").unwrap();
        assert!(matches!(
            urn.require("tic"),
            Err(ProtocolError::MissingParameter("tic"))
        ));
        assert_eq!(urn.require("amt").unwrap(), "5");
        assert!(matches!(
            urn.require("dst"),
            Err(ProtocolError::MissingParameter("dst"))
        ));
    }
}
