//! External IP providers and their response normalisation

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use shared::ExternalIpInfo;

use crate::error::{ControllerError, ControllerResult};

/// Normalised answer of one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Valid { ip: String, country_code: Option<String> },
    Invalid { reason: String },
}

impl ProbeResult {
    fn invalid(reason: impl Into<String>) -> Self {
        ProbeResult::Invalid { reason: reason.into() }
    }

    pub fn into_result(self) -> ControllerResult<ExternalIpInfo> {
        match self {
            ProbeResult::Valid { ip, country_code } => Ok(ExternalIpInfo { ip, country_code }),
            ProbeResult::Invalid { reason } => Err(ControllerError::ProbeInvalid { reason }),
        }
    }
}

/// An IP-info endpoint and the JSON fields carrying the answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpProvider {
    pub url: String,
    pub ip_field: String,
    pub country_field: String,
}

impl IpProvider {
    pub fn new(url: impl Into<String>, ip_field: impl Into<String>, country_field: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ip_field: ip_field.into(),
            country_field: country_field.into(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("https://ipwho.is", "ip", "country_code"),
            Self::new("https://api.ip.sb/geoip", "ip", "country_code"),
            Self::new("https://ipapi.co/json", "ip", "country_code"),
            Self::new("http://ip-api.com/json", "query", "countryCode"),
        ]
    }

    /// Validate a response body
    ///
    /// The IP must look like an IPv4/IPv6 literal. The country code may be
    /// absent, but when present it must be two upper-case letters.
    pub fn extract(&self, body: &str) -> ProbeResult {
        let body = body.trim();
        if body.is_empty() {
            return ProbeResult::invalid("empty body");
        }

        let json: Value = match serde_json::from_str(body) {
            Ok(json) => json,
            Err(e) => return ProbeResult::invalid(format!("not json: {e}")),
        };

        let Some(ip) = json.get(&self.ip_field).and_then(Value::as_str) else {
            return ProbeResult::invalid(format!("missing '{}'", self.ip_field));
        };
        if !matches_pattern(&IP_PATTERN, r"^[0-9.:a-fA-F]+$", ip) {
            return ProbeResult::invalid(format!("malformed ip '{ip}'"));
        }

        let country_code = match json.get(&self.country_field) {
            None | Some(Value::Null) => None,
            Some(Value::String(code)) if matches_pattern(&COUNTRY_PATTERN, r"^[A-Z]{2}$", code) => Some(code.clone()),
            Some(other) => return ProbeResult::invalid(format!("malformed country code {other}")),
        };

        ProbeResult::Valid {
            ip: ip.to_string(),
            country_code,
        }
    }
}

static IP_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static COUNTRY_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn matches_pattern(cell: &'static OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}
