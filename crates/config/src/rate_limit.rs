//! Rate limit registration options.
//!
//! A registration is validated from its raw TOML table so that every violated
//! constraint can be reported at once, instead of stopping at the first serde error.

use std::{fmt, time::Duration};

use serde::{Deserialize, Deserializer};
use toml::{Table, Value};
use url::Url;

use crate::validation::ValidationError;

/// Request lifecycle phases an interceptor can be attached to, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// As soon as the request is received, before routing.
    OnRequest,
    /// Before authentication runs.
    OnPreAuth,
    /// After authentication ran.
    OnPostAuth,
    /// Right before the route handler.
    OnPreHandler,
}

impl Phase {
    /// All phases in the order the host runs them.
    pub const ALL: [Phase; 4] = [Phase::OnRequest, Phase::OnPreAuth, Phase::OnPostAuth, Phase::OnPreHandler];

    /// The configuration name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::OnRequest => "onRequest",
            Phase::OnPreAuth => "onPreAuth",
            Phase::OnPostAuth => "onPostAuth",
            Phase::OnPreHandler => "onPreHandler",
        }
    }

    /// Looks a phase up by its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|phase| phase.as_str() == name)
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Phase::as_str).collect()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the key of a file-configured registration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// The client IP address.
    ClientIp,
    /// The value of an HTTP header. Requests without the header are not limited.
    HttpHeader(String),
}

/// What to do when the quota backend fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnQuotaError {
    /// Let the request through.
    #[default]
    Continue,
    /// Answer with an internal server error.
    Reject,
}

/// A validated rate limit registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitOptions {
    /// The phase the interceptor runs in.
    pub event: Phase,
    /// The bucket type passed to the quota backend.
    pub bucket_type: String,
    /// Base URL of the quota backend.
    pub address: Url,
    /// How the rate limit key is extracted from a request.
    pub extract_key: KeySource,
    /// Behavior on quota backend failures.
    pub on_error: OnQuotaError,
    /// Timeout of a single quota request.
    pub timeout: Option<Duration>,
}

const KEYS: &[&str] = &["event", "type", "address", "extract_key", "on_error", "timeout"];
const ON_ERROR_VALUES: &[&str] = &["continue", "reject"];
const ADDRESS_SCHEMES: &str = "http|https";

impl RateLimitOptions {
    /// Validates a raw registration table, reporting every violation.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::new();

        let Some(table) = value.as_table() else {
            errors.wrong_type("value", "an object");
            return Err(errors);
        };

        let event = validate_event(table, &mut errors);
        let bucket_type = validate_type(table, &mut errors);
        let address = validate_address(table, &mut errors);
        let extract_key = validate_extract_key(table, &mut errors);
        let on_error = validate_on_error(table, &mut errors);
        let timeout = validate_timeout(table, &mut errors);

        for key in table.keys().filter(|key| !KEYS.contains(&key.as_str())) {
            errors.push(key.as_str(), format!("\"{key}\" is not allowed"));
        }

        match (event, bucket_type, address, extract_key) {
            (Some(event), Some(bucket_type), Some(address), Some(extract_key)) if errors.is_empty() => Ok(Self {
                event,
                bucket_type,
                address,
                extract_key,
                on_error,
                timeout,
            }),
            _ => Err(errors),
        }
    }
}

impl<'de> Deserialize<'de> for RateLimitOptions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

fn validate_event(table: &Table, errors: &mut ValidationError) -> Option<Phase> {
    let Some(value) = table.get("event") else {
        errors.required("event");
        return None;
    };

    let phase = value.as_str().and_then(Phase::from_name);

    if phase.is_none() {
        errors.one_of("event", &Phase::names());
    }

    phase
}

fn validate_type(table: &Table, errors: &mut ValidationError) -> Option<String> {
    let Some(value) = table.get("type") else {
        errors.required("type");
        return None;
    };

    match value.as_str() {
        Some("") => {
            errors.push("type", r#""type" is not allowed to be empty"#);
            None
        }
        Some(bucket_type) => Some(bucket_type.to_string()),
        None => {
            errors.wrong_type("type", "a string");
            None
        }
    }
}

fn validate_address(table: &Table, errors: &mut ValidationError) -> Option<Url> {
    let Some(value) = table.get("address") else {
        errors.required("address");
        return None;
    };

    match value {
        Value::String(address) => match Url::parse(address) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Some(url),
            _ => {
                errors.push(
                    "address",
                    format!(r#""address" must be a valid uri with a scheme matching the {ADDRESS_SCHEMES} pattern"#),
                );
                errors.wrong_type("address", "an object");
                None
            }
        },
        Value::Table(address) => validate_host_port(address, errors),
        _ => {
            errors.wrong_type("address", "a string");
            errors.wrong_type("address", "an object");
            None
        }
    }
}

fn validate_host_port(address: &Table, errors: &mut ValidationError) -> Option<Url> {
    let host = match address.get("host") {
        None => {
            errors.required("address.host");
            None
        }
        Some(Value::String(host)) if !host.is_empty() => Some(host.as_str()),
        Some(_) => {
            errors.wrong_type("address.host", "a non-empty string");
            None
        }
    };

    let port = match address.get("port") {
        None => {
            errors.required("address.port");
            None
        }
        Some(Value::Integer(port)) => match u16::try_from(*port) {
            Ok(port) if port > 0 => Some(port),
            _ => {
                errors.push("address.port", r#""port" must be a valid port"#);
                None
            }
        },
        Some(_) => {
            errors.wrong_type("address.port", "a number");
            None
        }
    };

    for key in address.keys().filter(|key| !matches!(key.as_str(), "host" | "port")) {
        errors.push(format!("address.{key}"), format!("\"{key}\" is not allowed"));
    }

    let (host, port) = (host?, port?);

    match Url::parse(&format!("http://{host}:{port}")) {
        Ok(url) => Some(url),
        Err(_) => {
            errors.push("address.host", r#""host" must be a valid hostname"#);
            None
        }
    }
}

fn validate_extract_key(table: &Table, errors: &mut ValidationError) -> Option<KeySource> {
    let Some(value) = table.get("extract_key") else {
        errors.required("extract_key");
        return None;
    };

    match value {
        Value::String(source) if source == "client_ip" => Some(KeySource::ClientIp),
        Value::String(_) => {
            errors.one_of("extract_key", &["client_ip"]);
            errors.wrong_type("extract_key", "an object");
            None
        }
        Value::Table(source) => validate_key_header(source, errors),
        _ => {
            errors.wrong_type("extract_key", "a string");
            errors.wrong_type("extract_key", "an object");
            None
        }
    }
}

fn validate_key_header(source: &Table, errors: &mut ValidationError) -> Option<KeySource> {
    for key in source.keys().filter(|key| key.as_str() != "http_header") {
        errors.push(format!("extract_key.{key}"), format!("\"{key}\" is not allowed"));
    }

    match source.get("http_header") {
        None => {
            errors.required("extract_key.http_header");
            None
        }
        Some(Value::String(name)) if http::HeaderName::from_bytes(name.as_bytes()).is_ok() => {
            Some(KeySource::HttpHeader(name.to_ascii_lowercase()))
        }
        Some(Value::String(_)) => {
            errors.push("extract_key.http_header", r#""http_header" must be a valid header name"#);
            None
        }
        Some(_) => {
            errors.wrong_type("extract_key.http_header", "a string");
            None
        }
    }
}

fn validate_on_error(table: &Table, errors: &mut ValidationError) -> OnQuotaError {
    match table.get("on_error").map(Value::as_str) {
        None => OnQuotaError::default(),
        Some(Some("continue")) => OnQuotaError::Continue,
        Some(Some("reject")) => OnQuotaError::Reject,
        Some(_) => {
            errors.one_of("on_error", ON_ERROR_VALUES);
            OnQuotaError::default()
        }
    }
}

fn validate_timeout(table: &Table, errors: &mut ValidationError) -> Option<Duration> {
    let value = table.get("timeout")?;

    match value.as_str().map(duration_str::parse) {
        Some(Ok(timeout)) if !timeout.is_zero() => Some(timeout),
        _ => {
            errors.push("timeout", r#""timeout" must be a valid duration"#);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::{assert_debug_snapshot, assert_snapshot};

    use super::*;

    fn validate(toml: &str) -> Result<RateLimitOptions, ValidationError> {
        let value: Value = toml::from_str(toml).unwrap();
        RateLimitOptions::from_value(&value)
    }

    fn messages(toml: &str) -> Vec<String> {
        validate(toml)
            .unwrap_err()
            .details()
            .iter()
            .map(|violation| violation.message.clone())
            .collect()
    }

    #[test]
    fn full_registration() {
        let options = validate(indoc! {r#"
            event = "onPostAuth"
            type = "user"
            address = "http://10.0.0.1:8090"
            extract_key = { http_header = "X-User-Id" }
            on_error = "reject"
            timeout = "250ms"
        "#})
        .unwrap();

        assert_debug_snapshot!(options, @r#"
        RateLimitOptions {
            event: OnPostAuth,
            bucket_type: "user",
            address: Url {
                scheme: "http",
                cannot_be_a_base: false,
                username: "",
                password: None,
                host: Some(
                    Ipv4(
                        10.0.0.1,
                    ),
                ),
                port: Some(
                    8090,
                ),
                path: "/",
                query: None,
                fragment: None,
            },
            extract_key: HttpHeader(
                "x-user-id",
            ),
            on_error: Reject,
            timeout: Some(
                250ms,
            ),
        }
        "#);
    }

    #[test]
    fn address_as_host_and_port() {
        let options = validate(indoc! {r#"
            event = "onRequest"
            type = "ip"
            address = { host = "limits.internal", port = 9231 }
            extract_key = "client_ip"
        "#})
        .unwrap();

        assert_eq!(options.address.as_str(), "http://limits.internal:9231/");
        assert_eq!(options.extract_key, KeySource::ClientIp);
        assert_eq!(options.on_error, OnQuotaError::Continue);
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn missing_event() {
        let messages = messages(indoc! {r#"
            type = "user"
            address = "http://10.0.0.1:8090"
            extract_key = "client_ip"
        "#});

        assert_eq!(messages, vec![r#""event" is required"#]);
    }

    #[test]
    fn invalid_event() {
        let messages = messages(indoc! {r#"
            event = "invalid"
            type = "user"
            address = "http://10.0.0.1:8090"
            extract_key = "client_ip"
        "#});

        assert_eq!(
            messages,
            vec![r#""event" must be one of [onRequest, onPreAuth, onPostAuth, onPreHandler]"#]
        );
    }

    #[test]
    fn missing_type() {
        let messages = messages(indoc! {r#"
            event = "onRequest"
            address = "http://10.0.0.1:8090"
            extract_key = "client_ip"
        "#});

        assert_eq!(messages, vec![r#""type" is required"#]);
    }

    #[test]
    fn type_of_wrong_type() {
        let messages = messages(indoc! {r#"
            event = "onRequest"
            type = 2
            address = "http://10.0.0.1:8090"
            extract_key = "client_ip"
        "#});

        assert_eq!(messages, vec![r#""type" must be a string"#]);
    }

    #[test]
    fn empty_type() {
        let messages = messages(indoc! {r#"
            event = "onRequest"
            type = ""
            address = "http://10.0.0.1:8090"
            extract_key = "client_ip"
        "#});

        assert_eq!(messages, vec![r#""type" is not allowed to be empty"#]);
    }

    #[test]
    fn missing_extract_key() {
        let messages = messages(indoc! {r#"
            event = "onRequest"
            type = "user"
            address = "http://10.0.0.1:8090"
        "#});

        assert_eq!(messages, vec![r#""extract_key" is required"#]);
    }

    #[test]
    fn extract_key_of_wrong_type() {
        let messages = messages(indoc! {r#"
            event = "onRequest"
            type = "user"
            address = "http://10.0.0.1:8090"
            extract_key = 12
        "#});

        assert_eq!(
            messages,
            vec![r#""extract_key" must be a string"#, r#""extract_key" must be an object"#]
        );
    }

    #[test]
    fn missing_address() {
        let messages = messages(indoc! {r#"
            event = "onRequest"
            type = "user"
            extract_key = "client_ip"
        "#});

        assert_eq!(messages, vec![r#""address" is required"#]);
    }

    #[test]
    fn address_as_number_reports_both_alternatives() {
        let messages = messages(indoc! {r#"
            event = "onRequest"
            type = "user"
            address = 1
            extract_key = "client_ip"
        "#});

        assert_eq!(
            messages,
            vec![r#""address" must be a string"#, r#""address" must be an object"#]
        );
    }

    #[test]
    fn address_with_wrong_scheme() {
        let messages = messages(indoc! {r#"
            event = "onRequest"
            type = "user"
            address = "ftp://example.com"
            extract_key = "client_ip"
        "#});

        assert_eq!(
            messages,
            vec![
                r#""address" must be a valid uri with a scheme matching the http|https pattern"#,
                r#""address" must be an object"#,
            ]
        );
    }

    #[test]
    fn every_violation_is_reported() {
        let error = validate(indoc! {r#"
            type = ""
            address = { port = 70000, tls = true }
            extract_key = { http_header = "bad header" }
            on_error = "explode"
            timeout = "soon"
            retries = 3
        "#})
        .unwrap_err();

        let rendered: Vec<_> = error
            .details()
            .iter()
            .map(|violation| format!("{}: {}", violation.path, violation.message))
            .collect();

        assert_debug_snapshot!(rendered, @r#"
        [
            "event: \"event\" is required",
            "type: \"type\" is not allowed to be empty",
            "address.host: \"host\" is required",
            "address.port: \"port\" must be a valid port",
            "address.tls: \"tls\" is not allowed",
            "extract_key.http_header: \"http_header\" must be a valid header name",
            "on_error: \"on_error\" must be one of [continue, reject]",
            "timeout: \"timeout\" must be a valid duration",
            "retries: \"retries\" is not allowed",
        ]
        "#);
    }

    #[test]
    fn display_joins_messages() {
        let error = validate(indoc! {r#"
            event = "onRequest"
            address = "http://10.0.0.1:8090"
        "#})
        .unwrap_err();

        assert_snapshot!(error, @r#""type" is required. "extract_key" is required"#);
    }

    #[test]
    fn phases_are_ordered() {
        let mut phases = vec![Phase::OnPreHandler, Phase::OnRequest, Phase::OnPostAuth, Phase::OnPreAuth];
        phases.sort();

        assert_eq!(phases, Phase::ALL.to_vec());
    }
}
