//! Redaction policy for captured values
//!
//! Decides whether a value must be left out of a snapshot because of the name
//! it is bound to (variable, argument, hash key, field) or because of its type.

use std::collections::HashSet;
use tracepin_config::RedactionConfig;
use tracepin_core::Value;

/// Identifiers that are always redacted, in normalized form
pub const DEFAULT_REDACTED_IDENTIFIERS: &[&str] = &[
    "2fa",
    "accesstoken",
    "address",
    "aiohttpsession",
    "apikey",
    "apisecret",
    "apisignature",
    "applicationkey",
    "auth",
    "authorization",
    "authtoken",
    "ccnumber",
    "certificatepin",
    "cipher",
    "clientid",
    "clientsecret",
    "connectionstring",
    "connectsid",
    "cookie",
    "credentials",
    "creditcard",
    "csrf",
    "csrftoken",
    "cvv",
    "databaseurl",
    "dburl",
    "encryptionkey",
    "encryptionkeyid",
    "geolocation",
    "gpgkey",
    "ipaddress",
    "jti",
    "jwt",
    "licensekey",
    "masterkey",
    "mysqlpwd",
    "nonce",
    "oauth",
    "oauthtoken",
    "otp",
    "passhash",
    "passwd",
    "password",
    "passwordb",
    "pemfile",
    "pgpkey",
    "phpsessid",
    "pin",
    "pincode",
    "pkcs8",
    "privatekey",
    "publickey",
    "pwd",
    "recaptchakey",
    "refreshtoken",
    "routingnumber",
    "salt",
    "secret",
    "secretkey",
    "secrettoken",
    "securityanswer",
    "securitycode",
    "securityquestion",
    "serviceaccountcredentials",
    "session",
    "sessionid",
    "sessionkey",
    "setcookie",
    "signature",
    "signaturekey",
    "sshkey",
    "ssn",
    "symfony",
    "token",
    "transactionid",
    "twiliotoken",
    "usersession",
    "voterid",
    "xapikey",
    "xauthtoken",
    "xcsrftoken",
    "xforwardedfor",
    "xrealip",
    "xsrf",
    "xsrftoken",
];

/// Namespace separator accepted as an anchor in type patterns
const NAMESPACE_SEPARATOR: &str = "::";

/// Characters removed from identifiers before comparison
fn is_ignored_identifier_char(c: char) -> bool {
    matches!(c, '_' | '-' | '@' | '$')
}

/// Lowercase and drop `_ - @ $`. Any other punctuation is kept, so it still
/// breaks a match.
pub fn normalize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| !is_ignored_identifier_char(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TypePattern {
    Exact(String),
    Prefix(String),
}

impl TypePattern {
    fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        let pattern = pattern.strip_prefix(NAMESPACE_SEPARATOR).unwrap_or(pattern);
        match pattern.strip_suffix('*') {
            Some(prefix) if !prefix.is_empty() => Some(TypePattern::Prefix(prefix.to_string())),
            Some(_) => None,
            None if pattern.is_empty() => None,
            None => Some(TypePattern::Exact(pattern.to_string())),
        }
    }
}

/// Redaction policy built from the built-in list plus configuration
#[derive(Debug, Clone)]
pub struct Redactor {
    identifiers: HashSet<String>,
    type_patterns: Vec<TypePattern>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(&RedactionConfig::default())
    }
}

impl Redactor {
    pub fn new(config: &RedactionConfig) -> Self {
        let identifiers = DEFAULT_REDACTED_IDENTIFIERS
            .iter()
            .map(|s| s.to_string())
            .chain(
                config
                    .redacted_identifiers
                    .iter()
                    .map(|s| normalize_identifier(s)),
            )
            .filter(|s| !s.is_empty())
            .collect();

        let type_patterns = config
            .redacted_type_names
            .iter()
            .filter_map(|p| TypePattern::parse(p))
            .collect();

        Self {
            identifiers,
            type_patterns,
        }
    }

    /// True when a value bound to `name` must not be captured
    pub fn should_redact_identifier(&self, name: &str) -> bool {
        self.identifiers.contains(&normalize_identifier(name))
    }

    /// True when `value`'s runtime type is on the redaction list
    pub fn should_redact_type(&self, value: &Value) -> bool {
        if self.type_patterns.is_empty() {
            return false;
        }
        let type_name = value.type_name();
        self.redacts_type_name(&type_name, value.is_builtin())
    }

    /// Match a type name against the configured patterns.
    ///
    /// Built-in types only match exact entries: `S*` never redacts `String`.
    pub fn redacts_type_name(&self, type_name: &str, builtin: bool) -> bool {
        let type_name = type_name
            .strip_prefix(NAMESPACE_SEPARATOR)
            .unwrap_or(type_name);
        self.type_patterns.iter().any(|pattern| match pattern {
            TypePattern::Exact(exact) => exact == type_name,
            TypePattern::Prefix(prefix) => !builtin && type_name.starts_with(prefix.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracepin_core::ObjectValue;

    fn redactor(identifiers: &[&str], types: &[&str]) -> Redactor {
        Redactor::new(&RedactionConfig {
            redacted_identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
            redacted_type_names: types.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_builtin_identifiers() {
        let r = Redactor::default();
        assert!(r.should_redact_identifier("password"));
        assert!(r.should_redact_identifier("Password"));
        assert!(r.should_redact_identifier("@password"));
        assert!(r.should_redact_identifier("api_key"));
        assert!(r.should_redact_identifier("X-Api-Key"));
        assert!(r.should_redact_identifier("$secret"));
        assert!(!r.should_redact_identifier("username"));
    }

    #[test]
    fn test_unstrippable_punctuation_breaks_match() {
        let r = Redactor::default();
        assert!(!r.should_redact_identifier("pass/word"));
        assert!(!r.should_redact_identifier("pass.word"));
    }

    #[test]
    fn test_configured_identifiers_are_normalized() {
        let r = redactor(&["@Card_Holder"], &[]);
        assert!(r.should_redact_identifier("cardholder"));
        assert!(r.should_redact_identifier("@card_holder"));
        assert!(r.should_redact_identifier("CARD-HOLDER"));
    }

    #[test]
    fn test_exact_type_pattern() {
        let r = redactor(&[], &["Billing::Card"]);
        let card = ObjectValue::new("Billing::Card").into_value();
        let other = ObjectValue::new("Billing::CardHolder").into_value();
        assert!(r.should_redact_type(&card));
        assert!(!r.should_redact_type(&other));
    }

    #[test]
    fn test_prefix_type_pattern() {
        let r = redactor(&[], &["Foo*"]);
        assert!(r.redacts_type_name("Foo", false));
        assert!(r.redacts_type_name("FooBar", false));
        assert!(r.redacts_type_name("Foo::Bar", false));
        assert!(!r.redacts_type_name("Bar::Foo", false));
    }

    #[test]
    fn test_anchored_type_pattern() {
        let r = redactor(&[], &["::Secrets::Vault"]);
        assert!(r.redacts_type_name("Secrets::Vault", false));
        assert!(!r.redacts_type_name("App::Secrets::Vault", false));
    }

    #[test]
    fn test_builtin_types_need_exact_entry() {
        let wildcard = redactor(&[], &["S*"]);
        assert!(!wildcard.should_redact_type(&Value::string("x")));
        assert!(!wildcard.should_redact_type(&Value::symbol("x")));

        let exact = redactor(&[], &["String"]);
        assert!(exact.should_redact_type(&Value::string("x")));
        assert!(!exact.should_redact_type(&Value::symbol("x")));
    }

    #[test]
    fn test_degenerate_patterns_ignored() {
        let r = redactor(&[], &["*", "", "::"]);
        assert!(!r.redacts_type_name("Anything", false));
    }
}
