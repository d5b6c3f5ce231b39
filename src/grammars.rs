use std::sync::LazyLock;

use regex::Regex;

pub const STRICT_BOOL_PATTERN: &str = r"^(?:true|false)$";
pub const LDAP_SUFFIX_PATTERN: &str = r"^dc=[a-z0-9_-]+(?:,dc=[a-z0-9_-]+)*$";
pub const LISTEN_ADDRESS_PATTERN: &str = r"^(?:[0-9.]+|\[[0-9a-f:]+\]):[0-9]+$";
pub const POSIX_ACCOUNT_NAME_PATTERN: &str = r"^[a-z_][a-z0-9_-]*\$?$";

/// A format that a configuration value must satisfy.
#[derive(Debug)]
pub struct ValueFormat {
    pub pattern: &'static str,
    pub description: &'static str,
    regex: &'static LazyLock<Regex>,
}

impl ValueFormat {
    #[must_use]
    pub fn matches(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

static STRICT_BOOL_RX: LazyLock<Regex> = LazyLock::new(|| compile(STRICT_BOOL_PATTERN));
static LDAP_SUFFIX_RX: LazyLock<Regex> = LazyLock::new(|| compile(LDAP_SUFFIX_PATTERN));
static LISTEN_ADDRESS_RX: LazyLock<Regex> = LazyLock::new(|| compile(LISTEN_ADDRESS_PATTERN));
static POSIX_ACCOUNT_NAME_RX: LazyLock<Regex> =
    LazyLock::new(|| compile(POSIX_ACCOUNT_NAME_PATTERN));

pub static STRICT_BOOL: ValueFormat = ValueFormat {
    pattern: STRICT_BOOL_PATTERN,
    description: r#"either "true" or "false""#,
    regex: &STRICT_BOOL_RX,
};

pub static LDAP_SUFFIX: ValueFormat = ValueFormat {
    pattern: LDAP_SUFFIX_PATTERN,
    description: "an RDN with only dc= components",
    regex: &LDAP_SUFFIX_RX,
};

pub static LISTEN_ADDRESS: ValueFormat = ValueFormat {
    pattern: LISTEN_ADDRESS_PATTERN,
    description: r#"a listen address like "1.2.3.4:80" or "[::1]:8080""#,
    regex: &LISTEN_ADDRESS_RX,
};

pub static POSIX_ACCOUNT_NAME: ValueFormat = ValueFormat {
    pattern: POSIX_ACCOUNT_NAME_PATTERN,
    description: "a POSIX account name (see `man 8 useradd` for format description)",
    regex: &POSIX_ACCOUNT_NAME_RX,
};

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    // patterns are compile-time constants covered by the tests below
    Regex::new(pattern).expect("static grammar pattern must compile")
}
