//! HTTP Digest Authentication (RFC 2617).
//!
//! Parses `WWW-Authenticate: Digest` challenges and computes the matching
//! `Authorization` header value.
//!
//! ## Supported Features
//! - MD5 (also used when the challenge names no algorithm)
//! - MD5-sess (session-keyed HA1)
//! - qop=auth (quality of protection)
//!
//! The nonce count is not tracked across requests: every response is computed
//! with `nc=00000001` unless the caller supplies another count.

use crate::base::neterror::NetError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use boring::hash::{hash, MessageDigest};
use std::collections::HashMap;
use std::fmt::Write;

/// Scheme prefix every digest challenge must start with.
const DIGEST_PREFIX: &str = "Digest ";

/// Digest authentication algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// Unspecified - defaults to MD5
    #[default]
    Unspecified,
    /// MD5
    Md5,
    /// MD5-sess (session-based)
    Md5Sess,
}

impl DigestAlgorithm {
    /// Parse algorithm from the challenge value. Matching is case-sensitive.
    pub fn from_challenge(s: &str) -> Option<Self> {
        match s {
            "" => Some(Self::Unspecified),
            "MD5" => Some(Self::Md5),
            "MD5-sess" => Some(Self::Md5Sess),
            _ => None,
        }
    }

    /// Check if this is a session-based algorithm.
    fn is_session(&self) -> bool {
        matches!(self, Self::Md5Sess)
    }
}

/// A parsed `WWW-Authenticate: Digest` challenge.
///
/// Values are kept verbatim; `algorithm` and `qop` are only validated when a
/// response is computed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub domain: String,
    pub nonce: String,
    pub opaque: String,
    pub stale: String,
    pub algorithm: String,
    /// Comma-joined list of offered qop values, e.g. `auth,auth-int`.
    pub qop: String,
}

/// Per-request inputs to the response computation.
#[derive(Debug, Clone, Default)]
pub struct DigestInput {
    pub username: String,
    pub password: String,
    /// Request-URI as sent on the request line.
    pub digest_uri: String,
    pub method: String,
    /// Client nonce. Empty means one is generated.
    pub cnonce: String,
    /// Hexadecimal count of requests sent with this nonce. Zero is treated as 1.
    pub nonce_count: u32,
}

impl Challenge {
    /// Parse a raw `WWW-Authenticate` header value.
    ///
    /// # Example
    /// ```
    /// use digestnet::http::digestauth::Challenge;
    ///
    /// let challenge = Challenge::parse(
    ///     r#"Digest qop="auth",algorithm=MD5,realm="monero-rpc",nonce="abc",stale=false"#,
    /// ).unwrap();
    /// assert_eq!(challenge.realm, "monero-rpc");
    /// assert_eq!(challenge.algorithm, "MD5");
    /// ```
    pub fn parse(header: &str) -> Result<Self, NetError> {
        let rest = header
            .trim()
            .strip_prefix(DIGEST_PREFIX)
            .ok_or(NetError::MalformedChallenge)?;

        let mut params = parse_params(rest);
        let mut take = |key: &str| params.remove(key).unwrap_or_default();

        Ok(Self {
            realm: take("realm"),
            domain: take("domain"),
            nonce: take("nonce"),
            opaque: take("opaque"),
            stale: take("stale"),
            algorithm: take("algorithm"),
            qop: take("qop"),
        })
    }

    /// Check if this challenge indicates stale credentials (nonce expired).
    pub fn is_stale(&self) -> bool {
        self.stale.eq_ignore_ascii_case("true")
    }

    /// Whether the server offers `qop=auth`, the only mode implemented.
    ///
    /// Deliberately relaxed: list items are trimmed before comparison, so
    /// `qop="auth-int, auth"` counts as offering `auth`.
    pub fn offers_auth(&self) -> bool {
        self.qop.split(',').any(|qop| qop.trim() == "auth")
    }

    /// Serialize the recognised fields back into a `WWW-Authenticate` value.
    ///
    /// Empty fields are omitted. Parsing the result yields an equal challenge.
    pub fn to_header(&self) -> String {
        let fields = [
            ("realm", &self.realm),
            ("domain", &self.domain),
            ("nonce", &self.nonce),
            ("opaque", &self.opaque),
            ("stale", &self.stale),
            ("algorithm", &self.algorithm),
            ("qop", &self.qop),
        ];

        let params: Vec<String> = fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{}={}", key, quote(value)))
            .collect();

        format!("{}{}", DIGEST_PREFIX, params.join(", "))
    }

    /// Compute the `Authorization` header value for one request.
    ///
    /// Fails with [`NetError::UnsupportedQop`] unless `auth` is offered, and
    /// with [`NetError::UnsupportedAlgorithm`] for anything but MD5/MD5-sess.
    pub fn digest(&self, input: &DigestInput) -> Result<String, NetError> {
        let nonce_count = input.nonce_count.max(1);

        if !self.offers_auth() {
            return Err(NetError::UnsupportedQop);
        }

        self.digest_auth(input, nonce_count)
    }

    fn digest_auth(&self, input: &DigestInput, nonce_count: u32) -> Result<String, NetError> {
        let nc = format!("{:08x}", nonce_count);

        let ha1 = self.ha1(input, &nc)?;
        let ha2 = md5_hex(&format!("{}:{}", input.method, input.digest_uri))?;

        let cnonce = if input.cnonce.is_empty() {
            generate_cnonce()?
        } else {
            input.cnonce.clone()
        };

        let response = md5_hex(&format!(
            "{}:{}:{}:{}:auth:{}",
            ha1, self.nonce, nc, cnonce, ha2
        ))?;

        Ok(self.assemble_credentials(input, &response, &cnonce, &nc))
    }

    /// HA1 = H(user:realm:password), re-keyed with the nonce for MD5-sess.
    fn ha1(&self, input: &DigestInput, nc: &str) -> Result<String, NetError> {
        let algorithm =
            DigestAlgorithm::from_challenge(&self.algorithm).ok_or(NetError::UnsupportedAlgorithm)?;

        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            input.username, self.realm, input.password
        ))?;

        if algorithm.is_session() {
            md5_hex(&format!("{}:{}:{}", ha1, self.nonce, nc))
        } else {
            Ok(ha1)
        }
    }

    /// Field order is fixed; servers and tests compare it literally.
    fn assemble_credentials(
        &self,
        input: &DigestInput,
        response: &str,
        cnonce: &str,
        nc: &str,
    ) -> String {
        let mut auth = format!(
            "Digest username={}, realm={}, nonce={}, uri={}, cnonce={}, nc={}, qop=auth, response={}, algorithm={}",
            quote(&input.username),
            quote(&self.realm),
            quote(&self.nonce),
            quote(&input.digest_uri),
            quote(cnonce),
            nc,
            quote(response),
            quote(&self.algorithm),
        );

        if !self.opaque.is_empty() {
            auth.push_str(&format!(", opaque={}", quote(&self.opaque)));
        }

        auth
    }
}

/// Split the parameter list of a challenge into key/value pairs.
///
/// A `"` only opens or closes a quoted section when it is preceded by an even
/// number of backslashes; commas inside a quoted section belong to the value.
fn parse_params(raw: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut quoted = false;
    let mut backslashes = 0usize;

    for c in raw.chars() {
        if !in_value {
            if c == '=' {
                in_value = true;
            } else {
                key.push(c);
            }
            continue;
        }

        match c {
            '"' => {
                if backslashes % 2 == 0 {
                    quoted = !quoted;
                }
                value.push(c);
                backslashes = 0;
            }
            '\\' => {
                backslashes += 1;
                value.push(c);
            }
            ',' if quoted => value.push(c),
            ',' => {
                store_param(&mut params, &key, &value);
                key.clear();
                value.clear();
                in_value = false;
                quoted = false;
                backslashes = 0;
            }
            _ => {
                backslashes = 0;
                value.push(c);
            }
        }
    }

    if !key.is_empty() {
        store_param(&mut params, &key, &value);
    }

    params
}

fn store_param(params: &mut HashMap<String, String>, key: &str, value: &str) {
    let value = if value.starts_with('"') {
        // A broken quoted string yields an empty value rather than an error.
        unquote(value).unwrap_or_default()
    } else {
        value.trim().to_string()
    };
    params.insert(key.trim().to_string(), value);
}

/// Remove surrounding double quotes and resolve backslash escapes.
///
/// Returns `None` when the input is not exactly one well-formed quoted string.
fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out: Vec<u8> = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\n' => return None,
            '\\' => {
                let escaped = chars.next()?;
                match escaped {
                    '"' => out.push(b'"'),
                    '\\' => out.push(b'\\'),
                    'a' => out.push(0x07),
                    'b' => out.push(0x08),
                    'f' => out.push(0x0c),
                    'n' => out.push(b'\n'),
                    'r' => out.push(b'\r'),
                    't' => out.push(b'\t'),
                    'v' => out.push(0x0b),
                    'x' => {
                        let hex: String = chars.by_ref().take(2).collect();
                        if hex.len() != 2 {
                            return None;
                        }
                        out.push(u8::from_str_radix(&hex, 16).ok()?);
                    }
                    'u' | 'U' => {
                        let width = if escaped == 'u' { 4 } else { 8 };
                        let hex: String = chars.by_ref().take(width).collect();
                        if hex.len() != width {
                            return None;
                        }
                        let scalar = char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?;
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(scalar.encode_utf8(&mut buf).as_bytes());
                    }
                    '0'..='7' => {
                        let rest: String = chars.by_ref().take(2).collect();
                        if rest.len() != 2 {
                            return None;
                        }
                        let octal = format!("{}{}", escaped, rest);
                        let byte = u32::from_str_radix(&octal, 8).ok()?;
                        out.push(u8::try_from(byte).ok()?);
                    }
                    _ => return None,
                }
            }
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    String::from_utf8(out).ok()
}

/// Wrap a value in double quotes with backslash escapes.
///
/// ASCII controls become `\xNN` or their short form, other unprintable
/// characters `\uNNNN` or `\UNNNNNNNN`. The output always unquotes back to
/// the input.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0b}' => out.push_str("\\v"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if !is_printable(c) => {
                let _ = if (c as u32) < 0x10000 {
                    write!(out, "\\u{:04x}", c as u32)
                } else {
                    write!(out, "\\U{:08x}", c as u32)
                };
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Printable outside ASCII: not a control, separator, format or private-use
/// character.
fn is_printable(c: char) -> bool {
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    !matches!(
        c as u32,
        0x00ad
            | 0x0600..=0x0605
            | 0x061c
            | 0x06dd
            | 0x070f
            | 0x180e
            | 0x200b..=0x200f
            | 0x202a..=0x202e
            | 0x2060..=0x2064
            | 0x2066..=0x206f
            | 0xe000..=0xf8ff
            | 0xfeff
            | 0xfff9..=0xfffb
            | 0xfffe..=0xffff
            | 0xf0000..
    )
}

/// Lowercase hex MD5 of `input`.
pub fn md5_hex(input: &str) -> Result<String, NetError> {
    let digest = hash(MessageDigest::md5(), input.as_bytes())
        .map_err(|_| NetError::UnexpectedSecurityLibraryStatus)?;
    Ok(to_hex(&digest))
}

/// Generate a random client nonce.
///
/// 16 random bytes, hex encoded, and that hex string base64 encoded.
pub fn generate_cnonce() -> Result<String, NetError> {
    let mut buf = [0u8; 16];
    boring::rand::rand_bytes(&mut buf).map_err(|_| NetError::UnexpectedSecurityLibraryStatus)?;
    Ok(BASE64.encode(to_hex(&buf)))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}
