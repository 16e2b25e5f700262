//! Small helpers shared across the protocol engines.

/// Alphabet for opaque identifiers: URL-safe, unambiguous, exactly 64 symbols
/// so a random byte maps to a symbol without modulo bias.
const OPAQUE_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

/// Generate a cryptographically random opaque identifier of `len` symbols.
///
/// Used for authorization codes (13), session/user ids and federation state
/// (25).
pub fn random_opaque(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
    bytes
        .iter()
        .map(|b| OPAQUE_ALPHABET[(b & 0x3f) as usize] as char)
        .collect()
}

/// Browser/OS fingerprint recorded on sessions so users can recognise them
/// on the session management page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub browser: Option<String>,
    pub os: Option<String>,
}

impl Fingerprint {
    /// Best-effort classification of a User-Agent header value.
    pub fn from_user_agent(ua: &str) -> Self {
        let browser = if ua.contains("Edg/") || ua.contains("Edge/") {
            Some("Edge")
        } else if ua.contains("OPR/") || ua.contains("Opera") {
            Some("Opera")
        } else if ua.contains("Firefox/") {
            Some("Firefox")
        } else if ua.contains("Chrome/") {
            Some("Chrome")
        } else if ua.contains("Safari/") {
            Some("Safari")
        } else {
            None
        };

        let os = if ua.contains("Windows") {
            Some("Windows")
        } else if ua.contains("Android") {
            Some("Android")
        } else if ua.contains("iPhone") || ua.contains("iPad") {
            Some("iOS")
        } else if ua.contains("Mac OS") {
            Some("macOS")
        } else if ua.contains("Linux") {
            Some("Linux")
        } else {
            None
        };

        Self {
            browser: browser.map(String::from),
            os: os.map(String::from),
        }
    }
}

/// Normalize a caller-supplied redirect URI before allow-list matching:
/// surrounding whitespace and a trailing slash are insignificant.
pub fn normalize_redirect_uri(uri: &str) -> String {
    uri.trim().trim_end_matches('/').to_string()
}
