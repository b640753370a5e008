// =============================================================================
// SIGNED COOKIES
// =============================================================================
// The service keeps no server-side session. The two pieces of per-visitor
// state travel in cookies signed with SECRET_KEY:
//
// - `csrf_token`: random token that POST / must echo in a hidden field
// - `flash`:      the notification to show once after a redirect
//
// Cookie format: `<value>.<hex HMAC-SHA256(name "=" value)>`. Binding the
// cookie name into the MAC stops a valid value being replayed under the
// other cookie.
// =============================================================================

use axum::http::{header::COOKIE, HeaderMap};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::models::Notification;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const FLASH_COOKIE: &str = "flash";

// -----------------------------------------------------------------------------
// SIGNER
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct CookieSigner {
    key: Vec<u8>,
}

impl CookieSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, name: &str, value: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(name.as_bytes());
        mac.update(b"=");
        mac.update(value.as_bytes());
        Some(mac)
    }

    /// `value.signature`, or `None` if the key is unusable.
    pub fn sign(&self, name: &str, value: &str) -> Option<String> {
        let signature = self.mac(name, value)?.finalize().into_bytes();
        Some(format!("{}.{}", value, hex::encode(signature)))
    }

    /// Returns the value if the signature matches, comparing in constant time.
    pub fn verify(&self, name: &str, signed: &str) -> Option<String> {
        let (value, signature) = signed.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;

        self.mac(name, value)?.verify_slice(&signature).ok()?;
        Some(value.to_string())
    }

    // -------------------------------------------------------------------------
    // CSRF
    // -------------------------------------------------------------------------

    /// The visitor's current CSRF token, if the cookie is present and intact.
    pub fn csrf_token(&self, headers: &HeaderMap) -> Option<String> {
        let signed = read_cookie(headers, CSRF_COOKIE)?;
        self.verify(CSRF_COOKIE, &signed)
    }

    // -------------------------------------------------------------------------
    // FLASH
    // -------------------------------------------------------------------------

    /// Signed cookie value carrying `notification` (hex-encoded JSON).
    pub fn encode_flash(&self, notification: &Notification) -> Option<String> {
        let json = serde_json::to_vec(notification).ok()?;
        self.sign(FLASH_COOKIE, &hex::encode(json))
    }

    /// The pending notification, if any. Tampered cookies are ignored.
    pub fn read_flash(&self, headers: &HeaderMap) -> Option<Notification> {
        let signed = read_cookie(headers, FLASH_COOKIE)?;

        let Some(payload) = self.verify(FLASH_COOKIE, &signed) else {
            debug!("Discarding flash cookie with a bad signature");
            return None;
        };

        let json = hex::decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

// =============================================================================
// COOKIE HEADERS
// =============================================================================

/// A fresh random CSRF token.
pub fn new_csrf_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Finds `name` across every `Cookie` request header.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for a session cookie scoped to the whole site.
pub fn set_cookie(name: &str, value: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, value)
}

/// `Set-Cookie` value that deletes `name`.
pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", name)
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn verifies_own_signature() {
        let signer = CookieSigner::new("key");
        let signed = signer.sign(CSRF_COOKIE, "abc123").unwrap();

        assert_eq!(signer.verify(CSRF_COOKIE, &signed).as_deref(), Some("abc123"));
    }

    #[test]
    fn rejects_tampering_other_keys_and_other_cookie_names() {
        let signer = CookieSigner::new("key");
        let signed = signer.sign(CSRF_COOKIE, "abc123").unwrap();
        let (_, signature) = signed.rsplit_once('.').unwrap();

        assert!(signer.verify(CSRF_COOKIE, &format!("abc124.{}", signature)).is_none());
        assert!(CookieSigner::new("other").verify(CSRF_COOKIE, &signed).is_none());
        assert!(signer.verify(FLASH_COOKIE, &signed).is_none());
        assert!(signer.verify(CSRF_COOKIE, "abc123").is_none());
        assert!(signer.verify(CSRF_COOKIE, "abc123.zz").is_none());
    }

    #[test]
    fn reads_cookie_among_several() {
        let headers = headers_with("theme=dark; csrf_token=t.sig;flash=x");

        assert_eq!(read_cookie(&headers, "csrf_token").as_deref(), Some("t.sig"));
        assert_eq!(read_cookie(&headers, "flash").as_deref(), Some("x"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn flash_survives_the_cookie_round_trip() {
        let signer = CookieSigner::new("key");
        let notification = Notification::received("Ann");

        let value = signer.encode_flash(&notification).unwrap();
        let headers = headers_with(&format!("{}={}", FLASH_COOKIE, value));

        assert_eq!(signer.read_flash(&headers), Some(notification));
    }

    #[test]
    fn forged_flash_is_ignored() {
        let forged = hex::encode(br#"{"kind":"success","message":"<script>"}"#);
        let headers = headers_with(&format!("flash={}.00", forged));

        assert!(CookieSigner::new("key").read_flash(&headers).is_none());
    }

    #[test]
    fn csrf_token_requires_valid_signature() {
        let signer = CookieSigner::new("key");
        let token = new_csrf_token();
        let signed = signer.sign(CSRF_COOKIE, &token).unwrap();

        let good = headers_with(&format!("csrf_token={}", signed));
        let bad = headers_with(&format!("csrf_token={}.00", token));

        assert_eq!(signer.csrf_token(&good), Some(token));
        assert_eq!(signer.csrf_token(&bad), None);
    }
}
