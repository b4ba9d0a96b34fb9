//! JID helpers.
//!
//! The web protocol speaks the legacy `c.us` user server on the wire while
//! the rest of the ecosystem uses `s.whatsapp.net`; contacts handed to callers
//! are normalised to the latter.

/// Rewrite the first `@c.us` in `jid` to `@s.whatsapp.net`.
pub fn normalize_user_jid(jid: &str) -> String {
    jid.replacen("@c.us", "@s.whatsapp.net", 1)
}
