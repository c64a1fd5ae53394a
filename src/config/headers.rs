//! HTTP header name constants.
//!
//! Header names inspected or injected by the probe battery.

// Security header names checked by the header hygiene probe
/// Content Security Policy header
pub const HEADER_CONTENT_SECURITY_POLICY: &str = "Content-Security-Policy";
/// HTTP Strict Transport Security header
pub const HEADER_STRICT_TRANSPORT_SECURITY: &str = "Strict-Transport-Security";
/// X-Content-Type-Options header
pub const HEADER_X_CONTENT_TYPE_OPTIONS: &str = "X-Content-Type-Options";
/// X-Frame-Options header
pub const HEADER_X_FRAME_OPTIONS: &str = "X-Frame-Options";

/// Security headers an API response must carry.
///
/// HSTS is only required for `https` targets and is checked separately.
pub const REQUIRED_SECURITY_HEADERS: &[&str] =
    &[HEADER_X_CONTENT_TYPE_OPTIONS, HEADER_X_FRAME_OPTIONS];

/// Headers that leak server implementation details when present.
pub const DISCLOSURE_HEADERS: &[&str] = &["Server", "X-Powered-By", "X-AspNet-Version"];

// Request headers used by the auth probes
/// Authorization header, stripped by the auth probes
pub const HEADER_AUTHORIZATION: &str = "Authorization";
/// Cookie header, stripped by the auth probes
pub const HEADER_COOKIE: &str = "Cookie";

/// Routing and origin-spoofing headers tried by the auth bypass probe.
///
/// Servers that trust these for access decisions grant unauthenticated access.
pub const BYPASS_HEADERS: &[(&str, &str)] = &[
    ("X-Forwarded-For", "127.0.0.1"),
    ("X-Real-IP", "127.0.0.1"),
    ("X-Original-URL", "/"),
    ("X-Rewrite-URL", "/"),
    ("X-Custom-IP-Authorization", "127.0.0.1"),
];
