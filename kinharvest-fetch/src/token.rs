//! Anti-forgery token and embedded-payload extraction.
//!
//! Vendors embed the values this client needs (CSRF tokens, profile lists,
//! an app-version object) inside HTML or inline JavaScript. Each known
//! shape gets a [`TokenKind`]; extraction is a pure function over the body.
//! A missing marker means the site markup changed, which is fatal to the
//! caller rather than retryable.

use std::sync::LazyLock;

use kinharvest_core::ParseError;
use regex::Regex;

/// The embedded payload shapes this extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Django CSRF middleware token: `name="csrfmiddlewaretoken" value="…"`.
    CsrfMiddlewareToken,
    /// Profile list JSON embedded in the 23andMe account page, inside a
    /// `new exports.quickInviteModal([…],"…")` call.
    ProfileJson,
    /// App-version object embedded in the AncestryDNA landing page as a
    /// `var dna … = {…};` JavaScript literal.
    DnaAppVersion,
}

static CSRF_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="csrfmiddlewaretoken" value="([^"]+)""#).expect("static regex")
});

static PROFILE_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"new exports\.quickInviteModal\((\[\{.*?\}\]),"[0-9a-f]{16}"\)"#)
        .expect("static regex")
});

static DNA_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)var dna.*?=\s*(.*?);").expect("static regex"));

static DNA_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z0-9]*) ?: ?(\{|'|true|false|!1)").expect("static regex")
});

static DNA_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*.*?\*/").expect("static regex"));

static DNA_SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'").expect("static regex"));

/// Extracts the payload for `kind` from a response body.
pub fn extract(body: &str, kind: TokenKind) -> Result<String, ParseError> {
    match kind {
        TokenKind::CsrfMiddlewareToken => capture(&CSRF_TOKEN, body, "csrfmiddlewaretoken"),
        TokenKind::ProfileJson => capture(&PROFILE_JSON, body, "quickInviteModal profile list"),
        TokenKind::DnaAppVersion => extract_dna_version(body),
    }
}

fn capture(regex: &Regex, body: &str, marker: &'static str) -> Result<String, ParseError> {
    regex
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::MissingMarker { marker })
}

/// Pulls the `app.version` field out of the inline `var dna` object.
///
/// The object is JavaScript, not JSON: property names are bare, strings are
/// single-quoted, and comments may appear inside. It is normalized into
/// JSON before decoding, the same chain of rewrites the portal's own pages
/// survive.
fn extract_dna_version(body: &str) -> Result<String, ParseError> {
    const MARKER: &str = "var dna app version";

    let object = capture(&DNA_VAR, body, MARKER)?;
    let object = DNA_PROPERTY.replace_all(&object, "\"$1\": $2");
    let object = DNA_COMMENT.replace_all(&object, "");
    let object = DNA_SINGLE_QUOTED.replace_all(&object, "\"$1\"");

    let value: serde_json::Value = serde_json::from_str(&object)
        .map_err(|e| ParseError::malformed(MARKER, e.to_string()))?;

    value
        .pointer("/app/version")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ParseError::malformed(MARKER, "no app.version field"))
}
