//! URL utilities for player script discovery and signed media URLs

use crate::error::CipherError;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;

/// Platform origin used to resolve relative script paths
pub const PLATFORM_BASE_URL: &str = "https://www.youtube.com";

static JS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""jsUrl"\s*:\s*"([^"]+)""#).expect("valid jsUrl regex"));

/// Extract the player script URL from a watch page.
///
/// Relative paths are resolved against `base`.
pub fn extract_script_url(html: &str, base: &str) -> Result<String> {
    let raw = JS_URL
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace("\\/", "/"))
        .ok_or_else(|| CipherError::NotFound("player script URL not found in page".to_string()))?;

    let base = Url::parse(base)?;
    Ok(base.join(&raw)?.to_string())
}

/// The components of a `signatureCipher` blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCipher {
    /// Media URL without its signature
    pub url: String,
    /// Raw, still-scrambled signature
    pub signature: String,
    /// Query parameter the resolved signature goes into
    pub sp: String,
}

impl SignatureCipher {
    pub fn parse(blob: &str) -> Result<Self> {
        let params: HashMap<String, String> = url::form_urlencoded::parse(blob.as_bytes())
            .into_owned()
            .collect();

        let url = params
            .get("url")
            .cloned()
            .ok_or_else(|| CipherError::InvalidUrl("signature cipher has no url".to_string()))?;
        let signature = params
            .get("s")
            .cloned()
            .ok_or_else(|| CipherError::InvalidUrl("signature cipher has no s".to_string()))?;
        let sp = params
            .get("sp")
            .filter(|sp| !sp.is_empty())
            .cloned()
            .unwrap_or_else(|| "sig".to_string());

        Ok(Self { url, signature, sp })
    }
}

/// Set `key` to `value` in `url`, replacing any existing occurrences
pub fn set_query_param(url: &str, key: &str, value: &str) -> Result<String> {
    let mut parsed = Url::parse(url)?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(key, value);
    }

    Ok(parsed.to_string())
}

/// First value of query parameter `key`
pub fn query_param(url: &str, key: &str) -> Result<Option<String>> {
    let parsed = Url::parse(url)?;
    Ok(parsed
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_script_url_relative() {
        let html = r#"<script>ytcfg.set({"jsUrl":"\/s\/player\/abc123\/player_ias.vflset\/en_US\/base.js","x":1})</script>"#;
        assert_eq!(
            extract_script_url(html, PLATFORM_BASE_URL).unwrap(),
            "https://www.youtube.com/s/player/abc123/player_ias.vflset/en_US/base.js"
        );
    }

    #[test]
    fn test_extract_script_url_absolute() {
        let html = r#"{"jsUrl":"https://cdn.example.com/base.js"}"#;
        assert_eq!(
            extract_script_url(html, PLATFORM_BASE_URL).unwrap(),
            "https://cdn.example.com/base.js"
        );
    }

    #[test]
    fn test_extract_script_url_missing() {
        let err = extract_script_url("<html></html>", PLATFORM_BASE_URL).unwrap_err();
        assert!(matches!(err, CipherError::NotFound(_)));
    }

    #[test]
    fn test_signature_cipher_parse() {
        let blob = "s=AB%3DCD&sp=signature&url=https%3A%2F%2Fr1.example.com%2Fvideoplayback%3Fitag%3D18";
        let cipher = SignatureCipher::parse(blob).unwrap();
        assert_eq!(cipher.signature, "AB=CD");
        assert_eq!(cipher.sp, "signature");
        assert_eq!(cipher.url, "https://r1.example.com/videoplayback?itag=18");
    }

    #[test]
    fn test_signature_cipher_defaults_sp() {
        let cipher = SignatureCipher::parse("s=abc&url=https%3A%2F%2Fexample.com%2Fv").unwrap();
        assert_eq!(cipher.sp, "sig");
        assert!(SignatureCipher::parse("s=abc").is_err());
        assert!(SignatureCipher::parse("url=https%3A%2F%2Fexample.com").is_err());
    }

    #[test]
    fn test_set_query_param() {
        let url = "https://example.com/videoplayback?itag=18&sig=old&n=xyz";
        let updated = set_query_param(url, "sig", "new").unwrap();
        assert_eq!(query_param(&updated, "sig").unwrap().as_deref(), Some("new"));
        assert_eq!(query_param(&updated, "itag").unwrap().as_deref(), Some("18"));
        assert_eq!(updated.matches("sig=").count(), 1);

        let added = set_query_param("https://example.com/v", "n", "abc").unwrap();
        assert_eq!(added, "https://example.com/v?n=abc");
    }

    #[test]
    fn test_query_param_missing() {
        assert_eq!(query_param("https://example.com/v?a=1", "n").unwrap(), None);
        assert!(query_param("not a url", "n").is_err());
    }
}
