//! Extraction ciblée de valeurs de balises XML
//!
//! Les réponses TR-064 ont une forme connue et étroite : plutôt qu'un parseur
//! XML complet, on repère la première paire `<tag>` / `</tag>` et on renvoie
//! le texte compris entre les deux. Toute la lecture des réponses passe par
//! ce module, ce qui permet de le remplacer par un vrai parseur sans toucher
//! aux appelants.
//!
//! Les balises imbriquées portant le même nom ne sont pas supportées : seule
//! la première paire trouvée est utilisée.

use tracing::trace;

/// Extracts the content of the first `<tag>...</tag>` pair found in `source`.
///
/// When `case_sensitive` is false, matching is done on ASCII-lowercased
/// copies of both strings, but the returned slice always comes from the
/// original `source`, so the casing of the content is preserved.
///
/// Returns `None` when either the opening or the closing marker is absent.
pub fn extract_tag<'a>(source: &'a str, tag: &str, case_sensitive: bool) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    // ASCII lowercasing keeps byte offsets identical to `source`
    let lowered;
    let (haystack, open, close) = if case_sensitive {
        (source, open, close)
    } else {
        lowered = source.to_ascii_lowercase();
        (
            lowered.as_str(),
            open.to_ascii_lowercase(),
            close.to_ascii_lowercase(),
        )
    };

    let start = haystack.find(&open)? + open.len();
    let stop = start + haystack[start..].find(&close)?;

    Some(&source[start..stop])
}

/// Case-sensitive lookup with a single case-insensitive retry.
///
/// Some routers are not consistent with the casing of their tags
/// (`<NewSSID>` vs `<NewSsid>`); the fallback is attempted exactly once.
pub fn take_tag<'a>(source: &'a str, tag: &str) -> Option<&'a str> {
    if tag.is_empty() {
        return None;
    }

    extract_tag(source, tag, true).or_else(|| {
        trace!(tag, "Tag not found case-sensitively, retrying case-insensitive");
        extract_tag(source, tag, false)
    })
}

/// Same as [`take_tag`] but returns an owned value, empty when absent.
pub fn take_tag_or_default(source: &str, tag: &str) -> String {
    take_tag(source, tag).map(str::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_round_trip() {
        let cases = [
            ("", "NewSSID", "MyNetwork", ""),
            ("<s:Body>", "Nonce", "F758BE72FB999CEA", "</s:Body>"),
            ("leading text ", "empty", "", " trailing"),
            ("<a>", "b", "value with spaces & stuff", "</a>"),
        ];

        for (prefix, tag, value, suffix) in cases {
            let source = format!("{prefix}<{tag}>{value}</{tag}>{suffix}");
            assert_eq!(extract_tag(&source, tag, true), Some(value));
            assert_eq!(take_tag(&source, tag), Some(value));
        }
    }

    #[test]
    fn test_tag_at_start_of_source() {
        // Position 0 must count as found
        assert_eq!(extract_tag("<Nonce>abc</Nonce>", "Nonce", true), Some("abc"));
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let source = "<TAG>x</TAG>";
        assert_eq!(extract_tag(source, "tag", true), None);
        assert_eq!(extract_tag(source, "tag", false), Some("x"));
        assert_eq!(take_tag(source, "tag"), Some("x"));
    }

    #[test]
    fn test_insensitive_preserves_content_case() {
        let source = "<newssid>My Fritz!Box WLAN</NEWSSID>";
        assert_eq!(take_tag(source, "NewSSID"), Some("My Fritz!Box WLAN"));
    }

    #[test]
    fn test_missing_markers() {
        assert_eq!(take_tag("<Nonce>abc", "Nonce"), None);
        assert_eq!(take_tag("abc</Nonce>", "Nonce"), None);
        assert_eq!(take_tag("nothing here", "Nonce"), None);
        assert_eq!(take_tag("<Nonce>abc</Nonce>", ""), None);
    }

    #[test]
    fn test_closing_before_opening_is_ignored() {
        let source = "</Realm>junk<Realm>F!Box SOAP-Auth</Realm>";
        assert_eq!(take_tag(source, "Realm"), Some("F!Box SOAP-Auth"));
    }

    #[test]
    fn test_first_pair_wins() {
        let source = "<v>1</v><v>2</v>";
        assert_eq!(take_tag(source, "v"), Some("1"));
    }

    #[test]
    fn test_non_ascii_content() {
        let source = "<NewSSID>Café Ünïcode</NewSSID>";
        assert_eq!(take_tag(source, "newssid"), Some("Café Ünïcode"));
        assert_eq!(take_tag_or_default(source, "Missing"), "");
    }
}
