// url.rs - URL Extraction
// Finds the first link in a chat message that points at a path on some host.

use once_cell::sync::Lazy;
use regex::Regex;

// scheme://host.tld/ followed by anything up to whitespace or a closing angle bracket
static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+\.+[a-z]{2,6}/[^>\s]*").expect("URL regex is valid"));

/// Return the first URL in `text`, unchanged, or `None` if there isn't one.
pub fn find_media_url(text: &str) -> Option<&str> {
    URL_REGEX.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_inside_sentence() {
        let text = "check this out http://example.com/watch?v=1 lol";
        assert_eq!(find_media_url(text), Some("http://example.com/watch?v=1"));
    }

    #[test]
    fn test_first_url_wins() {
        let text = "https://a.example.org/one and https://b.example.org/two";
        assert_eq!(find_media_url(text), Some("https://a.example.org/one"));
    }

    #[test]
    fn test_no_url() {
        assert_eq!(find_media_url("no links here"), None);
        assert_eq!(find_media_url(""), None);
    }

    #[test]
    fn test_url_requires_path() {
        assert_eq!(find_media_url("see https://example.com for more"), None);
        assert_eq!(
            find_media_url("see https://example.com/ for more"),
            Some("https://example.com/")
        );
    }

    #[test]
    fn test_url_split_by_whitespace_is_ignored() {
        assert_eq!(find_media_url("https://exam ple.com/video"), None);
        assert_eq!(find_media_url("https:// example.com/video"), None);
    }

    #[test]
    fn test_angle_bracket_suppressed_embed() {
        let text = "<https://www.youtube.com/watch?v=dQw4w9WgXcQ>";
        assert_eq!(
            find_media_url(text),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_multiline_message() {
        let text = "first line\nhttps://vm.tiktok.com/ZM123abc/\nthird line";
        assert_eq!(find_media_url(text), Some("https://vm.tiktok.com/ZM123abc/"));
    }
}
