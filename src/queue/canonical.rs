//! URL canonicalization used for dedup equality.

use url::Url;

/// Toggles controlling how far canonicalization goes. All on by default.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CanonicalOptions {
    /// Master switch; when off, URLs compare byte-for-byte.
    pub normalize_urls: bool,
    pub remove_fragments: bool,
    pub sort_query_params: bool,
}

impl Default for CanonicalOptions {
    fn default() -> Self {
        Self {
            normalize_urls: true,
            remove_fragments: true,
            sort_query_params: true,
        }
    }
}

impl CanonicalOptions {
    /// Reduce a URL to its canonical form. Unparseable input is returned
    /// trimmed but otherwise untouched, so it still participates in dedup.
    pub fn canonicalize(&self, url: &str) -> String {
        let trimmed = url.trim();
        if !self.normalize_urls {
            return trimmed.to_string();
        }
        let mut parsed = match Url::parse(trimmed) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(url = trimmed, %err, "URL does not parse, keeping as-is");
                return trimmed.to_string();
            }
        };

        // Url::parse already lowercases scheme and host. Trailing slashes on
        // non-root paths are stripped so /wiki/Foo/ and /wiki/Foo collide.
        let path = parsed.path().to_string();
        if path != "/" && path.ends_with('/') {
            parsed.set_path(path.trim_end_matches('/'));
        }

        if self.sort_query_params {
            if parsed.query().is_some() {
                let mut pairs: Vec<(String, String)> = parsed
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                pairs.sort();
                if pairs.is_empty() {
                    parsed.set_query(None);
                } else {
                    let query = pairs
                        .iter()
                        .map(|(k, v)| {
                            if v.is_empty() {
                                k.clone()
                            } else {
                                format!("{k}={v}")
                            }
                        })
                        .collect::<Vec<_>>()
                        .join("&");
                    parsed.set_query(Some(&query));
                }
            }
        }

        if self.remove_fragments {
            parsed.set_fragment(None);
        }

        parsed.to_string()
    }
}
