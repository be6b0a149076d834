//! Language detection and filtering for rendered article content.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use regex::Regex;
use tracing::debug;
use url::Url;
use whatlang::Lang;

/// CJK Unified Ideograph ranges counted by the script heuristic.
const CJK_RANGES: &[(u32, u32)] = &[
    (0x4E00, 0x9FFF),
    (0x3400, 0x4DBF),
    (0x20000, 0x2A6DF),
    (0x2A700, 0x2B73F),
    (0x2B740, 0x2B81F),
    (0x2B820, 0x2CEAF),
    (0xF900, 0xFAFF),
    (0x3300, 0x33FF),
    (0xFE30, 0xFE4F),
    (0x2F800, 0x2FA1F),
];

/// Minimum cleaned-text length before detection is attempted.
const MIN_DETECTABLE_LEN: usize = 10;

/// Decides whether an article's language is in the configured allow-set.
pub struct LanguageFilter {
    supported: HashSet<String>,
    stats: Mutex<BTreeMap<String, u64>>,
    url_re: Regex,
    email_re: Regex,
    noise_re: Regex,
    space_re: Regex,
}

impl LanguageFilter {
    pub fn new(supported_languages: &[String]) -> Self {
        let supported = supported_languages
            .iter()
            .map(|code| normalize_code(code))
            .collect();
        Self {
            supported,
            stats: Mutex::new(BTreeMap::new()),
            url_re: Regex::new(r"https?://\S+").expect("static regex"),
            email_re: Regex::new(r"\S+@\S+").expect("static regex"),
            noise_re: Regex::new(r#"[0-9\[\](){}.,;:!?"'\-]+"#).expect("static regex"),
            space_re: Regex::new(r"\s+").expect("static regex"),
        }
    }

    /// Detect the language of `content`. The URL host is the strongest
    /// signal; the statistical detector and the script heuristic follow.
    pub fn detect(&self, content: &str, url: &str) -> String {
        if content.trim().is_empty() {
            return "unknown".into();
        }
        if let Some(code) = language_from_url(url) {
            debug!(code, "Language detected from URL");
            return code;
        }
        let cleaned = self.clean_for_detection(content);
        if cleaned.chars().count() < MIN_DETECTABLE_LEN {
            return "unknown".into();
        }
        if let Some(info) = whatlang::detect(&cleaned) {
            if info.is_reliable() {
                let code = lang_code(info.lang());
                debug!(code, confidence = info.confidence(), "Language detected statistically");
                return code;
            }
        }
        self.detect_by_script(&cleaned)
    }

    /// Whether a detected code is in the allow-set, after normalization.
    pub fn is_supported(&self, code: &str) -> bool {
        self.supported.contains(&normalize_code(code))
    }

    /// Returns `(accept, detected_code)`. Content in an unsupported language
    /// is rejected, except that an `unknown` detection is accepted when the
    /// URL itself implies a supported language.
    pub fn filter(&self, content: &str, url: &str) -> (bool, String) {
        let mut detected = self.detect(content, url);
        {
            let mut stats = self.stats.lock().expect("language stats lock poisoned");
            *stats.entry(detected.clone()).or_default() += 1;
        }
        let mut accept = self.is_supported(&detected);
        if !accept && detected == "unknown" {
            if let Some(url_code) = language_from_url(url) {
                if self.is_supported(&url_code) {
                    accept = true;
                    detected = url_code;
                    debug!(code = %detected, "Accepted on supported wiki host despite unknown detection");
                }
            }
        }
        (accept, detected)
    }

    /// Histogram of every detection made so far, keyed by code.
    pub fn language_stats(&self) -> BTreeMap<String, u64> {
        self.stats.lock().expect("language stats lock poisoned").clone()
    }

    fn clean_for_detection(&self, content: &str) -> String {
        let cleaned = self.url_re.replace_all(content, "");
        let cleaned = self.email_re.replace_all(&cleaned, "");
        let cleaned = self.noise_re.replace_all(&cleaned, " ");
        let cleaned = self.space_re.replace_all(&cleaned, " ");
        cleaned.trim().to_string()
    }

    /// Character-class fallback: CJK >= 10% of scripted characters is
    /// Chinese, Latin >= 80% is English, anything else stays unknown.
    fn detect_by_script(&self, cleaned: &str) -> String {
        let mut cjk = 0usize;
        let mut latin = 0usize;
        for c in cleaned.chars() {
            let point = c as u32;
            if CJK_RANGES.iter().any(|(lo, hi)| (*lo..=*hi).contains(&point)) {
                cjk += 1;
            } else if c.is_ascii_alphabetic() {
                latin += 1;
            }
        }
        let total = cjk + latin;
        if total == 0 {
            return "unknown".into();
        }
        let cjk_share = cjk as f64 / total as f64;
        let latin_share = latin as f64 / total as f64;
        if cjk_share > 0.1 {
            "zh".into()
        } else if latin_share > 0.8 {
            "en".into()
        } else {
            "unknown".into()
        }
    }
}

/// Wikipedia host to language code, for the hosts this crawler targets.
fn language_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    match host.as_str() {
        "en.wikipedia.org" => Some("en".into()),
        "zh.wikipedia.org" => Some("zh".into()),
        "zh-cn.wikipedia.org" => Some("zh-cn".into()),
        "zh-tw.wikipedia.org" => Some("zh-tw".into()),
        _ => None,
    }
}

/// Map the detector's language onto the codes the config speaks.
fn lang_code(lang: Lang) -> String {
    match lang {
        Lang::Eng => "en".into(),
        Lang::Cmn => "zh".into(),
        Lang::Jpn => "ja".into(),
        Lang::Kor => "ko".into(),
        Lang::Fra => "fr".into(),
        Lang::Deu => "de".into(),
        Lang::Spa => "es".into(),
        Lang::Rus => "ru".into(),
        other => other.code().to_string(),
    }
}

/// Normalize the aliases users put in config against detector output.
fn normalize_code(code: &str) -> String {
    let code = code.trim().to_lowercase();
    match code.as_str() {
        "chinese" | "mandarin" => "zh".into(),
        "english" => "en".into(),
        "zh-hans" | "zh-sg" | "zh-my" => "zh-cn".into(),
        "zh-hant" => "zh-tw".into(),
        _ => code,
    }
}
