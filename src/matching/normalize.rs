//! Channel name normalization
//!
//! Deterministic, idempotent canonicalization used by the normalized and
//! fuzzy matching tiers. The steps mirror how IPTV channel lists decorate
//! names: bracketed segments, quality/category markers, spacing and script
//! variants all collapse away so "CCTV-1 高清" and "CCTV1" compare equal.

use regex::Regex;
use std::sync::OnceLock;

/// Bracketed segments, covering ASCII and full-width bracket variants.
fn bracket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\[【(（].*?[\]】)）]").unwrap())
}

/// Quality/category tokens removed case-insensitively.
fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(HD|1080p|720p|4K|UHD|FHD|超清|高清|直播|卫视|衛視|电视台|電視台|CCTV)")
            .unwrap()
    })
}

/// Localized digit words mapped to ASCII digits.
const DIGIT_WORDS: [(char, char); 11] = [
    ('一', '1'),
    ('壹', '1'),
    ('二', '2'),
    ('三', '3'),
    ('四', '4'),
    ('五', '5'),
    ('六', '6'),
    ('七', '7'),
    ('八', '8'),
    ('九', '9'),
    ('零', '0'),
];

/// Best-effort traditional-to-simplified mapping for characters common in
/// channel names. Unmapped characters pass through unchanged.
const T2S_TABLE: [(char, char); 24] = [
    ('電', '电'),
    ('視', '视'),
    ('臺', '台'),
    ('衛', '卫'),
    ('體', '体'),
    ('頻', '频'),
    ('華', '华'),
    ('東', '东'),
    ('廣', '广'),
    ('國', '国'),
    ('際', '际'),
    ('聞', '闻'),
    ('財', '财'),
    ('經', '经'),
    ('劇', '剧'),
    ('樂', '乐'),
    ('兒', '儿'),
    ('鳳', '凤'),
    ('灣', '湾'),
    ('綜', '综'),
    ('藝', '艺'),
    ('數', '数'),
    ('紀', '纪'),
    ('錄', '录'),
];

/// Normalize a channel display name for near-exact and fuzzy comparison.
///
/// Idempotent: `normalize_name(normalize_name(x)) == normalize_name(x)`.
/// Empty input yields empty output.
pub fn normalize_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    // Any step can expose input for an earlier one: stripping separators
    // turns "H D" into "HD", the t2s mapping turns "衛視" into the token
    // "卫视". Iterate the whole chain until stable so one call always
    // reaches the same fixed point a second call would.
    let mut current = name.to_string();
    loop {
        let next = normalize_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

/// One pass of the transform chain: brackets, tokens, separators, case,
/// digit words, script folding.
fn normalize_pass(name: &str) -> String {
    let stripped = bracket_pattern().replace_all(name, "");
    let stripped = token_pattern().replace_all(&stripped, "");

    stripped
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '_' | '/'))
        .flat_map(|c| c.to_lowercase())
        .map(|c| {
            DIGIT_WORDS
                .iter()
                .chain(T2S_TABLE.iter())
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect()
}
