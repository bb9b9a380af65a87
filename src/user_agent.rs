//! Mobile to desktop User-Agent translation.
//!
//! The desktop site is only served to desktop browsers, so requests for it
//! need a desktop User-Agent. A hard-coded one doesn't work: bot detection
//! compares the claimed browser version against the TLS fingerprint of the
//! real client. Instead we rewrite the OS clause of the real User-Agent and
//! keep every version number as-is.

use regex::Regex;
use std::sync::LazyLock;

/// OS clause substituted for the mobile one.
const DESKTOP_OS: &str = "X11; Linux x86_64";

/// A browser family: a pattern with named spans and what to put in each.
struct Family {
    pattern: Regex,
    replacements: &'static [(&'static str, &'static str)],
}

/// Families in priority order. The first one that matches wins.
static FAMILIES: LazyLock<Vec<Family>> = LazyLock::new(|| {
    vec![
        // Mozilla/5.0 (Android 15; Mobile; rv:145.0) Gecko/145.0 Firefox/145.0
        Family {
            pattern: Regex::new(
                r"Mozilla/[0-9.]+ \((?<os_version>[^)]*?; Mobile); [^)]*?\) (?<gecko_version>Gecko/[0-9.]+) Firefox/[0-9.]+",
            )
            .unwrap(),
            replacements: &[("os_version", DESKTOP_OS), ("gecko_version", "Gecko/20100101")],
        },
        // Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Mobile Safari/537.36
        Family {
            pattern: Regex::new(
                r"Mozilla/[0-9.]+ \((?<os_version>[^)]*?)\) AppleWebKit/[0-9.]+ \(KHTML, like Gecko\) Chrome/[0-9.]+(?<mobile_tag> Mobile) Safari/[0-9.]+",
            )
            .unwrap(),
            replacements: &[("os_version", DESKTOP_OS), ("mobile_tag", "")],
        },
    ]
});

/// Translates a mobile browser's User-Agent into the desktop equivalent.
///
/// Returns `None` when the string isn't a known mobile signature, which
/// includes User-Agents that are already desktop ones.
pub fn desktop_user_agent(user_agent: &str) -> Option<String> {
    FAMILIES
        .iter()
        .find_map(|family| substitute_named(user_agent, &family.pattern, family.replacements))
}

/// Matches `pattern` once and replaces the named capture spans.
///
/// Spans are spliced from the last to the first so that replacing one never
/// shifts the offsets of those still pending.
fn substitute_named(input: &str, pattern: &Regex, replacements: &[(&str, &str)]) -> Option<String> {
    let caps = pattern.captures(input)?;

    let mut spans: Vec<(std::ops::Range<usize>, &str)> = replacements
        .iter()
        .filter_map(|(name, replacement)| caps.name(name).map(|m| (m.range(), *replacement)))
        .collect();
    spans.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));

    let mut output = input.to_string();
    for (range, replacement) in spans {
        output.replace_range(range, replacement);
    }

    Some(output)
}
