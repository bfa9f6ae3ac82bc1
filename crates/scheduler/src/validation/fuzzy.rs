//! Levenshtein matching for "did you mean" timezone suggestions.

use chrono_tz::TZ_VARIANTS;

/// Closest IANA zone name to `input`. Exact case-insensitive matches win;
/// otherwise the nearest name within half the input length.
pub(super) fn suggest_timezone(input: &str) -> Option<&'static str> {
    if input.is_empty() {
        return None;
    }
    if let Some(tz) = TZ_VARIANTS.iter().find(|tz| tz.name().eq_ignore_ascii_case(input)) {
        return Some(tz.name());
    }

    let input_lower = input.to_lowercase();
    let mut best: Option<(&'static str, usize)> = None;
    for tz in TZ_VARIANTS.iter() {
        let name = tz.name();
        let dist = levenshtein(&input_lower, &name.to_lowercase());
        match best {
            None => best = Some((name, dist)),
            Some((_, best_dist)) if dist < best_dist => best = Some((name, dist)),
            _ => {}
        }
    }

    best.and_then(|(name, dist)| {
        let max_len = input.len().max(name.len());
        if dist <= max_len / 2 {
            Some(name)
        } else {
            None
        }
    })
}

/// Levenshtein edit distance between two strings.
pub(super) fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
