//! Glob matching for `KEYS`.
//!
//! Follows the server's pattern dialect: `*` matches any run, `?` one byte,
//! `[...]` a class (`^` negates, `a-z` ranges, reversed ranges are swapped),
//! and `\x` matches `x` literally. An unterminated class extends to the end
//! of the pattern. Matching is byte-wise over the full key.

/// Returns true when `key` matches `pattern` in full.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    match_bytes(pattern.as_bytes(), key.as_bytes())
}

fn match_bytes(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;
    // Last `*` seen and the text offset it currently absorbs up to.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let next = match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some(b'?') => Some(p + 1),
            Some(b'[') => match_class(pattern, p + 1, text[t]),
            Some(b'\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(p + 2),
            Some(&literal) => (literal == text[t]).then_some(p + 1),
            None => None,
        };

        match (next, star) {
            (Some(next), _) => {
                p = next;
                t += 1;
            }
            (None, Some((star_p, star_t))) => {
                star = Some((star_p, star_t + 1));
                p = star_p + 1;
                t = star_t + 1;
            }
            (None, None) => return false,
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

/// Tests `byte` against the class starting at `start` (just past `[`).
///
/// Returns the pattern index after the class on a match.
fn match_class(pattern: &[u8], start: usize, byte: u8) -> Option<usize> {
    let mut i = start;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    let end = loop {
        match pattern.get(i) {
            None => break pattern.len(),
            Some(b']') => break i + 1,
            Some(b'\\') if i + 1 < pattern.len() => {
                matched |= pattern[i + 1] == byte;
                i += 2;
            }
            Some(&lo) if i + 2 < pattern.len() && pattern[i + 1] == b'-' => {
                let hi = pattern[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                matched |= (lo..=hi).contains(&byte);
                i += 3;
            }
            Some(&literal) => {
                matched |= literal == byte;
                i += 1;
            }
        }
    };

    (matched != negate).then_some(end)
}
