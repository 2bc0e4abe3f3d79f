//! Cache-key sanitization.

/// Linux NAME_MAX minus room for the lock-file prefix and suffix.
const KEY_MAX: usize = 240;

/// Sanitizes a candidate cache key so it is a single, visible file name.
///
/// - Replaces NUL, `/`, `\`, whitespace and control characters with `_`
/// - Collapses consecutive underscores
/// - Strips leading dots (the cache dir reserves dot-files for locks and temps)
///   and trailing dots/underscores
/// - Percent-decoding is not attempted; `%` is kept verbatim
pub fn sanitize_cache_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c == '/' || c == '\\' || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out
        .trim_start_matches(['.', '_'])
        .trim_end_matches(['.', '_']);

    let mut take = trimmed.len().min(KEY_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}
