//! # Text Sanitizer
//!
//! Cleans untrusted free text (nicknames, chat comments, gift names, target
//! identifiers) before it crosses the network boundary or reaches a display
//! surface.
//!
//! ## Pipeline (applied in this order):
//! 1.  **Entity decoding**: `&lt; &gt; &amp; &quot; &#x27; &#x2F;` and numeric
//!     entities (`&#N;` and `&#xH;`) become literal characters.
//! 2.  **Control stripping**: `U+0000–U+001F` and `U+007F–U+009F` are removed.
//! 3.  **Invisible stripping**: general punctuation spaces and marks
//!     (`U+2000–U+200F`), line/paragraph separators, bidi embeddings, overrides
//!     and isolates, the `U+2060–U+206F` invisibles and the BOM are removed.
//! 4.  **Replacement**: anything outside printable ASCII, `U+00A0–U+D7FF` and
//!     `U+E000–U+FFFD` becomes `?`.
//! 5.  **Whitespace**: runs collapse to one space, ends are trimmed.
//!
//! Decoding must come first, otherwise `&#x202E;` would smuggle a bidi override
//! past step 3. Steps 1 to 4 run together in one left-to-right scan: every
//! character, read or decoded, is filtered as it is appended, and a `;` that
//! completes an entity at the tail of the output decodes it in place. Nested
//! (`&amp;amp;lt;`) and spliced (`&a\u{200B}mp;lt;`) entities therefore
//! resolve without re-running the pipeline, in time linear in the input.

#![forbid(unsafe_code)]

/// Named entities recognised by the decoder, checked before numeric forms.
const NAMED_ENTITIES: [(&str, char); 6] = [
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&amp;", '&'),
    ("&quot;", '"'),
    ("&#x27;", '\''),
    ("&#x2F;", '/'),
];

/// Longest numeric entity body we are willing to scan for a `;` (`&#x10FFFF;`).
const MAX_NUMERIC_ENTITY_LEN: usize = 10;

/// Longest entity, `&#` plus body plus `;`, that can end at the output tail.
const MAX_ENTITY_LEN: usize = 2 + MAX_NUMERIC_ENTITY_LEN + 1;

/// Sanitizes `input` according to the module-level pipeline.
///
/// Total and pure: never fails, never panics, and
/// `sanitize(&sanitize(x)) == sanitize(x)` for every input.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        append(&mut out, c, true);
    }
    collapse_whitespace(&out)
}

/// Optional-input form: absent values stay absent.
pub fn sanitize_opt(input: Option<&str>) -> Option<String> {
    input.map(sanitize)
}

/// Decodes the fixed entity set, including entities that only appear once an
/// inner one is decoded (`&amp;lt;` becomes `<`).
///
/// Unknown entities, malformed numeric entities and numeric entities naming an
/// invalid code point (surrogates, values above `U+10FFFF`) are left as-is.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        append(&mut out, c, false);
    }
    out
}

/// Appends `c` to `out`, dropping or replacing it first when `filter` is set.
/// When the appended `;` closes an entity, the entity is swapped for its
/// character, which is appended the same way.
fn append(out: &mut String, c: char, filter: bool) {
    let mut next = Some(c);
    while let Some(c) = next.take() {
        if filter && (is_control(c) || is_invisible(c)) {
            return;
        }
        out.push(if !filter || is_displayable(c) { c } else { '?' });
        if c == ';' {
            next = decode_tail_entity(out);
        }
    }
}

/// Replaces an entity ending at the tail of `out` and returns its character.
fn decode_tail_entity(out: &mut String) -> Option<char> {
    let back = out
        .bytes()
        .rev()
        .take(MAX_ENTITY_LEN)
        .position(|b| b == b'&')?;
    let amp = out.len() - 1 - back;
    let (ch, consumed) = decode_entity_at(&out[amp..])?;
    if amp + consumed != out.len() {
        return None;
    }
    out.truncate(amp);
    Some(ch)
}

/// Tries to decode one entity at the start of `tail` (which begins with `&`).
/// Returns the decoded character and the number of bytes consumed.
fn decode_entity_at(tail: &str) -> Option<(char, usize)> {
    for (entity, ch) in NAMED_ENTITIES {
        if tail.starts_with(entity) {
            return Some((ch, entity.len()));
        }
    }

    let body = tail.strip_prefix("&#")?;
    let end = body
        .bytes()
        .take(MAX_NUMERIC_ENTITY_LEN + 1)
        .position(|b| b == b';')?;
    let digits = &body[..end];

    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            u32::from_str_radix(hex, 16).ok()?
        }
        None => {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse::<u32>().ok()?
        }
    };

    char::from_u32(code).map(|ch| (ch, "&#".len() + end + 1))
}

fn is_control(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        // spaces, zero-width chars and directional marks
        '\u{2000}'..='\u{200F}'
            // line/paragraph separators and bidi embeddings/overrides
            | '\u{2028}'..='\u{202E}'
            // word joiner, invisible operators, bidi isolates
            | '\u{2060}'..='\u{206F}'
            | '\u{FEFF}'
    )
}

fn is_displayable(c: char) -> bool {
    matches!(
        c,
        '\u{0020}'..='\u{007E}' | '\u{00A0}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}'
    )
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inputs chosen to poke at every stage of the pipeline.
    fn adversarial_inputs() -> Vec<String> {
        vec![
            String::new(),
            "   ".to_string(),
            "plain text".to_string(),
            "hi&amp;bye".to_string(),
            "&amp;lt;script&amp;gt;".to_string(),
            "&#x202E;abc".to_string(),
            "&#8238;abc".to_string(),
            "a&#0;b".to_string(),
            "&a\u{200B}mp;lt;".to_string(),
            "&\u{0000}#60;".to_string(),
            "tab\tand\nnewline".to_string(),
            "\u{200B}\u{200B}".to_string(),
            "bidi \u{2066}isolate\u{2069} and \u{202E}override".to_string(),
            "emoji \u{1F600} here".to_string(),
            "private \u{E000} use \u{FFFD} ok".to_string(),
            "nbsp\u{00A0}\u{00A0}run".to_string(),
            "&#55296;".to_string(),
            "&#99999999999;".to_string(),
            "&#x;&#;&;".to_string(),
            "\u{0085}\u{009F}mixed\u{007F}".to_string(),
            "&#xFEFF;bom".to_string(),
        ]
    }

    fn in_forbidden_range(c: char) -> bool {
        is_control(c) || is_invisible(c) || !is_displayable(c)
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for input in adversarial_inputs() {
            let once = sanitize(&input);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_sanitize_output_has_no_forbidden_code_points() {
        for input in adversarial_inputs() {
            let out = sanitize(&input);
            assert!(
                !out.chars().any(in_forbidden_range),
                "forbidden code point survived in {:?} -> {:?}",
                input,
                out
            );
        }
    }

    #[test]
    fn test_entity_decoded_before_bidi_strip() {
        assert_eq!(sanitize("&#x202E;abc"), "abc");
        assert_eq!(sanitize("&#8238;abc"), "abc");
    }

    #[test]
    fn test_named_entities_decode() {
        assert_eq!(sanitize("hi&amp;bye"), "hi&bye");
        assert_eq!(sanitize("&lt;b&gt; &quot;x&quot; it&#x27;s a&#x2F;b"), "<b> \"x\" it's a/b");
        assert_eq!(sanitize("&#65;&#x42;"), "AB");
    }

    #[test]
    fn test_unknown_and_invalid_entities_are_kept() {
        assert_eq!(decode_html_entities("&nbsp; &#55296; &#x;"), "&nbsp; &#55296; &#x;");
        assert_eq!(sanitize("fish &chips"), "fish &chips");
    }

    #[test]
    fn test_control_characters_are_removed_not_spaced() {
        assert_eq!(sanitize("tab\tand\nnewline"), "tabandnewline");
        assert_eq!(sanitize("a\u{0007}b\u{0090}c"), "abc");
    }

    #[test]
    fn test_zero_width_only_becomes_empty() {
        assert_eq!(sanitize("\u{200B}\u{200B}"), "");
        assert_eq!(sanitize("\u{FEFF}\u{2060}\u{200D}"), "");
    }

    #[test]
    fn test_out_of_range_replaced_with_question_mark() {
        assert_eq!(sanitize("emoji \u{1F600} here"), "emoji ? here");
        assert_eq!(sanitize("\u{FFFE}"), "?");
    }

    #[test]
    fn test_latin_and_cjk_pass_through() {
        assert_eq!(sanitize("Grüße 你好 안녕"), "Grüße 你好 안녕");
    }

    #[test]
    fn test_whitespace_collapsed_and_trimmed() {
        assert_eq!(sanitize("  many    spaces\u{00A0}\u{00A0}here  "), "many spaces here");
    }

    #[test]
    fn test_spliced_entity_reaches_fixed_point() {
        // "&a<ZWSP>mp;lt;" -> "&amp;lt;" -> "&lt;" -> "<"
        assert_eq!(sanitize("&a\u{200B}mp;lt;"), "<");
        assert_eq!(sanitize("&&#97;mp;lt;"), "<");
        assert_eq!(sanitize("&amp&#59;gt;"), ">");
    }

    #[test]
    fn test_nested_entities_decode_in_linear_time() {
        let input = format!("&{}lt;", "amp;".repeat(16_000));
        assert!(input.len() > 64_000);

        let started = std::time::Instant::now();
        assert_eq!(sanitize(&input), "<");
        assert!(
            started.elapsed() < std::time::Duration::from_secs(1),
            "sanitizing {} bytes took {:?}",
            input.len(),
            started.elapsed()
        );
        assert_eq!(decode_html_entities("&amp;amp;lt;"), "<");
    }

    #[test]
    fn test_sanitize_opt_keeps_absence() {
        assert_eq!(sanitize_opt(None), None);
        assert_eq!(sanitize_opt(Some(" x ")), Some("x".to_string()));
    }
}
