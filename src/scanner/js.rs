// Deciding whether a `/` in JavaScript starts a regexp literal or a
// division operator.

/// Keywords that can directly precede a regexp literal.
const REGEX_PRECEDER_KEYWORDS: &[&str] = &[
    "break",
    "case",
    "continue",
    "delete",
    "do",
    "else",
    "finally",
    "instanceof",
    "return",
    "throw",
    "try",
    "typeof",
];

/// True iff a `/` after the given run of tokens starts a regular
/// expression instead of a division operator (`/` or `/=`).
///
/// `js_tokens` is a non-empty run of non-whitespace, non-comment,
/// non-string tokens not including `/`. One character of lookbehind is
/// enough for the regular lexical grammar this scanner uses; it misses
/// only pathological programs like `x = ++/foo/i`.
pub(super) fn is_regex_preceder(js_tokens: &str) -> bool {
    let chars: Vec<char> = js_tokens.chars().collect();
    let Some(&last) = chars.last() else {
        return true;
    };
    match last {
        '+' | '-' => {
            // Count the adjacent run: "---" is "-- -" (a sign, so regexp
            // next), "----" is "-- --" (a decrement, so division next).
            let run = chars.iter().rev().take_while(|&&c| c == last).count();
            run % 2 == 1
        }
        '.' => {
            if chars.len() == 1 {
                return true;
            }
            // "1." continues a number; "foo." is a property access about
            // to name a member, after which a regexp cannot follow either,
            // but the dot itself cannot end an expression.
            !chars[chars.len() - 2].is_ascii_digit()
        }
        // A '/' here is division ("/" or "/="), not a regexp end.
        '/' => chars.len() <= 2,
        '#' | '%' | '&' | '(' | '*' | ',' | ':' | ';' | '<' | '=' | '>' | '?' | '[' | '^'
        | '{' | '|' | '}' | '~' | '!' => true,
        _ => {
            let word: String = chars
                .iter()
                .rev()
                .take_while(|c| c.is_ascii_alphanumeric() || **c == '_' || **c == '$')
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            REGEX_PRECEDER_KEYWORDS.contains(&word.as_str())
        }
    }
}
