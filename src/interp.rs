//! Interpolation placeholder parsing.
//!
//! Shared between name resolution (which must resolve each placeholder's
//! identifier path) and codegen (which lowers each placeholder to a Bash
//! `${...}` reference). Keeping this logic in one place avoids the two
//! phases drifting on what counts as a valid `{identifier.path}` run.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpPart {
    Text(String),
    /// Dot-joined identifier path, e.g. `a.b.c` -> `["a", "b", "c"]`.
    Placeholder(Vec<String>),
}

pub fn parse_interpolation(s: &str) -> Vec<InterpPart> {
    let chars: Vec<char> = s.chars().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_close(&chars, i) {
                let path_str: String = chars[i + 1..end].iter().collect();
                if is_identifier_path(&path_str) {
                    if !text.is_empty() {
                        parts.push(InterpPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(InterpPart::Placeholder(
                        path_str.split('.').map(str::to_string).collect(),
                    ));
                    i = end + 1;
                    continue;
                }
            }
        }
        text.push(chars[i]);
        i += 1;
    }
    if !text.is_empty() {
        parts.push(InterpPart::Text(text));
    }
    parts
}

fn find_close(chars: &[char], open: usize) -> Option<usize> {
    chars[open + 1..].iter().position(|c| *c == '}').map(|p| open + 1 + p)
}

fn is_identifier_path(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    s.split('.').all(|seg| {
        !seg.is_empty()
            && seg.chars().next().is_some_and(|c| c == '_' || c.is_alphabetic())
            && seg.chars().all(|c| c == '_' || c.is_alphanumeric())
    })
}

/// Join an identifier path the way codegen does: `a.b.c` -> `a_b_c`.
pub fn join_path(path: &[String]) -> String {
    path.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_text() {
        assert_eq!(parse_interpolation("hello"), vec![InterpPart::Text("hello".into())]);
    }

    #[test]
    fn parses_single_placeholder() {
        assert_eq!(
            parse_interpolation("Hi {name}"),
            vec![
                InterpPart::Text("Hi ".into()),
                InterpPart::Placeholder(vec!["name".into()]),
            ]
        );
    }

    #[test]
    fn parses_dotted_path() {
        assert_eq!(
            parse_interpolation("{a.b.c}"),
            vec![InterpPart::Placeholder(vec!["a".into(), "b".into(), "c".into()])]
        );
    }

    #[test]
    fn leaves_non_identifier_braces_as_text() {
        assert_eq!(parse_interpolation("{1}"), vec![InterpPart::Text("{1}".into())]);
    }

    #[test]
    fn join_path_uses_underscores() {
        assert_eq!(join_path(&["a".into(), "b".into(), "c".into()]), "a_b_c");
    }
}
