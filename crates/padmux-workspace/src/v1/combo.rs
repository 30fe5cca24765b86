#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SequenceErrorKind {
    LeadingOperator,
    TrailingOperator,
    DoubleOperator,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SequenceError<'a> {
    pub rest: &'a str,
    pub kind: SequenceErrorKind,
}

/// Tokenize with a one-character delimiter. Returns either the next term
/// (everything up to the next delimiter, trimmed; may contain inner spaces)
/// or the delimiter itself as a one-character slice, plus the remaining
/// input.
pub(crate) fn next_token_with(input: &str, delim: char) -> Option<(&str, &str)> {
    let input = input.trim_start();
    let first = input.chars().next()?;
    if first == delim {
        let len = first.len_utf8();
        return Some((&input[..len], &input[len..]));
    }

    match input.find(delim) {
        Some(i) => Some((input[..i].trim_end(), &input[i..])),
        None => Some((input.trim_end(), "")),
    }
}

/// Parse a sequence of terms separated by the given delimiter.
/// Rejects leading, trailing and consecutive delimiters.
///
/// Returns the list of term slices (without delimiters or surrounding spaces).
pub(crate) fn parse_terms_with_delim(
    mut input: &str,
    delim: char,
) -> Result<Vec<&str>, SequenceError<'_>> {
    #[derive(PartialEq, Eq, Clone, Copy)]
    enum LastTokenKind {
        None,
        Term,
        Operator,
    }

    let mut terms = Vec::new();
    let mut last = LastTokenKind::None;

    while let Some((token, rest)) = next_token_with(input, delim) {
        input = rest;

        let is_operator = token.chars().count() == 1 && token.starts_with(delim);
        if !is_operator {
            terms.push(token);
            last = LastTokenKind::Term;
            continue;
        }
        match last {
            LastTokenKind::None => {
                return Err(SequenceError {
                    rest: input,
                    kind: SequenceErrorKind::LeadingOperator,
                });
            }
            LastTokenKind::Operator => {
                return Err(SequenceError {
                    rest: input,
                    kind: SequenceErrorKind::DoubleOperator,
                });
            }
            LastTokenKind::Term => last = LastTokenKind::Operator,
        }
    }

    if last == LastTokenKind::Operator {
        return Err(SequenceError {
            rest: "",
            kind: SequenceErrorKind::TrailingOperator,
        });
    }

    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_keeps_inner_spaces_of_a_term() {
        let (tok, rest) =
            next_token_with("pov 0 up | button 3", '|').expect("should find first token");
        assert_eq!(tok, "pov 0 up");
        assert_eq!(rest, "| button 3");
    }

    #[test]
    fn tokenizer_handles_single_term() {
        let (tok, rest) = next_token_with("  axis 1  ", '|').expect("single token");
        assert_eq!(tok, "axis 1");
        assert_eq!(rest, "");
    }

    #[test]
    fn tokenizer_returns_delimiter_alone() {
        let (tok, rest) = next_token_with("|button 3", '|').expect("delimiter");
        assert_eq!(tok, "|");
        assert_eq!(rest, "button 3");
    }

    #[test]
    fn parse_terms_accepts_valid_sequence() {
        let terms = parse_terms_with_delim("button 0 | axis 1|pov 0 up", '|')
            .expect("parser should accept valid alternatives");
        assert_eq!(terms, vec!["button 0", "axis 1", "pov 0 up"]);
    }

    #[test]
    fn parse_terms_with_other_delimiter() {
        let terms = parse_terms_with_delim("lb + rb+a", '+').expect("chord");
        assert_eq!(terms, vec!["lb", "rb", "a"]);
    }

    #[test]
    fn parse_terms_rejects_consecutive_operators() {
        let err = parse_terms_with_delim("button 0 | | axis 1", '|').unwrap_err();
        assert_eq!(err.kind, SequenceErrorKind::DoubleOperator);
    }

    #[test]
    fn parse_terms_rejects_leading_operator() {
        let err = parse_terms_with_delim("| button 0", '|').unwrap_err();
        assert_eq!(err.kind, SequenceErrorKind::LeadingOperator);
    }

    #[test]
    fn parse_terms_rejects_trailing_operator() {
        let err = parse_terms_with_delim("button 0 |", '|').unwrap_err();
        assert_eq!(err.kind, SequenceErrorKind::TrailingOperator);
    }

    #[test]
    fn parse_terms_of_blank_input_is_empty() {
        assert!(parse_terms_with_delim("   ", '|').unwrap().is_empty());
    }
}
