//! Tokenizes chat command lines into a verb and positional arguments.

#[derive(Debug, Clone, PartialEq, Eq)]
/// A parsed command: the verb selecting a handler plus its arguments.
pub struct CommandLine {
    pub verb: String,
    pub args: Vec<String>,
}

/// Replaces the characters chat clients substitute into typed text.
///
/// Non-breaking spaces become plain spaces and typographic double quotes
/// become ASCII quotes, so JSON arguments survive the trip through a chat
/// client's autocorrect.
pub fn normalize_command_text(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch {
            '\u{a0}' => ' ',
            '\u{201c}' | '\u{201d}' => '"',
            other => other,
        })
        .collect()
}

/// Parses a mention-stripped command line. Returns `None` for blank input.
pub fn parse_command_line(raw: &str) -> Option<CommandLine> {
    let normalized = normalize_command_text(raw);
    let mut tokens = normalized.split_whitespace().map(ToOwned::to_owned);
    let verb = tokens.next()?;
    let args = merge_structured_arguments(tokens.collect());
    Some(CommandLine { verb, args })
}

/// Tracks `{`/`}` nesting across tokens, ignoring braces inside JSON strings.
#[derive(Debug, Default)]
struct BraceDepth {
    depth: i64,
    in_string: bool,
    escaped: bool,
}

impl BraceDepth {
    fn feed(&mut self, text: &str) {
        for ch in text.chars() {
            if self.in_string {
                match ch {
                    _ if self.escaped => self.escaped = false,
                    '\\' => self.escaped = true,
                    '"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => self.depth -= 1,
                _ => {}
            }
        }
    }

    fn is_open(&self) -> bool {
        self.depth > 0
    }
}

/// Re-joins a JSON object argument that whitespace splitting broke apart.
///
/// The first token that leaves a `{` unbalanced absorbs every following
/// token (joined with a single space) until the outermost brace closes.
/// Braces inside quoted strings do not count. Anything after the merged blob
/// is dropped. A block that never closes absorbs the rest of the line; no
/// error is raised.
pub fn merge_structured_arguments(args: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(args.len());
    let mut block: Option<(usize, BraceDepth)> = None;
    let mut block_closed = false;

    for token in args {
        if block_closed {
            break;
        }
        match block.as_mut() {
            None => {
                let mut depth = BraceDepth::default();
                depth.feed(&token);
                merged.push(token);
                if depth.is_open() {
                    block = Some((merged.len() - 1, depth));
                }
            }
            Some((index, depth)) => {
                depth.feed(" ");
                depth.feed(&token);
                merged[*index].push(' ');
                merged[*index].push_str(&token);
                block_closed = !depth.is_open();
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{merge_structured_arguments, normalize_command_text, parse_command_line};

    fn owned(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|token| token.to_string()).collect()
    }

    #[test]
    fn unit_parse_command_line_splits_verb_and_args() {
        let parsed = parse_command_line("  run-test   jenkins2 ci-env-1 test-portal ").expect("parsed");
        assert_eq!(parsed.verb, "run-test");
        assert_eq!(parsed.args, owned(&["jenkins2", "ci-env-1", "test-portal"]));
    }

    #[test]
    fn unit_parse_command_line_rejects_blank_input() {
        assert!(parse_command_line("").is_none());
        assert!(parse_command_line(" \t \u{a0} ").is_none());
    }

    #[test]
    fn functional_json_blob_with_spaces_is_reassembled_into_one_argument() {
        let blob = r#"{"SERVICE_NAME": "all", "TARGET_ENVIRONMENT": "ci env 1"}"#;
        let line = format!("run-jenkins-job self-service-roll jenkins2 {blob}");
        let parsed = parse_command_line(&line).expect("parsed");
        assert_eq!(parsed.verb, "run-jenkins-job");
        assert_eq!(
            parsed.args,
            vec![
                "self-service-roll".to_string(),
                "jenkins2".to_string(),
                blob.to_string()
            ]
        );
    }

    #[test]
    fn regression_tokens_after_merged_blob_are_discarded() {
        let parsed =
            parse_command_line(r#"run-jenkins-job roll jenkins2 {"A": "b c"} trailing words"#)
                .expect("parsed");
        assert_eq!(
            parsed.args,
            owned(&["roll", "jenkins2", r#"{"A": "b c"}"#])
        );
    }

    #[test]
    fn regression_block_opening_at_first_argument_is_merged() {
        let merged = merge_structured_arguments(owned(&[r#"{"A":"#, r#""b"}"#, "extra"]));
        assert_eq!(merged, owned(&[r#"{"A": "b"}"#]));
    }

    #[test]
    fn regression_unclosed_block_absorbs_remaining_tokens() {
        let merged = merge_structured_arguments(owned(&["job", r#"{"A":"#, "b", "c"]));
        assert_eq!(merged, owned(&["job", r#"{"A": b c"#]));
    }

    #[test]
    fn unit_self_contained_json_argument_is_left_alone() {
        let merged = merge_structured_arguments(owned(&["job", r#"{"A":"b"}"#, "next"]));
        assert_eq!(merged, owned(&["job", r#"{"A":"b"}"#, "next"]));
    }

    #[test]
    fn regression_nested_object_is_merged_up_to_its_outer_brace() {
        let blob = r#"{"A": {"B": "c"}, "D": "e"}"#;
        let parsed =
            parse_command_line(&format!("run-jenkins-job job jenkins2 {blob}")).expect("parsed");
        assert_eq!(parsed.args, owned(&["job", "jenkins2", blob]));
    }

    #[test]
    fn regression_closing_brace_inside_string_value_does_not_end_block() {
        let blob = r#"{"A": "x}", "B": "y"}"#;
        let parsed =
            parse_command_line(&format!("run-jenkins-job job jenkins2 {blob} tail")).expect("parsed");
        assert_eq!(parsed.args, owned(&["job", "jenkins2", blob]));

        let escaped = r#"{"A": "say \"}\" now", "B": "y"}"#;
        let parsed =
            parse_command_line(&format!("run-jenkins-job job jenkins2 {escaped}")).expect("parsed");
        assert_eq!(parsed.args, owned(&["job", "jenkins2", escaped]));
    }

    fn object_text(entries: &[(String, String, bool)]) -> String {
        let body = entries
            .iter()
            .map(|(key, value, nested)| {
                if *nested {
                    format!(r#""{key}": {{"inner": "{value}"}}"#)
                } else {
                    format!(r#""{key}": "{value}""#)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{body}}}")
    }

    proptest! {
        #[test]
        fn property_spaced_json_object_survives_as_one_argument(
            entries in prop::collection::vec(
                ("[a-z]{1,6}", "[a-z{}]{1,4}( [a-z{}]{1,4}){0,2}", any::<bool>()),
                1..5,
            ),
        ) {
            let blob = object_text(&entries);
            let parsed = parse_command_line(&format!("run-jenkins-job job jenkins2 {blob} extra"))
                .expect("parsed");
            prop_assert_eq!(parsed.args, owned(&["job", "jenkins2", blob.as_str()]));
        }
    }

    #[test]
    fn unit_normalize_command_text_replaces_chat_client_substitutions() {
        let normalized = normalize_command_text("run\u{a0}job {\u{201c}A\u{201d}:1}");
        assert_eq!(normalized, "run job {\"A\":1}");
    }
}
