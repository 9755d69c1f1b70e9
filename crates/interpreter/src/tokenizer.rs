/// Splits one command line into whitespace-separated arguments, treating a
/// double-quoted run (with `\"` and `\\` escapes) as a single argument. This
/// is deliberately simpler than `hyperdbg-lexer`'s script tokenizer — the
/// interpreter only needs "first word is the command, rest is argument
/// text", not a typed token stream.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escape = false;
    let mut has_current = false;

    for c in line.chars() {
        if escape {
            current.push(match c {
                'n' if in_string => '\n',
                't' if in_string => '\t',
                other => other,
            });
            escape = false;
            has_current = true;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => {
                in_string = !in_string;
                has_current = true;
            }
            c if c.is_whitespace() && !in_string => {
                if has_current {
                    args.push(std::mem::take(&mut current));
                    has_current = false;
                }
            }
            c => {
                current.push(c);
                has_current = true;
            }
        }
    }
    if has_current {
        args.push(current);
    }
    args
}

/// Tracks open `{`/`"` depth across lines typed at the prompt (spec §4.7
/// "Multi-line commands"). A line that leaves the tracker at nonzero depth
/// means the prompt should stay open for a continuation line instead of
/// dispatching what has been typed so far.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinuationTracker {
    brace_depth: i32,
    in_string: bool,
}

impl ContinuationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line of input, updating the tracked depth. Returns `true`
    /// if the line completes everything opened so far (depth back to zero
    /// and not mid-string), `false` if another line is needed.
    pub fn feed_line(&mut self, line: &str) -> bool {
        let mut escape = false;
        for c in line.chars() {
            if escape {
                escape = false;
                continue;
            }
            match c {
                '\\' if self.in_string => escape = true,
                '"' => self.in_string = !self.in_string,
                '{' if !self.in_string => self.brace_depth += 1,
                '}' if !self.in_string => self.brace_depth = (self.brace_depth - 1).max(0),
                _ => {}
            }
        }
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.brace_depth == 0 && !self.in_string
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_arguments() {
        assert_eq!(split_args("bp 0x1000"), vec!["bp", "0x1000"]);
    }

    #[test]
    fn keeps_quoted_string_as_one_argument() {
        let args = split_args(r#"printf "hello world" 0n1"#);
        assert_eq!(args, vec!["printf", "hello world", "0n1"]);
    }

    #[test]
    fn honors_escapes_inside_strings() {
        let args = split_args(r#"printf "a\"b""#);
        assert_eq!(args, vec!["printf", "a\"b"]);
    }

    #[test]
    fn single_line_with_balanced_braces_completes_immediately() {
        let mut tracker = ContinuationTracker::new();
        assert!(tracker.feed_line("@rax == 0x1 ? { print(\"hit\"); }"));
    }

    #[test]
    fn open_brace_keeps_prompt_open_across_lines() {
        let mut tracker = ContinuationTracker::new();
        assert!(!tracker.feed_line("if (@rax == 0x1) {"));
        assert!(!tracker.feed_line("print(\"hit\");"));
        assert!(tracker.feed_line("}"));
    }

    #[test]
    fn brace_inside_string_literal_does_not_count() {
        let mut tracker = ContinuationTracker::new();
        assert!(tracker.feed_line(r#"printf("{not a block}");"#));
    }

    #[test]
    fn unterminated_string_keeps_prompt_open() {
        let mut tracker = ContinuationTracker::new();
        assert!(!tracker.feed_line(r#"printf("unterminated"#));
        assert!(tracker.feed_line(r#"continues");"#));
    }
}
