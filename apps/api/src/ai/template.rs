//! Placeholder substitution for prompt text.
//!
//! Prompts may contain `{{input}}` or `{{user_input}}`; both are replaced
//! literally with the text the buyer supplies at run time.

pub const PLACEHOLDERS: [&str; 2] = ["{{input}}", "{{user_input}}"];

pub fn has_input_placeholders(content: &str) -> bool {
    PLACEHOLDERS.iter().any(|p| content.contains(p))
}

/// Replaces every placeholder with `input` in a single left-to-right pass.
/// Inserted text is never re-scanned. Empty input leaves `content` unchanged.
pub fn substitute_input(content: &str, input: &str) -> String {
    if input.is_empty() {
        return content.to_string();
    }

    let mut out = String::with_capacity(content.len() + input.len());
    let mut rest = content;

    while let Some((at, placeholder)) = next_placeholder(rest) {
        out.push_str(&rest[..at]);
        out.push_str(input);
        rest = &rest[at + placeholder.len()..];
    }
    out.push_str(rest);
    out
}

fn next_placeholder(haystack: &str) -> Option<(usize, &'static str)> {
    PLACEHOLDERS
        .iter()
        .filter_map(|p| haystack.find(p).map(|at| (at, *p)))
        .min_by_key(|(at, _)| *at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_both_placeholder_spellings() {
        let content = "Summarize {{input}}. Then translate {{user_input}} to French.";
        assert_eq!(
            substitute_input(content, "the memo"),
            "Summarize the memo. Then translate the memo to French."
        );
    }

    #[test]
    fn test_replaces_every_occurrence() {
        assert_eq!(substitute_input("{{input}}-{{input}}", "a"), "a-a");
    }

    #[test]
    fn test_empty_input_leaves_text_untouched() {
        let content = "Write about {{input}}";
        assert_eq!(substitute_input(content, ""), content);
    }

    #[test]
    fn test_inserted_text_is_not_rescanned() {
        assert_eq!(
            substitute_input("A {{input}} B {{user_input}}", "{{user_input}}"),
            "A {{user_input}} B {{user_input}}"
        );
    }

    #[test]
    fn test_other_braced_tokens_are_left_alone() {
        assert_eq!(
            substitute_input("{{topic}} and {{ input }}", "x"),
            "{{topic}} and {{ input }}"
        );
    }

    #[test]
    fn test_detects_placeholders() {
        assert!(has_input_placeholders("Rewrite {{user_input}}"));
        assert!(has_input_placeholders("{{input}}"));
        assert!(!has_input_placeholders("Write about [TOPIC]"));
    }
}
