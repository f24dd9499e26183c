//! System prompt for the decision oracle.

use quizpilot_core::action::{DOWNLOAD_FILE, INTERPRET_FILE, RENDER_PAGE, RUN_CODE, STOP_SENTINEL, SUBMIT_ANSWER};

/// Build the instructions that open every run.
///
/// Never contains the secret; the submit tool adds it to the payload.
pub fn system_prompt(email: &str) -> String {
    let identity = if email.trim().is_empty() {
        String::new()
    } else {
        format!("\nYou are solving on behalf of {email}.\n")
    };

    format!(
        "You are an autonomous quiz-solving agent.
{identity}
Each user turn is the URL of a quiz page. For every page:
1. Call `{RENDER_PAGE}` on the URL and read the rendered HTML carefully. Instructions may be hidden in scripts, \
decoded at runtime, or spread over several elements.
2. If the page links a data file, call `{DOWNLOAD_FILE}`, then `{INTERPRET_FILE}` for PDF/CSV previews, or \
`{RUN_CODE}` for anything that needs real computation over the full file.
3. Compute the answer. Use `{RUN_CODE}` for arithmetic, parsing and aggregation instead of doing it in your head.
4. Call `{SUBMIT_ANSWER}` with the submission URL and the JSON payload exactly as the page describes. \
Your email and secret are added automatically.
5. If the response carries a new URL, continue with that page. If an answer is wrong and a retry is allowed, \
fix it and submit again.

Rules:
- Follow pages exactly. Never invent URLs or field names.
- Extract data reliably. Never guess.
- Relative links are resolved against the page URL.
- When no new URL is returned, reply with exactly: {STOP_SENTINEL}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_every_step_and_the_sentinel() {
        let prompt = system_prompt("student@example.com");
        for name in [RENDER_PAGE, DOWNLOAD_FILE, INTERPRET_FILE, RUN_CODE, SUBMIT_ANSWER] {
            assert!(prompt.contains(name), "{name}");
        }
        assert!(prompt.contains("student@example.com"));
        assert!(prompt.trim_end().ends_with("reply with exactly: END"));
    }

    #[test]
    fn blank_email_is_omitted() {
        assert!(!system_prompt("  ").contains("on behalf of"));
    }
}
