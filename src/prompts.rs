//! Instruction prompts sent to the vision model with each page.
//!
//! Callers can override the default via [`crate::config::TallyConfig::prompt`];
//! the constant here is used only when no override is provided. Any override
//! must still ask for the JSON shape parsed by
//! [`crate::pipeline::response::parse_page_stats`].

/// Default instruction for counting bylines on one newspaper page.
pub const JOURNALIST_PROMPT: &str = r#"Extract ONLY the journalist names that are explicitly written in the newspaper page.
DO NOT infer or guess names. Only return names that you can see word-for-word in the text.

For each exact journalist name found, count:
- Total exclusive articles (marked "EXCLUSIVE")
- Total standard articles (not marked "EXCLUSIVE")

Required format:
{
    "journalist_stats": {
        "Full Name": {
            "exclusive": number,
            "standard": number
        }
    }
}

If unsure about a name, skip it. Only include names you are certain about."#;
