//! AI prompt construction and response parsing
//!
//! The chat vendor sometimes answers with clean JSON and sometimes with
//! JSON wrapped in prose. [`extract_json`] handles both: strict parse
//! first, then the first balanced object in the text, failing loudly only
//! when neither works.

use serde_json::Value;
use thiserror::Error;

use fieldnote_common::api::types::{
    ChatMessage, ChatRequest, CompactCompany, CompanyMatchResult, EnhancedNote,
};

/// Parse failures from the assist layer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssistError {
    #[error("no JSON object found in model response")]
    NoJson,

    #[error("model response JSON did not match the expected shape: {0}")]
    WrongShape(String),
}

/// Build the company-matching chat request
///
/// The directory is the compact projection only; contact details are
/// excluded to bound request size.
pub fn company_match_request(
    transcription: &str,
    directory: &[CompactCompany],
    model: Option<String>,
) -> ChatRequest {
    let directory_json =
        serde_json::to_string_pretty(directory).unwrap_or_else(|_| "[]".to_string());

    let prompt = format!(
        r#"You are an assistant for a partner-management team. Analyze the following meeting note and identify the partner company it mentions, using the provided list.

Meeting note:
"""
{transcription}
"""

Available companies (JSON):
"""
{directory_json}
"""

Look for names, aliases, locations, or hints in the text. Answer ONLY with valid JSON in this format:
{{
  "matched_company_id": "string or null",
  "confidence": "high/medium/low",
  "reasoning": "short justification"
}}

Answer EXCLUSIVELY with the JSON object, no additional text."#
    );

    ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        model,
        temperature: Some(0.3),
        max_tokens: Some(200),
    }
}

/// Build the text-enhancement chat request
///
/// The model must preserve original phrasing, fix only grammar, extract
/// the conversation date separately from in-body deadlines, and answer
/// with a discriminated JSON result.
pub fn enhance_request(
    transcription: &str,
    company_name: &str,
    contact_name: &str,
    author_name: &str,
    model: Option<String>,
) -> ChatRequest {
    let prompt = format!(
        r###"You are an assistant helping to turn raw meeting notes into professional write-ups.

Inputs:
- Company: {company_name}
- Contact person: {contact_name}
- Author: {author_name}
- Raw meeting note: """{transcription}"""

Task:
1. FIND THE CONVERSATION DATE: look for the date the conversation took place (NOT appointments or deadlines).
2. STRUCTURE THE NOTE: prepare the meeting note professionally.

IMPORTANT RULES:
1. CONTENT FIDELITY: Do NOT change any substantive statements. Preserve the original assertions.
2. MINIMAL CORRECTION: Fix ONLY obvious grammar and spelling mistakes.
3. NO INTERPRETATION: Add no opinions or assessments of your own.
4. NO INVENTION: Invent no details the note does not mention.
5. DEADLINE DETECTION: Identify and list every mentioned date, deadline, and appointment explicitly.
6. STRUCTURE: Arrange the content into the given sections without altering the statements.
7. DATE FORMAT: Convert dates to DD.MM.YYYY.
8. ORIGINAL WORDING: Keep the original wording wherever possible, with grammar fixes only.

Answer EXCLUSIVELY with the following JSON format (no additional text!):
{{
  "conversationDate": "DD.MM.YYYY or empty if not mentioned",
  "processedText": "## Company\n- Name: {company_name}\n- Contact: {contact_name}\n\n## Date & Participants\n- Conversation date: [date or 'Not specified']\n- Author: {author_name}\n\n## Meeting Notes\n[main content]\n\n## Agreements\n[agreements, or 'No explicit agreements made.']\n\n## Deadlines & Appointments\n[all mentioned dates in DD.MM.YYYY, or 'No dates mentioned.']\n\n## Next Steps\n[steps, or 'No concrete next steps agreed.']"
}}

IMPORTANT for conversationDate:
- Look for phrases like "on [date]", "the conversation took place on", "we met on".
- NOT appointments or deadlines (those belong in the text).
- If not mentioned: empty string ""."###
    );

    ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        model,
        temperature: Some(0.3),
        max_tokens: Some(1600),
    }
}

/// Parse a company match verdict from model output
pub fn parse_match_result(content: &str) -> Result<CompanyMatchResult, AssistError> {
    let value = extract_json(content)?;
    serde_json::from_value(value).map_err(|e| AssistError::WrongShape(e.to_string()))
}

/// Parse an enhancement result from model output
pub fn parse_enhanced_note(content: &str) -> Result<EnhancedNote, AssistError> {
    let value = extract_json(content)?;
    serde_json::from_value(value).map_err(|e| AssistError::WrongShape(e.to_string()))
}

/// Tolerant JSON extraction
///
/// Tries a strict parse of the whole text first. When the model wrapped
/// its JSON in prose (or a code fence), falls back to scanning for the
/// first balanced `{…}` object, honoring string literals and escapes.
pub fn extract_json(text: &str) -> Result<Value, AssistError> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    let candidate = first_balanced_object(trimmed).ok_or(AssistError::NoJson)?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(AssistError::NoJson),
    }
}

/// Locate the first balanced top-level `{…}` substring
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses() {
        let value = extract_json(r#"{"matched_company_id": "c1", "confidence": "high"}"#).unwrap();
        assert_eq!(value["matched_company_id"], "c1");
    }

    #[test]
    fn json_embedded_in_prose_parses() {
        let text = r#"Sure! Here is the result you asked for:

{"matched_company_id": "c1", "confidence": "medium", "reasoning": "name match"}

Let me know if you need anything else."#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["confidence"], "medium");
    }

    #[test]
    fn json_in_code_fence_parses() {
        let text = "```json\n{\"conversationDate\": \"07.03.2025\", \"processedText\": \"## Notes\"}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["conversationDate"], "07.03.2025");
    }

    #[test]
    fn nested_objects_and_braces_in_strings_survive() {
        let text = r#"result: {"a": {"b": "contains } brace"}, "c": "and { another"}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["a"]["b"], "contains } brace");
    }

    #[test]
    fn no_json_fails_loudly() {
        assert_eq!(extract_json("no structured data here"), Err(AssistError::NoJson));
        assert_eq!(extract_json(""), Err(AssistError::NoJson));
        assert_eq!(extract_json("{ unbalanced"), Err(AssistError::NoJson));
    }

    #[test]
    fn bare_array_is_not_accepted() {
        // The contract is an object; a bare array means the model went off
        // script
        assert_eq!(extract_json(r#"[1, 2, 3]"#), Err(AssistError::NoJson));
    }

    #[test]
    fn match_result_parses_null_company() {
        let result = parse_match_result(
            r#"{"matched_company_id": null, "confidence": "low", "reasoning": "nothing matched"}"#,
        )
        .unwrap();
        assert!(result.matched_company_id.is_none());
        assert_eq!(result.confidence, "low");
    }

    #[test]
    fn enhanced_note_parses_with_empty_date() {
        let result = parse_enhanced_note(
            r###"{"conversationDate": "", "processedText": "## Meeting Notes\ncontent"}"###,
        )
        .unwrap();
        assert!(result.conversation_date.is_empty());
        assert!(result.processed_text.starts_with("## Meeting Notes"));
    }

    #[test]
    fn wrong_shape_is_distinguished_from_missing_json() {
        let err = parse_enhanced_note(r#"{"unexpected": true}"#).unwrap_err();
        assert!(matches!(err, AssistError::WrongShape(_)));
    }

    #[test]
    fn match_prompt_embeds_directory_and_transcript() {
        let directory = vec![CompactCompany {
            id: "c1".into(),
            name: "Acme Manufacturing GmbH".into(),
            short_name: "Acme".into(),
            aliases: vec![],
            location: "Wetzlar".into(),
        }];
        let request = company_match_request("we met Acme yesterday", &directory, None);
        let prompt = &request.messages[0].content;
        assert!(prompt.contains("we met Acme yesterday"));
        assert!(prompt.contains("Acme Manufacturing GmbH"));
        assert_eq!(request.temperature, Some(0.3));
    }

    #[test]
    fn enhance_prompt_separates_date_extraction_from_deadlines() {
        let request = enhance_request("raw note", "Acme", "Jana Berg (HR)", "Sam Field", None);
        let prompt = &request.messages[0].content;
        assert!(prompt.contains("NOT appointments or deadlines"));
        assert!(prompt.contains("conversationDate"));
        assert!(prompt.contains("Sam Field"));
    }
}
