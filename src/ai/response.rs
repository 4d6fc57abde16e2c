use serde::Deserialize;
use std::fmt;
use validator::Validate;

/// The structured reply the model is instructed to produce.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct CommandRequest {
    #[validate(length(min = 1, message = "Command cannot be empty"))]
    pub command: String,
}

/// The model's reply could not be decoded into a [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub reason: String,
    pub raw: String,
}

impl ParseError {
    fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not parse model response: {}", self.reason)
    }
}

impl std::error::Error for ParseError {}

pub fn parse_command_response(raw: &str) -> Result<CommandRequest, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::new("response was empty", raw));
    }

    let value: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(direct_err) => match extract_json(trimmed) {
            Some(json) => serde_json::from_str(json).map_err(|e| ParseError::new(e.to_string(), raw))?,
            None => return Err(ParseError::new(format!("not valid JSON ({})", direct_err), raw)),
        },
    };

    if !value.is_object() {
        return Err(ParseError::new("expected a JSON object", raw));
    }
    if value.get("command").is_none() {
        return Err(ParseError::new("missing \"command\" field", raw));
    }

    let mut request: CommandRequest = serde_json::from_value(value)
        .map_err(|e| ParseError::new(format!("invalid \"command\" field: {}", e), raw))?;
    request.command = request.command.trim().to_string();

    request
        .validate()
        .map_err(|_| ParseError::new("\"command\" is empty", raw))?;

    Ok(request)
}

/// Finds the first balanced `{...}` object in `text`, skipping braces that
/// appear inside string literals.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }

    None
}
