/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Parse an endpointing setting: a threshold in milliseconds or an on/off switch
///
/// "false"/"no"/"off" disable endpointing; "true"/"yes"/"on" keep `default_ms`.
/// A bare "0" or "1" is read as milliseconds.
pub fn parse_endpointing(s: &str, default_ms: u32) -> Result<Option<u32>, String> {
    if let Ok(ms) = s.parse::<u32>() {
        return Ok(Some(ms));
    }
    match s.to_lowercase().as_str() {
        "off" => Ok(None),
        "on" => Ok(Some(default_ms)),
        other => match parse_bool(other) {
            Some(true) => Ok(Some(default_ms)),
            Some(false) => Ok(None),
            None => Err(format!(
                "Invalid endpointing value '{s}': expected milliseconds or true/false"
            )),
        },
    }
}
