//! Human-readable descriptions for content delivery API status codes
//!
//! See <https://www.storyblok.com/docs/api/content-delivery>.

/// Returns the documented meaning of an API status code
pub fn describe(status: u16) -> &'static str {
    match status {
        200 => "OK: Everything worked as expected.",
        400 => "Bad Request: Wrong format was sent (eg. XML instead of JSON).",
        401 => "Unauthorized: No valid API key provided.",
        404 => "Not Found: The requested resource doesn't exist (perhaps due to not yet published content entries).",
        422 => "Unprocessable Entity: The request was unacceptable, often due to missing a required parameter.",
        429 => "Too Many Requests: Too many requests hit the API too quickly. We recommend an exponential backoff of your requests.",
        500 | 502 | 503 | 504 => "Server Error: Something went wrong on Storyblok's end. (These are rare.)",
        _ => "Unexpected status code.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_codes_have_specific_text() {
        assert!(describe(401).starts_with("Unauthorized"));
        assert!(describe(404).starts_with("Not Found"));
        assert!(describe(429).starts_with("Too Many Requests"));
        for code in [500, 502, 503, 504] {
            assert!(describe(code).starts_with("Server Error"));
        }
    }

    #[test]
    fn test_unknown_code_gets_generic_text() {
        assert_eq!(describe(418), "Unexpected status code.");
        assert!(!describe(301).is_empty());
    }
}
