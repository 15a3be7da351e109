use dcs_protocol::CodeType;

/// Parses just enough of a G/M/T-code's leading letter and number for the
/// `InterceptedCode` offered to interceptors. Full G-code grammar (string
/// parameters, comments, checksums) belongs to the pipeline, not the core —
/// the interceptor filter only ever looks at type and major/minor number.
pub fn parse_code_type(code: &str) -> (CodeType, Option<u32>, Option<u32>) {
    let trimmed = code.trim_start();
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else { return (CodeType::Comment, None, None) };
    let code_type = match first.to_ascii_uppercase() {
        'G' => CodeType::G,
        'M' => CodeType::M,
        'T' => CodeType::T,
        _ => return (CodeType::Comment, None, None),
    };
    let rest: String = chars.take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let mut parts = rest.splitn(2, '.');
    let major = parts.next().and_then(|s| s.parse().ok());
    let minor = parts.next().and_then(|s| s.parse().ok());
    (code_type, major, minor)
}
