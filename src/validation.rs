//! Input checks shared by the prompts: project names, organization names,
//! yes/no answers and extension link labels.

use html_escape::decode_html_entities;
use lazy_static::lazy_static;
use regex::Regex;

const MAX_PROJECT_NAME_LEN: usize = 64;

const FORBIDDEN_PROJECT_NAME_CHARS: &[char] = &[
    '\\', '/', ':', '*', '?', '"', '<', '>', '|', ';', '#', '$', '{', '}', ',', '+', '=', '[', ']',
];

const RESERVED_PROJECT_NAMES: &[&str] = &[
    "AUX",
    "COM1",
    "COM2",
    "COM3",
    "COM4",
    "COM5",
    "COM6",
    "COM7",
    "COM8",
    "COM9",
    "CON",
    "LPT1",
    "LPT2",
    "LPT3",
    "LPT4",
    "LPT5",
    "LPT6",
    "LPT7",
    "LPT8",
    "LPT9",
    "NUL",
    "PRN",
    "SERVER",
    "SignalR",
    "DefaultCollection",
    "Web",
    "App_code",
    "App_Browsers",
    "App_Data",
    "App_GlobalResources",
    "App_LocalResources",
    "App_Themes",
    "App_WebResources",
    "bin",
    "web.config",
];

lazy_static! {
    static ref HREF: Regex = Regex::new(r#"(?i)href\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Blank input, "yes" or "y" (any case) count as agreement
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.is_empty() || answer.eq_ignore_ascii_case("yes") || answer.eq_ignore_ascii_case("y")
}

/// True when the text parses as an absolute URL of any scheme
pub fn is_absolute_url(text: &str) -> bool {
    url::Url::parse(text.trim()).is_ok()
}

/// Explain why a project name would be refused by the service
pub fn validate_project_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_string());
    }

    if name.chars().count() > MAX_PROJECT_NAME_LEN {
        return Err(format!("name is longer than {} characters", MAX_PROJECT_NAME_LEN));
    }

    if let Some(c) = name
        .chars()
        .find(|c| FORBIDDEN_PROJECT_NAME_CHARS.contains(c) || c.is_control())
    {
        return Err(format!("character '{}' is not allowed", c.escape_default()));
    }

    if name.starts_with('_') {
        return Err("name cannot start with an underscore".to_string());
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err("name cannot start or end with a period".to_string());
    }

    if let Some(reserved) = RESERVED_PROJECT_NAMES
        .iter()
        .find(|reserved| reserved.eq_ignore_ascii_case(name))
    {
        return Err(format!("'{}' is a reserved name", reserved));
    }

    Ok(())
}

pub fn check_project_name(name: &str) -> bool {
    validate_project_name(name).is_ok()
}

/// Human-readable link text from a manifest value.
///
/// Manifest links are either bare URLs or anchor markup such as
/// `<a href='https://...' target='_blank'>Marketplace</a>`; the anchor's
/// target wins when present.
pub fn extract_display_link(raw: &str) -> String {
    let text = match HREF.captures(raw).and_then(|c| c.get(1)) {
        Some(href) => href.as_str().to_string(),
        None => TAG.replace_all(raw, "").into_owned(),
    };
    decode_html_entities(&text).trim().to_string()
}
