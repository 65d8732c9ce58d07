use regex::Regex;
use std::sync::OnceLock;

fn digit_run() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").expect("digit pattern is valid"))
}

/// First maximal run of decimal digits in `file_name`, used as the student ID.
pub fn student_id(file_name: &str) -> Option<String> {
    digit_run().find(file_name).map(|m| m.as_str().to_string())
}
