//! Topic extraction from message content
//!
//! A fixed table maps topic names to patterns; any message matching a
//! topic's pattern contributes one occurrence. Matches within a single
//! message collapse to a set.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static TOPIC_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "form_creation",
            r"(?i)(tạo form|tạo biểu mẫu|create form|làm form|new form)",
        ),
        (
            "registration",
            r"(?i)(đăng ký|ghi danh|registration|register|sign[- ]?up)",
        ),
        ("survey", r"(?i)(khảo sát|survey|questionnaire|phiếu hỏi)"),
        ("contact", r"(?i)(liên hệ|contact|hotline|phản hồi|feedback)"),
        (
            "optimization",
            r"(?i)(tối ưu|optimi[sz]e|cải thiện|tăng tỷ lệ)",
        ),
        ("design", r"(?i)(thiết kế|giao diện|design|layout|theme)"),
        (
            "validation",
            r"(?i)(xác thực|kiểm tra dữ liệu|validation|validate)",
        ),
        (
            "integration",
            r"(?i)(tích hợp|kết nối|integration|webhook|api)",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("topic pattern must compile")))
    .collect()
});

/// Extract the set of topics a message mentions
pub fn extract_topics(content: &str) -> BTreeSet<&'static str> {
    TOPIC_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(content))
        .map(|(name, _)| *name)
        .collect()
}
