//! Content and form-design guardrails
//!
//! Pure pattern matching over text and form drafts. The engine never
//! performs I/O and never blocks on malformed input: anything it cannot
//! classify is treated as safe (fail-open), matching the rest of the
//! request path's degradation strategy.
//!
//! The keyword tables are deliberately small and mixed English/Vietnamese.
//! They are illustrative screening lists, not a compliance engine.

use rand::seq::SliceRandom;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex};

use crate::config::GuardrailsConfig;
use crate::forms::FormDraft;
use crate::guardrails::log::{Severity, ViolationLog, ViolationRecord};

/// Keyword categories that produce blocking violations
const UNSAFE_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "violence",
        &["giết người", "bạo lực", "tấn công", "kill people", "murder", "assault"],
    ),
    (
        "hate",
        &["thù ghét", "kỳ thị", "phân biệt chủng tộc", "hate speech", "racist"],
    ),
    (
        "adult",
        &["khiêu dâm", "nội dung người lớn", "pornograph", "explicit sexual"],
    ),
    (
        "fraud",
        &["lừa đảo", "rửa tiền", "chiếm đoạt", "money laundering", "ponzi"],
    ),
];

/// Sensitive patterns that produce non-blocking warnings
static SENSITIVE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("password", r"(?i)\b(password|mật khẩu|mat khau|passwd)\b"),
        (
            "national_id",
            r"(?i)\b(cmnd|cccd|căn cước|số chứng minh|social security|ssn)\b",
        ),
        (
            "credit_card",
            r"(?i)\b(credit card|thẻ tín dụng|số thẻ|card number|cvv)\b",
        ),
        (
            "medical",
            r"(?i)\b(bệnh án|chẩn đoán|tiền sử bệnh|medical record|diagnosis)\b",
        ),
        ("illegal", r"(?i)\b(ma túy|vũ khí|buôn lậu|narcotics|smuggling)\b"),
        (
            "hacking",
            r"(?i)\b(hack|crack|exploit|ddos|phishing|malware)\b",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("sensitive pattern must compile")))
    .collect()
});

/// Field labels that may never appear on a generated form
static FORBIDDEN_FIELD_PATTERNS: LazyLock<Vec<(&'static str, Regex, &'static str)>> =
    LazyLock::new(|| {
        [
            (
                "password",
                r"(?i)(password|mật khẩu|mat khau)",
                "Forms must never collect passwords",
            ),
            (
                "national_id",
                r"(?i)(cmnd|cccd|căn cước|số chứng minh|social security|ssn|id number)",
                "National identity numbers cannot be collected through generated forms",
            ),
            (
                "credit_card",
                r"(?i)(credit card|thẻ tín dụng|số thẻ|card number|cvv)",
                "Payment card data cannot be collected through generated forms",
            ),
            (
                "bank_account",
                r"(?i)(bank account|số tài khoản|account number|iban)",
                "Bank account details cannot be collected through generated forms",
            ),
        ]
        .into_iter()
        .map(|(name, pattern, reason)| {
            (
                name,
                Regex::new(pattern).expect("forbidden field pattern must compile"),
                reason,
            )
        })
        .collect()
    });

/// Topics that require a disclaimer on the form (non-blocking)
static SENSITIVE_TOPIC_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("medical", r"(?i)(sức khỏe|bệnh|y tế|health|medical)"),
        ("financial", r"(?i)(thu nhập|tài chính|lương|income|salary|financial)"),
        ("identity", r"(?i)(quốc tịch|tôn giáo|dân tộc|nationality|religion|ethnicity)"),
        ("children", r"(?i)(trẻ em|con của bạn|children|minor)"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("topic pattern must compile")))
    .collect()
});

/// Generic expansions appended to answers shorter than the minimum length
const GENERIC_EXPANSIONS: &[&str] = &[
    "Bạn có thể cho mình biết thêm chi tiết để mình hỗ trợ tốt hơn không?",
    "Nếu cần, mình có thể giải thích kỹ hơn hoặc đưa ra ví dụ cụ thể.",
    "Bạn muốn mình hướng dẫn từng bước cho phần này không?",
];

static DONT_KNOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(không biết|chưa rõ|i don't know|not sure|no idea)")
        .expect("dont-know pattern must compile")
});

/// A blocking content violation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyViolation {
    /// Matched unsafe category
    pub category: String,
    /// The keyword that triggered the match
    pub matched: String,
}

/// A non-blocking sensitive-content warning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyWarning {
    /// Pattern kind (password, national_id, ...)
    pub kind: String,
    /// Human-readable note for the caller
    pub note: String,
}

/// Outcome of a content safety check
#[derive(Debug, Clone, Serialize)]
pub struct SafetyCheck {
    pub violations: Vec<SafetyViolation>,
    pub warnings: Vec<SafetyWarning>,
    /// True iff there are no violations; warnings never block
    pub safe: bool,
}

/// Kind of form-design issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignIssueKind {
    TooManyFields,
    ForbiddenField,
    NeedsDisclaimer,
}

/// A single form-design issue
#[derive(Debug, Clone, Serialize)]
pub struct DesignIssue {
    pub kind: DesignIssueKind,
    /// Offending field id, when the issue concerns a specific field
    pub field_id: Option<String>,
    pub reason: String,
    /// Blocking issues make the whole check unsafe
    pub blocking: bool,
}

/// Outcome of a form-design validation
#[derive(Debug, Clone, Serialize)]
pub struct DesignCheck {
    pub issues: Vec<DesignIssue>,
    /// True iff no blocking issue was found
    pub safe: bool,
}

/// Pattern-based guardrails engine
///
/// Constructed once at process start and shared by reference; the only
/// interior state is the capped violation log.
pub struct GuardrailsEngine {
    config: GuardrailsConfig,
    log: Mutex<ViolationLog>,
}

impl GuardrailsEngine {
    pub fn new(config: GuardrailsConfig) -> Self {
        let log = ViolationLog::new(config.violation_log_capacity);
        Self {
            config,
            log: Mutex::new(log),
        }
    }

    /// Classify free text for unsafe or sensitive content
    ///
    /// Violations come from keyword-category matches and block; warnings
    /// come from the sensitive-pattern regexes and do not. Empty input is
    /// trivially safe.
    pub fn check_content_safety(&self, text: &str) -> SafetyCheck {
        let lowered = text.to_lowercase();

        let mut violations = Vec::new();
        for (category, keywords) in UNSAFE_CATEGORIES {
            for keyword in *keywords {
                if lowered.contains(keyword) {
                    violations.push(SafetyViolation {
                        category: (*category).to_string(),
                        matched: (*keyword).to_string(),
                    });
                    break;
                }
            }
        }

        let mut warnings = Vec::new();
        for (kind, pattern) in SENSITIVE_PATTERNS.iter() {
            if pattern.is_match(text) {
                warnings.push(SafetyWarning {
                    kind: (*kind).to_string(),
                    note: format!("Nội dung có thể chứa thông tin nhạy cảm ({kind})"),
                });
            }
        }

        let safe = violations.is_empty();
        SafetyCheck {
            violations,
            warnings,
            safe,
        }
    }

    /// Validate a form draft against design rules
    ///
    /// Forbidden fields and oversized forms block; sensitive-topic fields
    /// only request a disclaimer.
    pub fn validate_form_design(&self, form: &FormDraft) -> DesignCheck {
        let mut issues = Vec::new();

        if form.fields.len() > self.config.max_form_fields {
            issues.push(DesignIssue {
                kind: DesignIssueKind::TooManyFields,
                field_id: None,
                reason: format!(
                    "Form has {} fields, maximum is {}",
                    form.fields.len(),
                    self.config.max_form_fields
                ),
                blocking: true,
            });
        }

        for field in &form.fields {
            let haystack = format!("{} {}", field.label, field.id);

            for (name, pattern, reason) in FORBIDDEN_FIELD_PATTERNS.iter() {
                if pattern.is_match(&haystack) {
                    issues.push(DesignIssue {
                        kind: DesignIssueKind::ForbiddenField,
                        field_id: Some(field.id.clone()),
                        reason: format!("{reason} (matched {name} on \"{}\")", field.label),
                        blocking: true,
                    });
                }
            }

            for (topic, pattern) in SENSITIVE_TOPIC_PATTERNS.iter() {
                if pattern.is_match(&haystack) {
                    issues.push(DesignIssue {
                        kind: DesignIssueKind::NeedsDisclaimer,
                        field_id: Some(field.id.clone()),
                        reason: format!(
                            "Field \"{}\" touches a sensitive topic ({topic}); add a data-use disclaimer",
                            field.label
                        ),
                        blocking: false,
                    });
                }
            }
        }

        let safe = !issues.iter().any(|i| i.blocking);
        DesignCheck { issues, safe }
    }

    /// Improve a low-quality response
    ///
    /// Appends a clarifying suggestion to "don't know" answers, an offer
    /// to elaborate on bare yes/no answers, and pads answers shorter than
    /// the configured minimum with a generic expansion.
    pub fn improve_response(&self, text: &str, topic: Option<&str>) -> String {
        let trimmed = text.trim();

        if DONT_KNOW.is_match(trimmed) {
            let suggestion = match topic {
                Some(topic) => format!(
                    " Bạn có thể mô tả rõ hơn yêu cầu về {topic} để mình tìm hướng xử lý phù hợp."
                ),
                None => {
                    " Bạn có thể mô tả rõ hơn yêu cầu để mình tìm hướng xử lý phù hợp.".to_string()
                }
            };
            return format!("{trimmed}{suggestion}");
        }

        let bare = trimmed.trim_end_matches(['.', '!']).to_lowercase();
        if matches!(bare.as_str(), "có" | "không" | "yes" | "no" | "ok") {
            return format!("{trimmed} Mình giải thích thêm nhé: bạn muốn biết chi tiết phần nào?");
        }

        if trimmed.chars().count() < self.config.min_response_chars {
            let mut rng = rand::thread_rng();
            let expansion = GENERIC_EXPANSIONS
                .choose(&mut rng)
                .copied()
                .unwrap_or(GENERIC_EXPANSIONS[0]);
            return format!("{trimmed} {expansion}");
        }

        trimmed.to_string()
    }

    /// Append a violation to the capped log
    pub fn log_violation(&self, record: ViolationRecord) {
        if let Ok(mut log) = self.log.lock() {
            log.push(record);
        }
    }

    /// Record every violation from a safety check, tagged with its source
    pub fn log_safety_violations(&self, check: &SafetyCheck, source: &str) {
        for violation in &check.violations {
            self.log_violation(ViolationRecord::new(
                violation.category.clone(),
                Severity::High,
                format!("{source}: matched \"{}\"", violation.matched),
            ));
        }
    }

    /// Aggregate violation counts grouped by type
    pub fn violation_stats(&self) -> BTreeMap<String, usize> {
        self.log
            .lock()
            .map(|log| log.stats())
            .unwrap_or_default()
    }
}
