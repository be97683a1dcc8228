//! Deterministic fallback responses
//!
//! When the AI backend is disabled or a call fails, the responder
//! synthesizes a canned Vietnamese reply from the last user message and
//! any form context found in the system prompt. No I/O, no failure
//! modes: every input maps to some usable text.

use regex::Regex;
use std::sync::LazyLock;

use crate::ai::{AiErrorKind, ChatMessage};
use crate::conversation::Role;

/// Form context extracted from a system prompt, e.g. `Form "X" (3 trường)`
static FORM_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Form\s+"([^"]+)"\s*\((\d+)\s*trường\)"#).expect("form marker must compile")
});

/// Greeting intents; word-bounded so `hi` matches alone without firing
/// inside longer words
static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(xin chào|chào|hello|hi|hey)\b").expect("greeting pattern must compile")
});
const HELP_KEYWORDS: &[&str] = &["giúp", "help", "hướng dẫn", "làm sao", "làm thế nào"];
const CREATE_KEYWORDS: &[&str] = &["tạo form", "create form", "làm form", "biểu mẫu", "tạo biểu"];

const STATUS_KEYWORDS: &[&str] = &["trạng thái", "hiện tại", "đang có", "status", "bao nhiêu trường"];
const SAVE_KEYWORDS: &[&str] = &["lưu", "save", "hoàn thành", "xong rồi"];
const FIELD_KEYWORDS: &[&str] = &["trường", "field", "thêm", "xóa", "sửa", "đổi"];

/// Form details parsed out of a system prompt
#[derive(Debug, Clone, PartialEq)]
struct FormContext {
    title: String,
    field_count: u32,
}

/// Deterministic text generator used when the LLM path fails
#[derive(Debug, Clone)]
pub struct FallbackResponder {
    assistant_name: String,
}

impl FallbackResponder {
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
        }
    }

    /// Synthesize a reply for a batch of role-tagged messages
    ///
    /// Routes to the form-aware generator when the system message carries
    /// a form marker, otherwise to the general buckets. An error-class
    /// hint is appended when the underlying failure is known.
    pub fn respond(&self, messages: &[ChatMessage], error: Option<AiErrorKind>) -> String {
        let user_text = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();

        let form_context = messages
            .iter()
            .find(|m| m.role == Role::System)
            .and_then(|m| parse_form_marker(&m.content));

        let mut reply = match form_context {
            Some(form) => self.form_aware_reply(&user_text, &form),
            None => self.general_reply(&user_text),
        };

        if let Some(hint) = error.and_then(error_hint) {
            reply.push_str("\n\n");
            reply.push_str(hint);
        }

        reply
    }

    fn form_aware_reply(&self, user_text: &str, form: &FormContext) -> String {
        if contains_any(user_text, STATUS_KEYWORDS) {
            return format!(
                "Form \"{}\" của bạn hiện có {} trường. Bạn muốn thêm, sửa hay xóa trường nào không?",
                form.title, form.field_count
            );
        }
        if contains_any(user_text, SAVE_KEYWORDS) {
            return format!(
                "Mình đã ghi nhận yêu cầu lưu form \"{}\" ({} trường). Bạn bấm nút Lưu để hoàn tất, dữ liệu hiện tại sẽ được giữ nguyên.",
                form.title, form.field_count
            );
        }
        if contains_any(user_text, FIELD_KEYWORDS) {
            return format!(
                "Mình hiểu bạn muốn chỉnh các trường của form \"{}\". Bạn mô tả cụ thể trường cần thay đổi (tên trường và thay đổi mong muốn) để mình xử lý ngay nhé.",
                form.title
            );
        }
        format!(
            "Bạn đang làm việc với form \"{}\" ({} trường). Bạn có thể hỏi về trạng thái form, chỉnh sửa trường, hoặc lưu form.",
            form.title, form.field_count
        )
    }

    fn general_reply(&self, user_text: &str) -> String {
        if GREETING.is_match(user_text) {
            return format!(
                "Xin chào! Mình là {}, trợ lý giúp bạn tạo và chỉnh sửa form thu thập dữ liệu. Bạn muốn bắt đầu với form nào hôm nay?",
                self.assistant_name
            );
        }
        if contains_any(user_text, HELP_KEYWORDS) {
            return format!(
                "{} có thể giúp bạn: tạo form mới từ mô tả, thêm/sửa/xóa trường, và lưu form khi hoàn tất. Hãy mô tả form bạn cần nhé.",
                self.assistant_name
            );
        }
        if contains_any(user_text, CREATE_KEYWORDS) {
            return "Mình sẽ giúp bạn tạo form. Bạn cho mình biết mục đích của form và những thông tin cần thu thập (ví dụ: họ tên, email, số điện thoại) nhé.".to_string();
        }
        "Xin lỗi, trợ lý AI đang tạm thời gián đoạn nên mình chỉ trả lời được các thao tác cơ bản. Bạn vẫn có thể mô tả form cần tạo hoặc yêu cầu chỉnh sửa trường.".to_string()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn parse_form_marker(system_content: &str) -> Option<FormContext> {
    let caps = FORM_MARKER.captures(system_content)?;
    Some(FormContext {
        title: caps[1].to_string(),
        field_count: caps[2].parse().ok()?,
    })
}

fn error_hint(kind: AiErrorKind) -> Option<&'static str> {
    match kind {
        AiErrorKind::Config | AiErrorKind::NotFound => Some(
            "(Lưu ý: cấu hình AI chưa đúng — vui lòng kiểm tra endpoint và deployment của dịch vụ.)",
        ),
        AiErrorKind::Auth => {
            Some("(Lưu ý: khóa API không hợp lệ — vui lòng kiểm tra lại cấu hình xác thực.)")
        }
        AiErrorKind::RateLimited | AiErrorKind::Transient => {
            Some("(Trợ lý AI sẽ sớm hoạt động trở lại, bạn vui lòng thử lại sau ít phút.)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder() -> FallbackResponder {
        FallbackResponder::new("FormAgent")
    }

    fn user(content: &str) -> ChatMessage {
        ChatMessage {
            role: Role::User,
            content: content.to_string(),
        }
    }

    fn system(content: &str) -> ChatMessage {
        ChatMessage {
            role: Role::System,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_greeting_includes_assistant_name() {
        let reply = responder().respond(&[user("xin chào")], None);
        assert!(reply.contains("Xin chào"));
        assert!(reply.contains("FormAgent"));
    }

    #[test]
    fn test_bare_greeting_words_match() {
        for text in ["hi", "Hi!", "hey", "hello there"] {
            let reply = responder().respond(&[user(text)], None);
            assert!(reply.contains("Xin chào"), "missed greeting in {text:?}");
        }
    }

    #[test]
    fn test_greeting_words_do_not_fire_inside_longer_words() {
        // "hiện" and "chim" contain greeting fragments but are not greetings
        let reply = responder().respond(&[user("trạng thái hiện tại của chim")], None);
        assert!(!reply.contains("Xin chào! Mình là"));
    }

    #[test]
    fn test_save_with_form_context_references_title_and_count() {
        let messages = [
            system("Bạn đang hỗ trợ Form \"Đăng ký sự kiện\" (3 trường)."),
            user("lưu form"),
        ];
        let reply = responder().respond(&messages, None);
        assert!(reply.contains("Đăng ký sự kiện"));
        assert!(reply.contains('3'));
    }

    #[test]
    fn test_status_intent_with_form_context() {
        let messages = [
            system("Form \"Khảo sát\" (5 trường)"),
            user("form hiện tại có gì?"),
        ];
        let reply = responder().respond(&messages, None);
        assert!(reply.contains("Khảo sát"));
        assert!(reply.contains('5'));
    }

    #[test]
    fn test_field_help_with_form_context() {
        let messages = [system("Form \"Liên hệ\" (2 trường)"), user("thêm trường email")];
        let reply = responder().respond(&messages, None);
        assert!(reply.contains("Liên hệ"));
    }

    #[test]
    fn test_create_form_bucket() {
        let reply = responder().respond(&[user("tôi muốn tạo form khảo sát")], None);
        assert!(reply.contains("tạo form"));
    }

    #[test]
    fn test_help_bucket() {
        let reply = responder().respond(&[user("bạn giúp được gì?")], None);
        assert!(reply.contains("FormAgent"));
    }

    #[test]
    fn test_default_bucket() {
        let reply = responder().respond(&[user("thời tiết hôm nay thế nào")], None);
        assert!(!reply.is_empty());
        assert!(reply.contains("Xin lỗi"));
    }

    #[test]
    fn test_empty_messages_still_produce_text() {
        let reply = responder().respond(&[], None);
        assert!(!reply.is_empty());
    }

    #[test]
    fn test_auth_hint_appended() {
        let reply = responder().respond(&[user("xin chào")], Some(AiErrorKind::Auth));
        assert!(reply.contains("khóa API"));
    }

    #[test]
    fn test_config_hint_appended_for_not_found() {
        let reply = responder().respond(&[user("xin chào")], Some(AiErrorKind::NotFound));
        assert!(reply.contains("endpoint"));
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let messages = [user("xin chào")];
        let first = responder().respond(&messages, None);
        let second = responder().respond(&messages, None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_form_marker() {
        let ctx = parse_form_marker("Ngữ cảnh: Form \"Đơn xin nghỉ\" (7 trường) đang mở").unwrap();
        assert_eq!(ctx.title, "Đơn xin nghỉ");
        assert_eq!(ctx.field_count, 7);

        assert!(parse_form_marker("không có form nào").is_none());
    }
}
