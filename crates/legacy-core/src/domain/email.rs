//! Email values and `{name}` placeholder rendering.

use serde::{Deserialize, Serialize};

use super::ids::ThreadId;

/// Subject and body templates, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

impl EmailTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Named values substituted into a template, in insertion order.
pub type EmailVariables = Vec<(&'static str, String)>;

/// Outbound email with subject and body already rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    /// Conversation to reply in; `None` starts a new one.
    pub thread_id: Option<ThreadId>,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn render(
        thread_id: Option<ThreadId>,
        sender: &str,
        recipient: &str,
        template: &EmailTemplate,
        variables: &EmailVariables,
    ) -> Self {
        Self {
            thread_id,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            subject: render_template(&template.subject, variables),
            body: render_template(&template.body, variables),
        }
    }
}

/// Replaces every literal `{name}` occurrence. Unknown placeholders stay as they are.
pub fn render_template(template: &str, variables: &EmailVariables) -> String {
    variables
        .iter()
        .fold(template.to_string(), |rendered, (name, value)| {
            rendered.replace(&format!("{{{name}}}"), value)
        })
}
