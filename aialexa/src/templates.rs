//! HTML templates rendered by the service.

use minijinja::Environment;

pub const EMBED_CHAT: &str = "embed_chat.html";

/// Heading shown above the embedded chat window
pub const EMBED_HEADING: &str = "AI Tutor";

/// Build the template environment. `.html` templates are auto-escaped.
pub fn environment() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template(EMBED_CHAT, include_str!("../templates/embed_chat.html"))?;
    Ok(env)
}
