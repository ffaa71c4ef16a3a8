use crate::{
    AppState,
    errors::{Error, Result},
    templates::{EMBED_CHAT, EMBED_HEADING},
    types::ChatbotId,
};
use axum::{
    extract::{Path, State},
    response::Html,
};
use minijinja::{Value, context};

#[utoipa::path(
    get,
    path = "/chatbot/{chatbot_id}/chat",
    tag = "embed",
    summary = "Chat page",
    description = "Full-page chat for a chatbot, wrapping the embeddable chat window in an iframe.",
    responses(
        (status = 200, description = "HTML page", content_type = "text/html"),
        (status = 404, description = "Chatbot not found")
    ),
    params(
        ("chatbot_id" = String, Path, description = "The ID of the chatbot")
    )
)]
pub async fn chat_page(State(state): State<AppState>, Path(chatbot_id): Path<String>) -> Result<Html<String>> {
    let not_found = || Error::NotFound {
        resource: "Chatbot".to_string(),
        id: chatbot_id.clone(),
    };

    let id = chatbot_id.parse::<ChatbotId>().map_err(|_| not_found())?;
    let chatbot = state.store.get_chatbot(id).await?.ok_or_else(not_found)?;

    // Built from a parsed UUID, nothing to escape
    let window_url = Value::from_safe_string(format!("/embed/{}/window?chatbox=false", chatbot.id));

    let html = state
        .templates
        .get_template(EMBED_CHAT)
        .and_then(|template| {
            template.render(context! {
                chatbot_name => chatbot.name,
                heading => EMBED_HEADING,
                window_url => window_url,
            })
        })
        .map_err(|e| Error::Internal {
            operation: format!("render chat page: {e}"),
        })?;

    Ok(Html(html))
}
