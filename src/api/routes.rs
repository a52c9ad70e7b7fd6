use actix_web::{error::InternalError, get, http::StatusCode, post, web, HttpResponse, Responder};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::models::{ApiResponse, ChatRequest, ProbeResponse, SettingsPayload};
use crate::llm::{
    models::{ChatOptions, Message as LlmMessage},
    LlmError, LlmProvider,
};

pub const MESSAGES_REQUIRED: &str = "Messages array is required";
pub const UNEXPECTED_RESPONSE: &str = "Unexpected response from AI service";

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

#[post("/chat")]
pub async fn submit_chat(
    llm: web::Data<Arc<dyn LlmProvider>>,
    req: web::Json<ChatRequest>,
) -> HttpResponse {
    let req = req.into_inner();

    let messages = match req.messages {
        Some(messages) if !messages.is_empty() => messages,
        _ => {
            warn!("rejecting chat request without messages");
            return HttpResponse::BadRequest().json(ApiResponse::error(MESSAGES_REQUIRED));
        }
    };

    let llm_messages: Vec<LlmMessage> = messages
        .into_iter()
        .map(|m| LlmMessage {
            role: m.role,
            content: m.content,
        })
        .collect();

    let options = chat_options(req.settings.unwrap_or_default());
    info!(
        provider = llm.name(),
        messages = llm_messages.len(),
        model = options.model.as_deref().unwrap_or(llm.default_model()),
        "relaying chat request"
    );

    match llm.chat(&llm_messages, options).await {
        Ok(response) => HttpResponse::Ok().json(ApiResponse::ok(response.content)),
        Err(e) => {
            error!(error = %e, "chat relay failed");
            HttpResponse::InternalServerError().json(ApiResponse::error(public_error(&e)))
        }
    }
}

#[get("/chat")]
pub async fn probe(llm: web::Data<Arc<dyn LlmProvider>>) -> HttpResponse {
    HttpResponse::Ok().json(ProbeResponse {
        message: "Chat API is running".to_string(),
        model: llm.default_model().to_string(),
        endpoint: "POST /api/chat".to_string(),
    })
}

/// Caller settings override provider defaults only when they carry a value;
/// empty strings and a zero temperature count as unset.
fn chat_options(settings: SettingsPayload) -> ChatOptions {
    ChatOptions {
        model: settings.model.filter(|m| !m.trim().is_empty()),
        temperature: settings.temperature.filter(|t| *t != 0.0),
        system_prompt: settings.system_prompt.filter(|p| !p.trim().is_empty()),
    }
}

/// What the browser is allowed to see; provider bodies stay in the logs.
fn public_error(err: &LlmError) -> String {
    match err {
        LlmError::Api { status, .. } => {
            let reason = StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("");
            format!("AI service error: {} {}", status, reason).trim_end().to_string()
        }
        LlmError::UnexpectedResponse => UNEXPECTED_RESPONSE.to_string(),
        LlmError::Network(_) => "Failed to reach AI service".to_string(),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let body = ApiResponse::error(format!("Invalid request body: {}", err));
        InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    });

    cfg.service(health).service(
        web::scope("/api")
            .app_data(json_config)
            .service(submit_chat)
            .service(probe),
    );
}
