//! Structured reply expected from the interpretation service

use serde::Deserialize;
use serde_json::{json, Value};

use super::InterpretError;
use crate::reminders::ReminderCategory;

/// What the service decided the utterance was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyAction {
    AddReminder,
    Chat,
    Error,
}

/// `{action, text?, type?, response?}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceReply {
    pub action: ReplyAction,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "type")]
    pub category: Option<ReminderCategory>,
    #[serde(default)]
    pub response: Option<String>,
}

impl ServiceReply {
    /// Parse exactly one JSON object; empty or malformed payloads are errors
    pub fn parse(raw: &str) -> Result<Self, InterpretError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InterpretError::EmptyResponse);
        }
        serde_json::from_str(trimmed).map_err(|e| InterpretError::Malformed(e.to_string()))
    }

    pub fn reminder_text(&self) -> Option<&str> {
        non_blank(self.text.as_deref())
    }

    pub fn spoken_response(&self) -> Option<&str> {
        non_blank(self.response.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Classification prompt for one utterance
pub fn classification_prompt(utterance: &str) -> String {
    format!(
        "Você é o \"Smart Home\", o assistente de voz desta casa.\n\
         Comando recebido: \"{utterance}\".\n\
         Responda somente com um objeto JSON.\n\
         Se o comando pede para guardar um lembrete, tarefa, item de compras ou aviso, \
         use action=\"add_reminder\" e coloque em text um resumo curto do lembrete.\n\
         Se for pergunta, cumprimento ou conversa, use action=\"chat\".\n\
         Em response escreva uma resposta curta (no máximo duas frases) em pt-BR."
    )
}

/// Response schema in the service's OpenAPI subset
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "action": {
                "type": "STRING",
                "enum": ["add_reminder", "chat", "error"]
            },
            "text": {
                "type": "STRING",
                "description": "Texto resumido do lembrete, quando houver"
            },
            "type": {
                "type": "STRING",
                "enum": ["info", "alert", "action"],
                "description": "alert para urgente, action para tarefa, info no resto"
            },
            "response": {
                "type": "STRING",
                "description": "Resposta curta e simpática em pt-BR"
            }
        },
        "required": ["action"]
    })
}
