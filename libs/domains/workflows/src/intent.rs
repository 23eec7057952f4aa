//! Keyword-based intent classification and workflow routing.
//!
//! Intent selection is purely a routing decision; the chosen workflow may
//! revise the context (audio transcription re-routes to property search, for
//! example).

use serde::{Deserialize, Serialize};
use strum::Display;

/// Classified intent of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    AudioProcessing,
    PropertySearch,
    Greeting,
    Question,
    General,
}

const PROPERTY_KEYWORDS: &[&str] = &[
    "casa",
    "apartamento",
    "imovel",
    "imóvel",
    "comprar",
    "vender",
    "alugar",
    "aluguel",
    "venda",
    "corretor",
    "imobiliaria",
    "imobiliária",
    "terreno",
    "lote",
    "quarto",
    "sala",
    "cozinha",
    "banheiro",
    "garagem",
    "quintal",
    "piscina",
    "valor",
    "preço",
    "preco",
];

const GREETING_KEYWORDS: &[&str] = &[
    "oi",
    "olá",
    "ola",
    "bom dia",
    "boa tarde",
    "boa noite",
    "hello",
    "hi",
    "hey",
    "tchau",
    "ate logo",
];

const QUESTION_KEYWORDS: &[&str] = &[
    "como", "onde", "quando", "quanto", "qual", "que", "quem", "porque", "por que", "?", "ajuda",
    "duvida", "dúvida",
];

/// Classify a message by kind and content keywords.
///
/// Audio always routes to transcription; otherwise property keywords win
/// over greetings, which win over generic question markers.
pub fn classify_intent(content: &str, is_audio: bool) -> Intent {
    if is_audio {
        return Intent::AudioProcessing;
    }

    let lower = content.to_lowercase();

    if PROPERTY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Intent::PropertySearch
    } else if GREETING_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Intent::Greeting
    } else if QUESTION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Intent::Question
    } else {
        Intent::General
    }
}

/// The workflow serving an intent.
pub fn workflow_for(intent: Intent) -> &'static str {
    match intent {
        Intent::AudioProcessing => "audio_processing_workflow",
        Intent::PropertySearch => "property_search_workflow",
        Intent::Greeting => "greeting_workflow",
        Intent::Question => "question_answering_workflow",
        Intent::General => "general_conversation_workflow",
    }
}
