//! Tagged request variants for the agent fleet.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::Display;

/// The agents reachable from the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentKind {
    Transcription,
    Rag,
    Memory,
    WebSearch,
}

/// Memory retention tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemoryType {
    ShortTerm,
    LongTerm,
}

/// Property search criteria extracted from a user message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchCriteria {
    pub property_type: Option<String>,
    pub location: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// A typed request to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentTask {
    /// Transcribe audio fetched from a URL.
    TranscribeUrl {
        audio_url: String,
        content_type: Option<String>,
        language: Option<String>,
        use_cache: bool,
    },
    /// Retrieval-augmented query over the domain knowledge base.
    RagQuery {
        query: String,
        top_k: u32,
        min_similarity: f64,
        #[serde(default)]
        filters: Value,
        use_cache: bool,
        system_prompt: Option<String>,
        temperature: f32,
    },
    /// Fetch the aggregated context for a user.
    MemoryGetUserContext { user_id: String },
    /// Store one memory item.
    MemoryStore {
        user_id: String,
        conversation_id: String,
        content: String,
        memory_type: MemoryType,
        #[serde(default)]
        metadata: Value,
    },
    /// Similarity search over a user's memories.
    MemorySearch {
        user_id: String,
        query: String,
        memory_types: Vec<MemoryType>,
        limit: u32,
        similarity_threshold: f64,
    },
    /// Property search with structured criteria.
    PropertySearch { criteria: SearchCriteria },
    /// Fallback for capabilities without a dedicated schema.
    Generic {
        agent: AgentKind,
        task_type: String,
        data: Value,
    },
}

/// HTTP method for an agent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMethod {
    Get,
    Post,
}

impl AgentTask {
    /// Which agent serves this task.
    pub fn agent(&self) -> AgentKind {
        match self {
            Self::TranscribeUrl { .. } => AgentKind::Transcription,
            Self::RagQuery { .. } => AgentKind::Rag,
            Self::MemoryGetUserContext { .. }
            | Self::MemoryStore { .. }
            | Self::MemorySearch { .. } => AgentKind::Memory,
            Self::PropertySearch { .. } => AgentKind::WebSearch,
            Self::Generic { agent, .. } => *agent,
        }
    }

    /// Function name used for breaker keying and logs.
    pub fn function(&self) -> &'static str {
        match self {
            Self::TranscribeUrl { .. } => "transcribe_url",
            Self::RagQuery { .. } => "query",
            Self::MemoryGetUserContext { .. } => "get_user_context",
            Self::MemoryStore { .. } => "store",
            Self::MemorySearch { .. } => "search",
            Self::PropertySearch { .. } => "search",
            Self::Generic { .. } => "execute",
        }
    }

    /// HTTP method for the request.
    pub fn method(&self) -> TaskMethod {
        match self {
            Self::MemoryGetUserContext { .. } => TaskMethod::Get,
            _ => TaskMethod::Post,
        }
    }

    /// Request path relative to the agent base URL.
    pub fn path(&self) -> String {
        match self {
            Self::TranscribeUrl { .. } => "/transcription/transcribe_url".to_string(),
            Self::RagQuery { .. } => "/rag/query".to_string(),
            Self::MemoryGetUserContext { user_id } => format!("/user/{}/context", user_id),
            Self::MemoryStore { .. } => "/store".to_string(),
            Self::MemorySearch { .. } => "/search".to_string(),
            Self::PropertySearch { .. } => "/search".to_string(),
            Self::Generic { .. } => "/execute".to_string(),
        }
    }

    /// Request body (None for GET requests).
    pub fn body(&self) -> Option<Value> {
        match self {
            Self::TranscribeUrl {
                audio_url,
                content_type,
                language,
                use_cache,
            } => Some(json!({
                "audio_url": audio_url,
                "content_type": content_type,
                "language": language,
                "use_cache": use_cache,
            })),
            Self::RagQuery {
                query,
                top_k,
                min_similarity,
                filters,
                use_cache,
                system_prompt,
                temperature,
            } => Some(json!({
                "query": query,
                "top_k": top_k,
                "min_similarity": min_similarity,
                "filters": filters,
                "use_cache": use_cache,
                "system_prompt": system_prompt,
                "temperature": temperature,
            })),
            Self::MemoryGetUserContext { .. } => None,
            Self::MemoryStore {
                user_id,
                conversation_id,
                content,
                memory_type,
                metadata,
            } => Some(json!({
                "user_id": user_id,
                "conversation_id": conversation_id,
                "content": content,
                "memory_type": memory_type,
                "metadata": metadata,
            })),
            Self::MemorySearch {
                user_id,
                query,
                memory_types,
                limit,
                similarity_threshold,
            } => Some(json!({
                "user_id": user_id,
                "query": query,
                "memory_types": memory_types,
                "limit": limit,
                "similarity_threshold": similarity_threshold,
            })),
            Self::PropertySearch { criteria } => Some(json!({
                "query": criteria.property_type,
                "city": criteria.location.clone().unwrap_or_else(|| "Uberlândia".to_string()),
                "state": "MG",
                "property_type": criteria.property_type.clone().unwrap_or_else(|| "any".to_string()),
                "min_price": criteria.price_min,
                "max_price": criteria.price_max,
                "bedrooms": criteria.bedrooms,
                "bathrooms": criteria.bathrooms,
                "features": criteria.features,
            })),
            Self::Generic {
                task_type, data, ..
            } => Some(json!({
                "task_type": task_type,
                "data": data,
            })),
        }
    }

    /// Convenience constructor for a RAG query with the default knobs.
    pub fn rag_query(query: impl Into<String>) -> Self {
        Self::RagQuery {
            query: query.into(),
            top_k: 5,
            min_similarity: 0.5,
            filters: json!({"document_type": "real_estate"}),
            use_cache: true,
            system_prompt: None,
            temperature: 0.7,
        }
    }

    /// Convenience constructor for a memory search with the default knobs.
    pub fn memory_search(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self::MemorySearch {
            user_id: user_id.into(),
            query: query.into(),
            memory_types: vec![MemoryType::ShortTerm, MemoryType::LongTerm],
            limit: 3,
            similarity_threshold: 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_routing() {
        let task = AgentTask::TranscribeUrl {
            audio_url: "https://cdn/audio.ogg".to_string(),
            content_type: Some("audio/ogg".to_string()),
            language: Some("pt".to_string()),
            use_cache: true,
        };
        assert_eq!(task.agent(), AgentKind::Transcription);
        assert_eq!(task.path(), "/transcription/transcribe_url");
        assert_eq!(task.method(), TaskMethod::Post);
        assert_eq!(task.function(), "transcribe_url");
    }

    #[test]
    fn test_memory_get_is_a_get() {
        let task = AgentTask::MemoryGetUserContext {
            user_id: "u-1".to_string(),
        };
        assert_eq!(task.agent(), AgentKind::Memory);
        assert_eq!(task.method(), TaskMethod::Get);
        assert_eq!(task.path(), "/user/u-1/context");
        assert!(task.body().is_none());
    }

    #[test]
    fn test_rag_query_body() {
        let body = AgentTask::rag_query("o que é ITBI?").body().unwrap();
        assert_eq!(body["query"], "o que é ITBI?");
        assert_eq!(body["top_k"], 5);
        assert_eq!(body["filters"]["document_type"], "real_estate");
    }

    #[test]
    fn test_property_search_body_defaults() {
        let task = AgentTask::PropertySearch {
            criteria: SearchCriteria {
                bedrooms: Some(3),
                price_max: Some(500_000.0),
                ..Default::default()
            },
        };
        let body = task.body().unwrap();
        assert_eq!(body["city"], "Uberlândia");
        assert_eq!(body["state"], "MG");
        assert_eq!(body["property_type"], "any");
        assert_eq!(body["bedrooms"], 3);
        assert_eq!(body["max_price"], 500_000.0);
    }

    #[test]
    fn test_task_serde_tagging() {
        let task = AgentTask::MemoryStore {
            user_id: "u-1".to_string(),
            conversation_id: "c-1".to_string(),
            content: "gosta de casas".to_string(),
            memory_type: MemoryType::LongTerm,
            metadata: json!({}),
        };

        let raw = serde_json::to_value(&task).unwrap();
        assert_eq!(raw["type"], "memory_store");
        assert_eq!(raw["memory_type"], "long_term");

        let back: AgentTask = serde_json::from_value(raw).unwrap();
        assert_eq!(back.agent(), AgentKind::Memory);
    }

    #[test]
    fn test_criteria_deserializes_partial_json() {
        let criteria: SearchCriteria = serde_json::from_str(
            r#"{"property_type":"casa","location":"Uberlândia","bedrooms":3}"#,
        )
        .unwrap();
        assert_eq!(criteria.property_type.as_deref(), Some("casa"));
        assert_eq!(criteria.bedrooms, Some(3));
        assert!(criteria.features.is_empty());
    }
}
