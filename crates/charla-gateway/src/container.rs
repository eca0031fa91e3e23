// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The application container.
//!
//! Owns the process-wide handles (database, key-value store, LLM client)
//! and the services built over them. Components receive the container at
//! construction; nothing reaches for globals, and tests inject fakes by
//! assembling a container from their own parts.

use std::sync::Arc;
use std::time::Instant;

use charla_anthropic::{AnthropicClient, LlmOptions, LlmService, PriceTable};
use charla_cache::RedisStore;
use charla_config::{ensure_valid, CharlaConfig, Environment};
use charla_conversation::{ConversationService, MessageService};
use charla_core::{CharlaError, KeyValueStore};
use charla_storage::{ConversationRepository, Database, MessageRepository, UserRepository};
use charla_twilio::SignatureVerifier;
use secrecy::SecretString;
use tracing::{info, warn};

/// Shared application state: one per process, cloned by `Arc`.
pub struct AppContainer {
    pub config: CharlaConfig,
    pub db: Database,
    pub kv: Arc<dyn KeyValueStore>,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub llm: LlmService,
    pub verifier: Option<SignatureVerifier>,
    pub started_at: Instant,
}

impl AppContainer {
    /// Builds the production container: validates config, opens the
    /// database, connects to Redis, and wires the services.
    pub async fn build(config: CharlaConfig) -> Result<Arc<Self>, CharlaError> {
        ensure_valid(&config)?;

        let db = Database::open(&config.database.url).await?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(RedisStore::connect(&config.redis.url).await?);

        let api_key = config.anthropic.api_key.clone().unwrap_or_default();
        let client = AnthropicClient::new(&api_key)?;

        Ok(Self::assemble(config, db, kv, client))
    }

    /// Wires services over already-constructed handles. The test harness
    /// calls this with a temp database, an in-memory store, and a client
    /// pointed at a mock endpoint.
    pub fn assemble(
        config: CharlaConfig,
        db: Database,
        kv: Arc<dyn KeyValueStore>,
        client: AnthropicClient,
    ) -> Arc<Self> {
        let users = UserRepository::new(db.clone());
        let conversation_repo = ConversationRepository::new(db.clone());
        let message_repo = MessageRepository::new(db.clone());

        let conversations = ConversationService::new(
            users,
            conversation_repo.clone(),
            message_repo.clone(),
            kv.clone(),
        );
        let messages = MessageService::new(message_repo, conversation_repo, kv.clone());

        let llm = LlmService::new(
            client,
            LlmOptions {
                model: config.anthropic.model.clone(),
                max_tokens: config.anthropic.max_tokens,
                temperature: config.anthropic.temperature,
                system_prompt: config.anthropic.system_prompt.clone(),
                pricing: PriceTable::for_model(&config.anthropic.model),
            },
        );

        let verifier = match config.twilio.auth_token.as_deref() {
            Some(token) if !token.is_empty() => {
                Some(SignatureVerifier::new(SecretString::from(token.to_string())))
            }
            _ => {
                if config.server.environment != Environment::Development {
                    warn!("no twilio auth token configured -- webhook requests will be rejected");
                }
                None
            }
        };

        info!(
            environment = config.server.environment.as_str(),
            model = %config.anthropic.model,
            "application container assembled"
        );

        Arc::new(Self {
            config,
            db,
            kv,
            conversations,
            messages,
            llm,
            verifier,
            started_at: Instant::now(),
        })
    }

    /// Development mode skips signature verification; everywhere else it
    /// is mandatory.
    pub fn dev_mode(&self) -> bool {
        self.config.server.environment == Environment::Development
    }
}
