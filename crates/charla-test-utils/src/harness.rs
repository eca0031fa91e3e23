// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end gateway testing.
//!
//! `GatewayHarness` assembles the full application container with a temp
//! SQLite database, the in-memory key-value store, and a wiremock LLM
//! endpoint, then exposes the real router plus correctly signed webhook
//! requests to drive the whole pipeline in tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use charla_anthropic::AnthropicClient;
use charla_cache::MemoryStore;
use charla_config::model::{
    AnthropicConfig, CharlaConfig, Environment, RateLimitConfig, ServerConfig, TwilioConfig,
};
use charla_gateway::{router, AppContainer};
use charla_storage::{ConversationRepository, Database, MessageRepository, UserRepository};
use charla_twilio::SignatureVerifier;
use http_body_util::BodyExt;
use secrecy::SecretString;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Auth token every harness signs with.
pub const TEST_AUTH_TOKEN: &str = "test-auth-token";

/// Host header used for signature reconstruction.
pub const TEST_HOST: &str = "gateway.test";

/// The webhook path.
pub const WEBHOOK_PATH: &str = "/webhook/whatsapp";

/// Builder for configuring the harness.
pub struct GatewayHarnessBuilder {
    environment: Environment,
    rate_limit: RateLimitConfig,
    trust_proxy: bool,
    default_llm_text: Option<String>,
}

impl GatewayHarnessBuilder {
    fn new() -> Self {
        Self {
            environment: Environment::Test,
            rate_limit: RateLimitConfig::default(),
            trust_proxy: false,
            default_llm_text: Some("Respuesta automática".to_string()),
        }
    }

    /// Overrides the deployment environment (e.g. `Development` to skip
    /// signature verification).
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Tunes the rate limiter axes.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Trust `X-Forwarded-For` for client-IP extraction.
    pub fn with_trust_proxy(mut self) -> Self {
        self.trust_proxy = true;
        self
    }

    /// Default completion text returned by the mock LLM endpoint.
    pub fn with_llm_text(mut self, text: &str) -> Self {
        self.default_llm_text = Some(text.to_string());
        self
    }

    /// Mounts nothing on the LLM endpoint; the test supplies its own
    /// mocks via [`GatewayHarness::llm_server`].
    pub fn without_default_llm(mut self) -> Self {
        self.default_llm_text = None;
        self
    }

    /// Builds the harness: temp database, in-memory KV, mock LLM,
    /// container, router.
    pub async fn build(self) -> GatewayHarness {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db_path = temp_dir.path().join("charla-test.db");
        let db = Database::open(db_path.to_str().expect("utf-8 temp path"))
            .await
            .expect("open temp database");

        let kv = Arc::new(MemoryStore::new());
        let llm_server = MockServer::start().await;

        if let Some(text) = &self.default_llm_text {
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(text)))
                .mount(&llm_server)
                .await;
        }

        let config = CharlaConfig {
            server: ServerConfig {
                environment: self.environment,
                trust_proxy: self.trust_proxy,
                ..ServerConfig::default()
            },
            twilio: TwilioConfig {
                account_sid: Some("ACtest".into()),
                auth_token: Some(TEST_AUTH_TOKEN.into()),
                phone_number: Some("whatsapp:+15550000000".into()),
            },
            anthropic: AnthropicConfig {
                api_key: Some("test-api-key".into()),
                ..AnthropicConfig::default()
            },
            rate_limit: self.rate_limit,
            ..CharlaConfig::default()
        };

        let client = AnthropicClient::new("test-api-key")
            .expect("client")
            .with_base_url(llm_server.uri());

        let app = AppContainer::assemble(config, db.clone(), kv.clone(), client);
        let router = router(app.clone());

        GatewayHarness {
            users: UserRepository::new(db.clone()),
            conversations: ConversationRepository::new(db.clone()),
            messages: MessageRepository::new(db),
            app,
            router,
            kv,
            llm_server,
            _temp_dir: temp_dir,
        }
    }
}

/// A complete gateway environment with handles for assertions.
pub struct GatewayHarness {
    /// The assembled application container.
    pub app: Arc<AppContainer>,
    /// The real router, stages and all.
    pub router: Router,
    /// The in-memory key-value store (rate counters, context cache).
    pub kv: Arc<MemoryStore>,
    /// The mock LLM endpoint.
    pub llm_server: MockServer,
    /// Direct repository handles for store assertions.
    pub users: UserRepository,
    pub conversations: ConversationRepository,
    pub messages: MessageRepository,
    _temp_dir: tempfile::TempDir,
}

impl GatewayHarness {
    pub fn builder() -> GatewayHarnessBuilder {
        GatewayHarnessBuilder::new()
    }

    /// Sends a correctly signed webhook POST with the given form fields.
    pub async fn post_webhook(&self, form: &[(&str, &str)]) -> Response<Body> {
        let pairs: Vec<(String, String)> = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let signature = self.sign(&pairs);
        self.post_webhook_raw(
            "application/x-www-form-urlencoded",
            Some(&signature),
            encode_form(&pairs),
        )
        .await
    }

    /// Sends a webhook POST with full control over content type and
    /// signature header.
    pub async fn post_webhook_raw(
        &self,
        content_type: &str,
        signature: Option<&str>,
        body: String,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(WEBHOOK_PATH)
            .header(header::HOST, TEST_HOST)
            .header(header::CONTENT_TYPE, content_type);
        if let Some(signature) = signature {
            builder = builder.header("X-Twilio-Signature", signature);
        }
        let request = builder.body(Body::from(body)).expect("request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Sends a GET to the health endpoint.
    pub async fn get_health(&self) -> Response<Body> {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .body(Body::empty())
            .expect("request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Signature over the harness URL and the given form pairs, exactly
    /// as the provider would compute it.
    pub fn sign(&self, pairs: &[(String, String)]) -> String {
        SignatureVerifier::new(SecretString::from(TEST_AUTH_TOKEN))
            .sign(&format!("http://{TEST_HOST}{WEBHOOK_PATH}"), pairs)
    }
}

/// Reads a response body to a string.
pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// A well-formed Messages API completion body.
pub fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_harness",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": "claude-sonnet-4-20250514",
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 20}
    })
}

fn encode_form(pairs: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
