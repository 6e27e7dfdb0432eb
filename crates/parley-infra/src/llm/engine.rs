//! The completion engine.
//!
//! [`CompletionEngine`] resolves a provider from settings, picks the protocol
//! adapter for it, and drives one of two paths:
//!
//! - `get_completion`: single request, full body, normalized result.
//! - `stream_completion`: fire-and-forget task per conversation that decodes
//!   the SSE body and reports through a [`StreamHandler`].
//!
//! Streams are tracked in a [`StreamRegistry`] keyed by conversation id.
//! Starting a second stream for the same conversation cancels the first.
//! A cancelled stream stops delivering callbacks and fires no terminal one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::{Instrument, field};

use parley_core::llm::adapter::{ChatRequest, HttpMethod, HttpRequest, ProtocolAdapter};
use parley_core::llm::api_error::provider_error;
use parley_core::llm::capabilities::merge_capability_map;
use parley_core::llm::handler::StreamHandler;
use parley_core::llm::registry::AdapterRegistry;
use parley_core::llm::stream_registry::StreamRegistry;
use parley_core::llm::tokens::{REQUEST_OVERHEAD, TokenCounter};
use parley_core::settings::SettingsStore;
use parley_observe::genai_attrs::{
    self, GEN_AI_USAGE_INPUT_TOKENS, GEN_AI_USAGE_OUTPUT_TOKENS, OP_CHAT, OP_LIST_MODELS,
};
use parley_types::config::AppConfig;
use parley_types::llm::{
    CompletionResult, LlmError, Message, MessageRole, PartialUsage, StreamEvent, TokenUsage,
    UsageEstimate,
};
use parley_types::local::{ModelDiscovery, RunnerDetection};
use parley_types::provider::{ModelCapabilities, ProviderConfig, ProviderSummary};

use super::capability::ModelCapabilityDetector;
use super::defaults::{apply_defaults, known_provider};
use super::local_runner::LocalRunnerLauncher;
use super::pricing::PricingManager;
use super::default_adapters;

/// Connect timeout for provider requests. There is no overall timeout;
/// streams are bounded by the idle timeout instead.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Text and usage accumulated while decoding a stream.
#[derive(Debug, Default)]
pub(crate) struct StreamOutcome {
    pub content: String,
    pub usage: PartialUsage,
}

/// Orchestrates completions across all configured providers.
///
/// Cheap to clone; clones share the stream registry and caches.
pub struct CompletionEngine<S> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for CompletionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<S> {
    client: reqwest::Client,
    settings: S,
    adapters: AdapterRegistry,
    tokens: TokenCounter,
    pricing: PricingManager,
    streams: StreamRegistry,
    launcher: LocalRunnerLauncher,
    capabilities: ModelCapabilityDetector,
    idle_timeout: Duration,
}

impl<S: SettingsStore + 'static> CompletionEngine<S> {
    /// Build an engine over `settings`, tuned by `[engine]` and `[[pricing]]`
    /// from `config`. Provider entries in `config` are not read here; the
    /// settings store is the only source of provider configuration.
    pub fn new(settings: S, config: &AppConfig) -> Self {
        let engine = &config.engine;
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();

        let inner = EngineInner {
            launcher: LocalRunnerLauncher::new(
                client.clone(),
                engine.local_start_attempts,
                engine.local_start_interval(),
            ),
            capabilities: ModelCapabilityDetector::new(
                client.clone(),
                engine.capability_catalog_url.clone(),
                engine.capability_cache_ttl(),
                engine.capability_fetch_timeout(),
            ),
            client,
            settings,
            adapters: default_adapters(engine),
            tokens: TokenCounter::new(),
            pricing: PricingManager::new(&config.pricing),
            streams: StreamRegistry::new(),
            idle_timeout: engine.stream_idle_timeout(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The settings store this engine reads providers from.
    pub fn settings(&self) -> &S {
        &self.inner.settings
    }

    /// One non-streaming completion.
    pub async fn get_completion(
        &self,
        provider: &str,
        model: &str,
        messages: &[Message],
    ) -> Result<CompletionResult, LlmError> {
        let span = tracing::info_span!(
            "gen_ai.complete",
            gen_ai.operation.name = OP_CHAT,
            gen_ai.provider.name = genai_attrs::provider_name(provider),
            parley.protocol.family = self.inner.adapters.resolve(provider).family(),
            gen_ai.request.model = %model,
            gen_ai.request.stream = false,
            gen_ai.usage.input_tokens = field::Empty,
            gen_ai.usage.output_tokens = field::Empty,
        );
        self.inner
            .complete(provider, model, messages)
            .instrument(span)
            .await
    }

    /// Start streaming a completion for `conversation_id` and return at once.
    ///
    /// Any stream already running for the conversation is cancelled first.
    /// `handler` receives chunks in order, then exactly one of `on_error` or
    /// `on_end`, unless the stream is cancelled. Must be called from within
    /// a Tokio runtime.
    pub fn stream_completion<H: StreamHandler>(
        &self,
        conversation_id: &str,
        provider: &str,
        model: &str,
        messages: &[Message],
        handler: H,
    ) {
        let handle = self.inner.streams.register(conversation_id);
        let inner = Arc::clone(&self.inner);
        let provider = provider.to_string();
        let model = model.to_string();
        let messages = messages.to_vec();

        let span = tracing::info_span!(
            "gen_ai.stream",
            gen_ai.operation.name = OP_CHAT,
            gen_ai.provider.name = genai_attrs::provider_name(&provider),
            parley.protocol.family = inner.adapters.resolve(&provider).family(),
            gen_ai.request.model = %model,
            gen_ai.request.stream = true,
            conversation.id = %conversation_id,
            gen_ai.usage.input_tokens = field::Empty,
            gen_ai.usage.output_tokens = field::Empty,
        );

        tokio::spawn(
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = handle.token().cancelled() => Err(LlmError::Cancelled),
                    result = inner.stream(&provider, &model, &messages, &handler) => result,
                };

                // A failed finish means the slot was taken by cancel or by a
                // newer stream for the same conversation.
                let owned = inner.streams.finish(&handle);
                if !owned || handle.is_cancelled() {
                    tracing::debug!("stream cancelled");
                    return;
                }

                match outcome {
                    Ok(result) => {
                        tracing::info!(
                            total_tokens = result.usage.total_tokens,
                            "stream finished"
                        );
                        handler.on_end(result);
                    }
                    Err(e) if e.is_cancellation() => tracing::debug!("stream cancelled"),
                    Err(e) => {
                        tracing::warn!(error = %e, "stream failed");
                        handler.on_error(e);
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Cancel the active stream for a conversation. Returns whether one existed.
    pub fn cancel_stream(&self, conversation_id: &str) -> bool {
        let cancelled = self.inner.streams.cancel(conversation_id);
        if cancelled {
            tracing::info!(conversation_id, "stream cancelled by caller");
        }
        cancelled
    }

    /// Number of streams currently in flight.
    pub fn active_streams(&self) -> usize {
        self.inner.streams.len()
    }

    /// Configured providers with their visible models, sorted by id.
    pub async fn get_available_providers(&self) -> Result<Vec<ProviderSummary>, LlmError> {
        let settings = self
            .inner
            .settings
            .get_settings()
            .await
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        let mut providers: Vec<ProviderSummary> = settings
            .into_iter()
            .map(|(id, config)| apply_defaults(&id, config))
            .filter(ProviderConfig::is_configured)
            .map(|config| ProviderSummary {
                name: config.display_name().to_string(),
                models: config.visible_models(),
                id: config.id,
            })
            .collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(providers)
    }

    /// List a provider's models from its API and refresh the stored model
    /// list and capability map. Manual capability overrides are preserved.
    pub async fn fetch_models_from_provider(
        &self,
        provider_id: &str,
    ) -> Result<Vec<String>, LlmError> {
        let span = tracing::info_span!(
            "gen_ai.models",
            gen_ai.operation.name = OP_LIST_MODELS,
            gen_ai.provider.name = genai_attrs::provider_name(provider_id),
            parley.protocol.family = self.inner.adapters.resolve(provider_id).family(),
        );
        async {
            let inner = &self.inner;
            let config = inner.resolve_provider(provider_id)?;
            let adapter = inner.adapters.resolve(provider_id);

            let request = adapter.build_models_request(&config);
            let body = inner.send_json(&request, config.display_name()).await?;
            let models = adapter.parse_models(&body)?;
            tracing::info!(count = models.len(), "fetched provider models");

            let fresh = inner.capabilities.get_capabilities_for_models(&models).await;
            if let Err(e) = inner.persist_models(provider_id, &models, &fresh).await {
                tracing::warn!(error = %e, "failed to persist refreshed models");
            }
            Ok(models)
        }
        .instrument(span)
        .await
    }

    /// Check a local provider: installed binary, reachable server, version.
    /// Known local ids (`ollama`, `vllm`, `llamacpp`) work without a
    /// settings entry.
    pub async fn detect_local_runner(&self, provider_id: &str) -> Result<RunnerDetection, LlmError> {
        let config = self.inner.local_provider(provider_id)?;
        Ok(self.inner.launcher.detect(&config).await)
    }

    /// Models available to local runners, from a running Ollama server or
    /// the Ollama and LM Studio stores on disk.
    pub async fn discover_local_models(&self) -> ModelDiscovery {
        let ollama = self
            .inner
            .settings
            .get_provider_config("ollama")
            .unwrap_or_default();
        let found = self
            .inner
            .launcher
            .discover_models(&apply_defaults("ollama", ollama))
            .await;
        tracing::info!(
            count = found.total_count(),
            errors = found.errors.len(),
            "local model discovery finished"
        );
        found
    }

    /// Estimate usage and cost of a conversation before sending it. User and
    /// system messages count as prompt, assistant messages as completion.
    pub fn calculate_usage_for_messages(
        &self,
        provider: &str,
        model: &str,
        messages: &[Message],
    ) -> UsageEstimate {
        let tokens = &self.inner.tokens;
        let (prompt, completion) = messages.iter().fold(
            (REQUEST_OVERHEAD, 0u32),
            |(prompt, completion), message| {
                let n = tokens.message_tokens(message, provider, model);
                match message.role {
                    MessageRole::Assistant => (prompt, completion.saturating_add(n)),
                    MessageRole::User | MessageRole::System => {
                        (prompt.saturating_add(n), completion)
                    }
                }
            },
        );
        let usage = TokenUsage::new(prompt, completion);
        UsageEstimate {
            usage,
            cost: self.inner.pricing.calculate_cost(
                provider,
                model,
                usage.prompt_tokens,
                usage.completion_tokens,
            ),
        }
    }
}

impl<S: SettingsStore> EngineInner<S> {
    /// Look up a provider and check it can be called, before any network I/O.
    fn resolve_provider(&self, provider_id: &str) -> Result<ProviderConfig, LlmError> {
        let config = self
            .settings
            .get_provider_config(provider_id)
            .ok_or_else(|| {
                LlmError::Configuration(format!("provider '{provider_id}' is not configured"))
            })?;
        let config = apply_defaults(provider_id, config);

        if !config.is_configured() {
            return Err(LlmError::Configuration(format!(
                "provider '{}' has no API key",
                config.display_name()
            )));
        }
        if config.endpoint.trim().is_empty() {
            return Err(LlmError::Configuration(format!(
                "provider '{provider_id}' has no endpoint"
            )));
        }
        Ok(config)
    }

    /// A local provider from settings, or the defaults of a known local id.
    fn local_provider(&self, provider_id: &str) -> Result<ProviderConfig, LlmError> {
        let config = match self.settings.get_provider_config(provider_id) {
            Some(config) => config,
            None if known_provider(provider_id).is_some_and(|known| known.is_local) => {
                ProviderConfig::default()
            }
            None => {
                return Err(LlmError::Configuration(format!(
                    "provider '{provider_id}' is not configured"
                )));
            }
        };
        let config = apply_defaults(provider_id, config);
        if !config.is_local {
            return Err(LlmError::Configuration(format!(
                "provider '{}' is not a local runner",
                config.display_name()
            )));
        }
        Ok(config)
    }

    /// Resolve, then make sure a local runner is up.
    async fn prepare(&self, provider_id: &str) -> Result<ProviderConfig, LlmError> {
        let config = self.resolve_provider(provider_id)?;
        if config.is_local {
            self.launcher.ensure_running(&config).await?;
        }
        Ok(config)
    }

    async fn complete(
        &self,
        provider_id: &str,
        model: &str,
        messages: &[Message],
    ) -> Result<CompletionResult, LlmError> {
        let config = self.prepare(provider_id).await?;
        let adapter = self.adapters.resolve(provider_id);
        let name = config.display_name();

        let request = adapter.build_request(&ChatRequest {
            config: &config,
            model,
            messages,
            stream: false,
        })?;
        let body = self.send_json(&request, name).await?;
        let parsed = adapter.parse_response(name, &body)?;

        let reported = parsed.usage.map(PartialUsage::from).unwrap_or_default();
        Ok(self.finish_result(provider_id, model, messages, parsed.content, reported))
    }

    async fn stream<H: StreamHandler>(
        &self,
        provider_id: &str,
        model: &str,
        messages: &[Message],
        handler: &H,
    ) -> Result<CompletionResult, LlmError> {
        let config = self.prepare(provider_id).await?;
        let adapter = self.adapters.resolve(provider_id);
        let name = config.display_name();

        let request = adapter.build_request(&ChatRequest {
            config: &config,
            model,
            messages,
            stream: true,
        })?;
        // The wait for response headers counts against the idle timeout too.
        let response = tokio::time::timeout(self.idle_timeout, self.send(&request, name))
            .await
            .map_err(|_| idle_timeout_error(name, self.idle_timeout))??;
        let outcome = consume_sse(
            response.bytes_stream(),
            adapter.as_ref(),
            name,
            self.idle_timeout,
            handler,
        )
        .await?;

        Ok(self.finish_result(provider_id, model, messages, outcome.content, outcome.usage))
    }

    /// Fill whichever usage side the provider did not report, then price it.
    fn finish_result(
        &self,
        provider_id: &str,
        model: &str,
        messages: &[Message],
        content: String,
        reported: PartialUsage,
    ) -> CompletionResult {
        let prompt = reported
            .prompt_tokens
            .unwrap_or_else(|| self.tokens.count_message_tokens(messages, provider_id, model));
        let completion = reported
            .completion_tokens
            .unwrap_or_else(|| self.tokens.count_tokens(&content, provider_id, model));
        if reported.is_empty() {
            tracing::debug!("provider reported no usage, using estimate");
        }

        let usage = TokenUsage::new(prompt, completion);
        let span = tracing::Span::current();
        span.record(GEN_AI_USAGE_INPUT_TOKENS, usage.prompt_tokens);
        span.record(GEN_AI_USAGE_OUTPUT_TOKENS, usage.completion_tokens);

        CompletionResult {
            cost: self.pricing.calculate_cost(provider_id, model, prompt, completion),
            content,
            usage,
        }
    }

    /// Send a request; non-2xx statuses become [`LlmError::Provider`].
    async fn send(
        &self,
        request: &HttpRequest,
        provider_name: &str,
    ) -> Result<reqwest::Response, LlmError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(url = %request.url, "sending provider request");
        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Transport(format!("{provider_name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "provider returned an error status");
            return Err(provider_error(status.as_u16(), &body, provider_name));
        }
        Ok(response)
    }

    async fn send_json(&self, request: &HttpRequest, provider_name: &str) -> Result<Value, LlmError> {
        self.send(request, provider_name)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("{provider_name}: {e}")))
    }

    /// Write the refreshed model list and capabilities into this provider's
    /// entry only, merging against the entry as stored at write time.
    async fn persist_models(
        &self,
        provider_id: &str,
        models: &[String],
        fresh: &HashMap<String, ModelCapabilities>,
    ) -> Result<(), LlmError> {
        let updated = self
            .settings
            .update_provider(provider_id, |entry| {
                entry.model_capabilities =
                    merge_capability_map(models, fresh, &entry.model_capabilities);
                entry.models = models.to_vec();
            })
            .await
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        if !updated {
            tracing::debug!("provider entry removed before models were persisted");
        }
        Ok(())
    }
}

/// Decode an SSE byte stream through `adapter`, forwarding text to `handler`.
///
/// Ends at the adapter's terminal marker or at end of body. Fails with
/// [`LlmError::Transport`] when no event arrives within `idle_timeout`.
pub(crate) async fn consume_sse<St, B, E, H>(
    body: St,
    adapter: &dyn ProtocolAdapter,
    provider_name: &str,
    idle_timeout: Duration,
    handler: &H,
) -> Result<StreamOutcome, LlmError>
where
    St: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    H: StreamHandler,
{
    let mut events = std::pin::pin!(body.eventsource());
    let mut outcome = StreamOutcome::default();

    loop {
        let next = tokio::time::timeout(idle_timeout, events.next())
            .await
            .map_err(|_| idle_timeout_error(provider_name, idle_timeout))?;
        let Some(event) = next else {
            tracing::debug!("stream body ended without a terminal event");
            break;
        };
        let event = event.map_err(|e| LlmError::Transport(format!("{provider_name}: {e}")))?;

        let mut done = false;
        for parsed in adapter.parse_stream_event(provider_name, &event.event, &event.data)? {
            match parsed {
                StreamEvent::TextDelta(text) => {
                    handler.on_chunk(&text);
                    outcome.content.push_str(&text);
                }
                StreamEvent::Usage(usage) => outcome.usage.merge(usage),
                StreamEvent::Done => done = true,
            }
        }
        if done {
            break;
        }
    }
    Ok(outcome)
}

fn idle_timeout_error(provider_name: &str, idle_timeout: Duration) -> LlmError {
    LlmError::Transport(format!(
        "{provider_name}: no data received for {}s",
        idle_timeout.as_secs()
    ))
}
