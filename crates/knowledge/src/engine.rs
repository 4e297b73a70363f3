//! The knowledge engine: a stateful front end that sequences ingestion,
//! retrieval, optional generation and answer caching.
//!
//! `ask` and `load_knowledge` do not exclude each other. A query running
//! while a document is ingested sees the working set from before or after
//! the swap, and its answer may be cached just before the ingestion clears
//! the cache.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use recall_core::{AppError, AppResult};
use recall_llm::{create_orchestrator, GenerateOptions, GenerationOrchestrator, GenerationOutput, ProviderId};
use recall_prompt::{build_answer_prompt, load_prompt, PromptTemplate};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::cache::AnswerCache;
use crate::chunk::{create_chunks, ChunkConfig};
use crate::classifier::{
    classify, conversational_response, should_generate, QueryType, CONVERSATIONAL_CONFIDENCE,
    OUT_OF_SCOPE_CONFIDENCE, OUT_OF_SCOPE_RESPONSE,
};
use crate::config::{get_index_path, load_config, EngineConfig};
use crate::embeddings::{EmbeddingService, EmbeddingSignature};
use crate::normalize::{calculate_hash, clean_text, normalize_query, truncate_chars};
use crate::progress::{ProgressEvent, ProgressReporter, ProgressStage};
use crate::retriever::{RetrievalOptions, Retriever};
use crate::sources::{derived_document_id, KnowledgeSource};
use crate::store::{KnowledgeStore, SqliteStore};
use crate::synthesizer::{
    format_answer, related_links, single_answer, synthesize, Synthesis, SynthesisOptions,
};
use crate::types::{
    Answer, AnswerRoute, AnswerTiming, AskOptions, DocumentManifest, IngestReport, IngestStatus,
    RankedChunk, SkipReason,
};

/// Store metadata key holding the embedding signature of the index.
const SIGNATURE_KEY: &str = "embedding_signature";

/// Results whose text is placed in the generation context.
const CONTEXT_RESULTS: usize = 3;

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    /// Terminal; entered by `destroy`
    Closed,
}

/// Snapshot returned by [`KnowledgeEngine::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub ready: bool,
    pub embeddings_ready: bool,
    pub embedding_model: String,
    pub generation_available: bool,
    /// A provider selection is in flight
    pub generation_loading: bool,
    pub active_provider: Option<ProviderId>,
    pub chunk_count: usize,
    pub document_count: usize,
    pub cache_entries: usize,
    pub store_backend: String,
}

/// Local question-answering engine over ingested documents.
pub struct KnowledgeEngine {
    config: EngineConfig,
    state: RwLock<EngineState>,
    init_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn KnowledgeStore>,
    embeddings: EmbeddingService,
    retriever: Retriever,
    cache: AnswerCache,
    generator: Option<GenerationOrchestrator>,
    prompt: PromptTemplate,
    progress: ProgressReporter,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl KnowledgeEngine {
    /// Open the engine for a workspace using `.recall/engine.yaml`.
    pub fn open(workspace: &Path) -> AppResult<Self> {
        let config = load_config(workspace)?;
        Self::open_with_config(workspace, config)
    }

    /// Open the engine for a workspace with an explicit configuration.
    ///
    /// The index lives in `.recall/index.sqlite`. The generation
    /// orchestrator is only built when generation is enabled.
    pub fn open_with_config(workspace: &Path, config: EngineConfig) -> AppResult<Self> {
        let config = config.clamped();
        let store: Arc<dyn KnowledgeStore> = Arc::new(SqliteStore::open(&get_index_path(workspace))?);
        let embeddings = EmbeddingService::from_config(&config.embedding)?;

        let generator = if config.generation_enabled {
            Some(create_orchestrator(&config.generation, None)?)
        } else {
            None
        };

        let prompt = match &config.prompt_template {
            Some(id) => load_prompt(workspace, id)?,
            None => PromptTemplate::default(),
        };

        Ok(Self::with_components(config, store, embeddings, generator, prompt))
    }

    /// Assemble an engine from explicit parts.
    pub fn with_components(
        config: EngineConfig,
        store: Arc<dyn KnowledgeStore>,
        embeddings: EmbeddingService,
        generator: Option<GenerationOrchestrator>,
        prompt: PromptTemplate,
    ) -> Self {
        let cache = AnswerCache::new(
            Arc::clone(&store),
            config.cache_ttl_secs,
            config.max_cache_entries,
        );

        Self {
            config,
            state: RwLock::new(EngineState::Uninitialized),
            init_lock: tokio::sync::Mutex::new(()),
            store,
            embeddings,
            retriever: Retriever::new(),
            cache,
            generator,
            prompt,
            progress: ProgressReporter::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Receive progress events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    fn ensure_ready(&self) -> AppResult<()> {
        match self.state() {
            EngineState::Ready => Ok(()),
            EngineState::Closed => Err(AppError::NotInitialized(
                "Engine has been destroyed".to_string(),
            )),
            _ => Err(AppError::NotInitialized(
                "Engine not initialized. Call initialize() first".to_string(),
            )),
        }
    }

    /// Prepare the engine for use.
    ///
    /// Evicts stale cache entries, warms up embeddings, verifies the index
    /// was built with the configured embedding model and loads the working
    /// set. Generation providers are selected in the background. Calling it
    /// again once ready is a no-op.
    pub async fn initialize(&self) -> AppResult<()> {
        let _guard = self.init_lock.lock().await;
        match self.state() {
            EngineState::Ready => return Ok(()),
            EngineState::Closed => {
                return Err(AppError::NotInitialized(
                    "Engine has been destroyed".to_string(),
                ))
            }
            EngineState::Uninitialized | EngineState::Initializing => {}
        }

        self.set_state(EngineState::Initializing);
        self.progress.emit(ProgressStage::Init, 0, "Initializing knowledge engine");

        match self.initialize_components().await {
            Ok(()) => {
                self.set_state(EngineState::Ready);
                self.progress.emit(ProgressStage::Complete, 100, "Knowledge engine ready");
                tracing::info!(
                    chunks = self.retriever.len(),
                    backend = self.store.backend(),
                    "Knowledge engine ready"
                );
                Ok(())
            }
            Err(e) => {
                self.set_state(EngineState::Uninitialized);
                self.progress.emit(ProgressStage::Error, 100, e.to_string());
                Err(e)
            }
        }
    }

    async fn initialize_components(&self) -> AppResult<()> {
        self.progress.emit(ProgressStage::Init, 20, "Maintaining answer cache");
        self.cache.evict_expired().await?;
        self.cache.enforce_capacity().await?;

        self.progress.emit(
            ProgressStage::EmbeddingLoad,
            40,
            format!("Loading embedding model {}", self.embeddings.model_name()),
        );
        self.embeddings.initialize().await;
        self.check_signature().await?;

        self.progress.emit(ProgressStage::Indexing, 60, "Loading knowledge base");
        self.refresh_working_set().await?;

        match &self.generator {
            Some(generator) => {
                self.progress.emit(
                    ProgressStage::GenerationLoad,
                    80,
                    "Selecting generation provider",
                );
                let generator = generator.clone();
                tokio::spawn(async move {
                    match generator.initialize().await {
                        Some(id) => tracing::info!("Generation provider {} active", id),
                        None => tracing::info!(
                            "No generation provider available; answers will be extractive"
                        ),
                    }
                });
            }
            None => tracing::debug!("Generation disabled; skipping provider selection"),
        }

        Ok(())
    }

    /// Compare the index's embedding signature with the configured one.
    ///
    /// An index with no chunks adopts the current signature.
    async fn check_signature(&self) -> AppResult<()> {
        let current = self.embeddings.signature();

        if let Some(raw) = self.store.get_meta(SIGNATURE_KEY).await? {
            let stored: EmbeddingSignature = serde_json::from_str(&raw)?;
            if self.store.stats().await?.chunk_count > 0 {
                return stored.validate_consistency(&current);
            }
            if stored == current {
                return Ok(());
            }
        }

        self.record_signature().await
    }

    async fn record_signature(&self) -> AppResult<()> {
        let current = self.embeddings.signature();
        self.store
            .put_meta(SIGNATURE_KEY, &serde_json::to_string(&current)?)
            .await
    }

    async fn refresh_working_set(&self) -> AppResult<()> {
        let chunks = self.store.all_chunks().await?;
        self.retriever.replace(chunks);
        Ok(())
    }

    /// Answer a question.
    ///
    /// Generation failures never fail the call; the extractive answer is
    /// kept and the failure is recorded in [`Answer::route`].
    pub async fn ask(&self, query: &str, options: AskOptions) -> AppResult<Answer> {
        let result = self.answer(query, options).await;
        if let Err(e) = &result {
            self.progress.emit(ProgressStage::Error, 100, e.to_string());
        }
        result
    }

    async fn answer(&self, query: &str, options: AskOptions) -> AppResult<Answer> {
        let started = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidQuery("Query is empty".to_string()));
        }
        self.ensure_ready()?;

        let query_type = classify(query);
        tracing::debug!(query_type = %query_type, "Classified query");

        match query_type {
            QueryType::Conversational => {
                return Ok(canned_answer(
                    conversational_response(query),
                    CONVERSATIONAL_CONFIDENCE,
                    query_type,
                    AnswerRoute::Conversational,
                    started,
                ))
            }
            QueryType::OutOfScope => {
                return Ok(canned_answer(
                    OUT_OF_SCOPE_RESPONSE,
                    OUT_OF_SCOPE_CONFIDENCE,
                    query_type,
                    AnswerRoute::OutOfScope,
                    started,
                ))
            }
            QueryType::KnowledgeBase | QueryType::General => {}
        }

        let key = normalize_query(query);
        if let Some(cached) = self.cache.lookup(&key).await? {
            tracing::debug!(key = %key, "Answer cache hit");
            self.progress.emit(ProgressStage::Complete, 100, "Answered from cache");
            return Ok(cached);
        }

        self.progress.emit(ProgressStage::Retrieval, 20, "Searching knowledge base");
        let retrieval_started = Instant::now();
        let query_vector = self.embeddings.embed_query(&key).await;
        let retrieval = RetrievalOptions {
            top_k: options.top_k.unwrap_or(self.config.top_k).clamp(1, 50),
            threshold: self.config.similarity_threshold,
            use_diversity: self.config.use_diversity,
            diversity_threshold: self.config.diversity_threshold,
        };
        let results = self.retriever.retrieve(&query_vector, &retrieval);
        let retrieval_ms = millis(retrieval_started.elapsed());

        let synthesis = synthesize(
            query,
            &results,
            &SynthesisOptions {
                max_sources: self.config.max_sources,
                confidence_threshold: self.config.extractive_confidence,
            },
        );
        let links = related_links(&results);

        let mut answer = Answer {
            text: String::new(),
            sources: synthesis.sources.clone(),
            confidence: synthesis.confidence,
            timing: AnswerTiming {
                retrieval_ms,
                ..AnswerTiming::default()
            },
            provider: None,
            query_type,
            route: AnswerRoute::Generated,
        };

        match self.generation_gate(query_type, &options, &results, synthesis.confidence) {
            Err(skip) => {
                tracing::debug!(reason = %skip, "Generation skipped");
                self.apply_extractive(&mut answer, &synthesis, &results, &links);
                answer.route = AnswerRoute::Extractive { skip };
            }
            Ok(generator) => {
                self.progress.emit(ProgressStage::Generation, 60, "Generating answer");
                let generation_started = Instant::now();
                match self
                    .generate(generator, query, &results, &options, synthesis.confidence)
                    .await
                {
                    Ok(output) => {
                        tracing::debug!(provider = %output.provider, "Using generated answer");
                        answer.text = format_answer(output.text.trim(), &links);
                        answer.provider = Some(output.provider);
                        answer.route = AnswerRoute::Generated;
                    }
                    Err(e) => {
                        if e.is_generation_failure() {
                            tracing::warn!("Generation failed, keeping extractive answer: {}", e);
                        } else {
                            tracing::error!("Generation could not start, keeping extractive answer: {}", e);
                        }
                        self.apply_extractive(&mut answer, &synthesis, &results, &links);
                        answer.route = AnswerRoute::GenerationFailed {
                            reason: e.to_string(),
                        };
                    }
                }
                answer.timing.generation_ms = millis(generation_started.elapsed());
            }
        }

        answer.timing.total_ms = millis(started.elapsed());
        self.cache.insert(&key, &answer).await?;
        self.progress.emit(ProgressStage::Complete, 100, "Answer ready");

        Ok(answer)
    }

    /// Decide whether to generate, in a fixed order of checks.
    fn generation_gate(
        &self,
        query_type: QueryType,
        options: &AskOptions,
        results: &[RankedChunk],
        confidence: f32,
    ) -> Result<&GenerationOrchestrator, SkipReason> {
        let allowed = options
            .allow_generation
            .unwrap_or(self.config.generation_enabled);
        if !allowed {
            return Err(SkipReason::DisabledByCaller);
        }

        if !should_generate(query_type, allowed) {
            return Err(SkipReason::QueryType { query_type });
        }

        let generator = self.generator.as_ref().ok_or(SkipReason::NoGenerator)?;

        let top = results.first().ok_or(SkipReason::NoResults)?.similarity;

        let available = self.retriever.len();
        if available < self.config.min_chunks_for_generation {
            return Err(SkipReason::TooFewChunks {
                available,
                required: self.config.min_chunks_for_generation,
            });
        }

        if top < self.config.min_generation_similarity {
            return Err(SkipReason::LowSimilarity {
                top,
                required: self.config.min_generation_similarity,
            });
        }

        if self.config.strict_mode && confidence >= self.config.good_enough_confidence {
            return Err(SkipReason::ConfidentEnough {
                confidence,
                threshold: self.config.good_enough_confidence,
            });
        }

        Ok(generator)
    }

    async fn generate(
        &self,
        generator: &GenerationOrchestrator,
        query: &str,
        results: &[RankedChunk],
        options: &AskOptions,
        confidence: f32,
    ) -> AppResult<GenerationOutput> {
        let context = build_context(results, self.config.max_context_chars);
        let prompt = build_answer_prompt(&self.prompt, query, &context, &options.history)?;

        let timeout = options.timeout.unwrap_or_else(|| {
            let ms = if confidence < self.config.low_confidence {
                self.config.low_confidence_timeout_ms
            } else {
                self.config.default_generation_timeout_ms
            };
            Duration::from_millis(ms)
        });

        let mut generate_options = GenerateOptions::default().with_timeout(timeout);
        if let Some(system) = prompt.system {
            generate_options = generate_options.with_system_prompt(system);
        }

        let output = generator.generate(&prompt.user, generate_options).await?;

        let length = output.text.trim().chars().count();
        if length <= self.config.min_generated_chars {
            return Err(AppError::Llm(format!(
                "Generated answer too short ({} chars)",
                length
            )));
        }

        Ok(output)
    }

    fn apply_extractive(
        &self,
        answer: &mut Answer,
        synthesis: &Synthesis,
        results: &[RankedChunk],
        links: &[String],
    ) {
        if self.config.single_answer_mode {
            if let Some(text) = single_answer(results, self.config.answer_length_limit) {
                answer.text = text;
                answer.sources.truncate(1);
                return;
            }
        }
        answer.text = format_answer(&synthesis.text, links);
    }

    /// Ingest a source.
    ///
    /// Content whose checksum matches the stored manifest is skipped.
    /// Otherwise the document's chunks are replaced, the working set is
    /// reloaded and the answer cache is cleared.
    pub async fn load_knowledge(&self, source: KnowledgeSource) -> AppResult<IngestReport> {
        let result = self.ingest(source).await;
        if let Err(e) = &result {
            self.progress.emit(ProgressStage::Error, 100, e.to_string());
        }
        result
    }

    async fn ingest(&self, source: KnowledgeSource) -> AppResult<IngestReport> {
        self.ensure_ready()?;
        let started = Instant::now();

        self.progress.emit(
            ProgressStage::Indexing,
            0,
            format!("Reading {}", source.origin()),
        );
        let resolved = source.resolve().await?;
        let text = clean_text(&resolved.text);
        if text.is_empty() {
            return Err(AppError::InvalidSource(format!(
                "Source {} contains no text",
                source.origin()
            )));
        }

        let checksum = calculate_hash(&text);
        let document_id = source
            .document_id()
            .map(str::to_string)
            .unwrap_or_else(|| derived_document_id(&checksum));

        let existing = self.store.get_manifest(&document_id).await?;
        if let Some(manifest) = existing.as_ref().filter(|m| m.checksum == checksum) {
            tracing::info!(document = %document_id, "Document unchanged, skipping");
            self.progress.emit(ProgressStage::Complete, 100, "Document unchanged");
            return Ok(IngestReport {
                document_id,
                status: IngestStatus::Unchanged,
                unit_count: manifest.unit_count,
                version: manifest.version,
                checksum,
                duration_secs: started.elapsed().as_secs_f64(),
            });
        }

        let origin = match &source {
            KnowledgeSource::Url { url, .. } => url.clone(),
            _ => document_id.clone(),
        };

        self.progress.emit(ProgressStage::Indexing, 20, "Chunking document");
        let chunk_config = ChunkConfig {
            chunk_size: self.config.chunk_size,
            overlap: self.config.chunk_overlap,
            min_size: self.config.min_chunk_size,
        };
        let mut chunks = create_chunks(
            &document_id,
            &origin,
            &text,
            &chunk_config,
            &resolved.metadata,
        );

        self.progress.emit(
            ProgressStage::Indexing,
            40,
            format!("Embedding {} chunks", chunks.len()),
        );
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embeddings.embed_texts(&texts).await;
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }

        self.progress.emit(ProgressStage::Indexing, 80, "Saving chunks");
        let manifest = DocumentManifest {
            document_id: document_id.clone(),
            checksum: checksum.clone(),
            version: existing.map(|m| m.version + 1).unwrap_or(1),
            updated_at: Utc::now(),
            unit_count: chunks.len(),
        };
        let removed = self.store.replace_document(&manifest, &chunks).await?;
        self.refresh_working_set().await?;
        let invalidated = self.cache.clear().await?;

        tracing::info!(
            document = %document_id,
            version = manifest.version,
            chunks = chunks.len(),
            removed,
            invalidated,
            "Indexed document"
        );
        self.progress.emit(
            ProgressStage::Complete,
            100,
            format!("Indexed {} chunks", chunks.len()),
        );

        Ok(IngestReport {
            document_id,
            status: IngestStatus::Indexed,
            unit_count: manifest.unit_count,
            version: manifest.version,
            checksum,
            duration_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Current state, index counts and provider selection.
    pub async fn status(&self) -> AppResult<EngineStatus> {
        let state = self.state();
        if state == EngineState::Closed {
            return Err(AppError::NotInitialized(
                "Engine has been destroyed".to_string(),
            ));
        }

        let stats = self.store.stats().await?;
        let generation = self.generator.as_ref().map(GenerationOrchestrator::status);

        Ok(EngineStatus {
            state,
            ready: state == EngineState::Ready,
            embeddings_ready: self.embeddings.is_ready(),
            embedding_model: self.embeddings.model_name().to_string(),
            generation_available: generation.as_ref().is_some_and(|s| s.available),
            generation_loading: generation.as_ref().is_some_and(|s| s.loading),
            active_provider: generation.and_then(|s| s.provider),
            chunk_count: stats.chunk_count,
            document_count: stats.document_count,
            cache_entries: stats.cache_entries,
            store_backend: self.store.backend().to_string(),
        })
    }

    /// Delete every document, chunk and cached answer.
    pub async fn clear(&self) -> AppResult<()> {
        self.ensure_ready()?;
        self.store.clear_all().await?;
        self.record_signature().await?;
        self.retriever.replace(Vec::new());
        tracing::info!("Cleared all knowledge");
        Ok(())
    }

    /// Release providers and the store. The engine cannot be used afterwards.
    pub async fn destroy(&self) -> AppResult<()> {
        let _guard = self.init_lock.lock().await;
        if self.state() == EngineState::Closed {
            return Ok(());
        }

        if let Some(generator) = &self.generator {
            generator.cleanup().await;
        }
        self.retriever.replace(Vec::new());
        self.set_state(EngineState::Closed);
        self.store.close().await?;
        tracing::debug!("Knowledge engine destroyed");
        Ok(())
    }
}

fn canned_answer(
    text: &str,
    confidence: f32,
    query_type: QueryType,
    route: AnswerRoute,
    started: Instant,
) -> Answer {
    tracing::debug!(route = ?route, "Short-circuit answer");
    Answer {
        text: text.to_string(),
        sources: Vec::new(),
        confidence,
        timing: AnswerTiming {
            retrieval_ms: 0,
            generation_ms: 0,
            total_ms: millis(started.elapsed()),
        },
        provider: None,
        query_type,
        route,
    }
}

/// Texts of the top results joined by blank lines, capped at `max_chars`.
pub fn build_context(results: &[RankedChunk], max_chars: usize) -> String {
    let joined = results
        .iter()
        .take(CONTEXT_RESULTS)
        .map(|r| r.chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, max_chars, "...")
}
