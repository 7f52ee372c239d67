//! Per-turn orchestration
//!
//! An [`Assistant`] owns the process-wide pieces (shared index, retriever,
//! reranker, answerer, fact store). Each conversation brings its own
//! [`SessionMemory`]; every call takes it explicitly.

use crate::chunking::LegalChunker;
use crate::config::Config;
use crate::embedding::{load_provider, EmbeddingProvider, KeywordIndex};
use crate::error::{LexgroundError, Result};
use crate::grounding::{
    audit_answer, AnswerOutcome, AuditReport, EvidenceAssembler, EvidenceItem, EvidenceSet,
    EvidenceTag, GroundedAnswerer, ImageInput, LanguageModel, OpenAiChatModel, PromptInput,
};
use crate::index::{AddReport, CorpusIndex, IndexError, IndexParams, IndexStatus, SharedCorpus};
use crate::ingest::{corpus_fingerprint, DocumentLoader, NoOcr, OcrEngine, VisionOcr};
use crate::retrieval::{
    load_reranker, FocusMode, HybridRetriever, LexicalRetriever, NoLexical, Reranker,
    RetrievalQuery,
};
use crate::session::{Command, SessionMemory};
use crate::storage::{FactStore, StorageManager};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-question options chosen by the caller
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// Source files to focus on; empty means the whole corpus
    pub focus: BTreeSet<String>,
    pub focus_mode: FocusMode,
    pub image: Option<ImageInput>,
}

/// Everything produced by one answered question
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub outcome: AnswerOutcome,
    pub audit: AuditReport,
    pub evidence: EvidenceSet,
}

impl TurnOutcome {
    pub fn answer(&self) -> &str {
        self.outcome.text()
    }

    pub fn is_refused(&self) -> bool {
        self.outcome.is_refused()
    }

    pub fn auto_cited(&self) -> bool {
        matches!(self.outcome, AnswerOutcome::Answered { auto_cited: true, .. })
    }

    /// Uncited substantive sentences
    pub fn offenders(&self) -> &[String] {
        &self.audit.offenders
    }

    /// Evidence the answer actually cites
    pub fn sources(&self) -> &[EvidenceItem] {
        &self.audit.used
    }
}

/// Response to one line of user input
#[derive(Debug, Clone)]
pub enum Reply {
    /// Acknowledgement of a command
    Notice(String),
    /// Evidence requested with `show snippet`
    Snippet(EvidenceItem),
    Answer(TurnOutcome),
}

/// Which optional components are active
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub embedding_model: String,
    pub lexical: bool,
    pub reranker: String,
    pub ocr: bool,
    pub chunks: usize,
}

/// Builder for [`Assistant`]; unset components come from the configuration
pub struct AssistantBuilder {
    config: Config,
    model: Option<Arc<dyn LanguageModel>>,
    reranker: Option<Arc<dyn Reranker>>,
    lexical: Option<Box<dyn LexicalRetriever>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl AssistantBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            model: None,
            reranker: None,
            lexical: None,
            ocr: None,
            provider: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_lexical(mut self, lexical: Box<dyn LexicalRetriever>) -> Self {
        self.lexical = Some(lexical);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Load or build the corpus index and assemble the pipeline
    pub async fn build(self) -> Result<Assistant> {
        let config = self.config;
        let storage = StorageManager::new(&config.storage)?;

        let model = match self.model {
            Some(model) => model,
            None => Arc::new(OpenAiChatModel::from_config(&config.llm)?),
        };

        let provider = match self.provider {
            Some(provider) => provider,
            None => load_provider(&config.embedding).map_err(IndexError::from)?,
        };

        let ocr = self.ocr.unwrap_or_else(|| ocr_from_config(&config));
        let loader = DocumentLoader::new(ocr);
        let chunker = LegalChunker::from_config(&config.chunking);

        let index = open_index(&config, &storage, provider, &loader, &chunker).await?;

        let lexical = self.lexical.unwrap_or_else(|| default_lexical(&config));
        let corpus = SharedCorpus::new(index, lexical);
        let retriever = HybridRetriever::from_config(corpus.clone(), &config.retrieval)
            .map_err(|e| LexgroundError::Config(e.to_string()))?;

        let reranker = self
            .reranker
            .unwrap_or_else(|| load_reranker(&config.reranking));
        let facts = storage.open_facts()?;

        Ok(Assistant {
            assembler: EvidenceAssembler::from_config(&config),
            answerer: GroundedAnswerer::from_config(model, &config.llm),
            final_k: config.retrieval.final_k,
            config,
            storage,
            corpus,
            retriever,
            reranker,
            loader,
            chunker,
            facts,
        })
    }
}

/// OCR engine named by the configuration, or [`NoOcr`] when unavailable
pub fn ocr_from_config(config: &Config) -> Arc<dyn OcrEngine> {
    if !config.ocr.enabled {
        return Arc::new(NoOcr);
    }
    match OpenAiChatModel::with_model(&config.llm, config.ocr_model()) {
        Ok(model) => Arc::new(VisionOcr::new(Arc::new(model))),
        Err(e) => {
            tracing::warn!("OCR unavailable, images will contribute no text: {}", e);
            Arc::new(NoOcr)
        }
    }
}

fn default_lexical(config: &Config) -> Box<dyn LexicalRetriever> {
    if !config.retrieval.enable_lexical {
        return Box::new(NoLexical);
    }
    match KeywordIndex::new() {
        Ok(index) => Box::new(index),
        Err(e) => {
            tracing::warn!("Lexical retrieval unavailable: {}", e);
            Box::new(NoLexical)
        }
    }
}

/// Load the persisted index, or build it from the corpus directory
///
/// The corpus is only read when no index exists. Embedding runs on the
/// blocking pool.
pub async fn open_index(
    config: &Config,
    storage: &StorageManager,
    provider: Arc<dyn EmbeddingProvider>,
    loader: &DocumentLoader,
    chunker: &LegalChunker,
) -> Result<CorpusIndex> {
    let path = storage.index_path().to_path_buf();
    let params = IndexParams::from_config(config);

    let (chunks, fingerprint) = if CorpusIndex::exists(&path) {
        (Vec::new(), None)
    } else {
        let fingerprint = corpus_fingerprint(storage.corpus_dir())?;
        let documents = loader.load_corpus_dir(storage.corpus_dir()).await?;
        (chunker.split_documents(&documents), Some(fingerprint))
    };

    let index = tokio::task::spawn_blocking(move || {
        CorpusIndex::build_or_load(&path, provider, params, fingerprint, move || chunks)
    })
    .await
    .map_err(|e| LexgroundError::Other(anyhow::anyhow!("Index task failed: {}", e)))??;

    Ok(index)
}

/// Delete the persisted index and build it again from the corpus
pub async fn rebuild_index(
    config: &Config,
    storage: &StorageManager,
    provider: Arc<dyn EmbeddingProvider>,
    loader: &DocumentLoader,
    chunker: &LegalChunker,
) -> Result<CorpusIndex> {
    CorpusIndex::invalidate(storage.index_path())?;
    open_index(config, storage, provider, loader, chunker).await
}

/// Freshness of the persisted index against the corpus directory
pub fn index_status(config: &Config, storage: &StorageManager) -> Result<IndexStatus> {
    let fingerprint = corpus_fingerprint(storage.corpus_dir())?;
    Ok(CorpusIndex::status(
        storage.index_path(),
        &fingerprint,
        &config.embedding.model,
    )?)
}

/// The retrieval-and-grounding pipeline
pub struct Assistant {
    config: Config,
    storage: StorageManager,
    corpus: SharedCorpus,
    retriever: HybridRetriever,
    reranker: Arc<dyn Reranker>,
    assembler: EvidenceAssembler,
    answerer: GroundedAnswerer,
    loader: DocumentLoader,
    chunker: LegalChunker,
    facts: FactStore,
    final_k: usize,
}

impl Assistant {
    /// Build with every component chosen by the configuration
    pub async fn from_config(config: Config) -> Result<Self> {
        AssistantBuilder::new(config).build().await
    }

    pub fn builder(config: Config) -> AssistantBuilder {
        AssistantBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn corpus(&self) -> &SharedCorpus {
        &self.corpus
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// A fresh session seeded with the stored permanent facts
    pub fn new_session(&self) -> Result<SessionMemory> {
        let facts = self.facts.load_all()?;
        Ok(SessionMemory::from_config(facts, &self.config))
    }

    pub async fn capabilities(&self) -> Capabilities {
        let lexical = self.corpus.lexical().await.is_enabled();
        let index = self.corpus.read().await;
        Capabilities {
            embedding_model: index.meta().embedding_model.clone(),
            lexical,
            reranker: self.reranker.name().to_string(),
            ocr: self.loader.ocr().is_enabled(),
            chunks: index.len(),
        }
    }

    /// Interpret one line of input: a reserved-prefix command or a question
    pub async fn handle(
        &self,
        session: &mut SessionMemory,
        input: &str,
        options: &TurnOptions,
    ) -> Result<Reply> {
        match Command::parse(input) {
            Command::Remember(fact) => {
                self.facts.append(&fact)?;
                session.remember(fact);
                Ok(Reply::Notice("Remembered.".to_string()))
            }
            Command::Memo(fact) => {
                session.note(fact);
                Ok(Reply::Notice("Noted (session).".to_string()))
            }
            Command::Persona(persona) => {
                let notice = match &persona {
                    Some(p) => format!("Persona set: {}", p),
                    None => "Persona cleared.".to_string(),
                };
                session.set_persona(persona);
                Ok(Reply::Notice(notice))
            }
            Command::ShowSnippet(tag) => Ok(match self.snippet(session, tag) {
                Some(item) => Reply::Snippet(item),
                None => Reply::Notice(format!("No snippet {} in the last answer.", tag)),
            }),
            Command::Invalid(message) => Ok(Reply::Notice(message)),
            Command::Query(question) => Ok(Reply::Answer(self.ask(session, &question, options).await?)),
        }
    }

    /// Answer a question: retrieve, rerank, assemble, answer, audit
    ///
    /// The exchange is recorded in the session only when the model call
    /// succeeds.
    pub async fn ask(
        &self,
        session: &mut SessionMemory,
        question: &str,
        options: &TurnOptions,
    ) -> Result<TurnOutcome> {
        let query = RetrievalQuery {
            text: question.to_string(),
            focus_filter: options.focus.clone(),
            focus_mode: options.focus_mode,
        };

        let candidates = self.retriever.retrieve_candidates(&query).await?;
        let candidate_count = candidates.len();
        let ranked = self.reranker.rerank(question, candidates, self.final_k);
        tracing::debug!(
            "Reranked {} candidates to {} with {}",
            candidate_count,
            ranked.len(),
            self.reranker.name()
        );

        let evidence = self.assembler.assemble(&ranked, session);

        let ocr_text = match &options.image {
            Some(image) => match self
                .loader
                .ocr()
                .extract_text(&image.data, &image.mime_type)
                .await
            {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!("OCR failed for attached image: {}", e);
                    None
                }
            },
            None => None,
        };

        let history = session.history();
        let input = PromptInput {
            question,
            evidence: &evidence,
            ocr_text: ocr_text.as_deref(),
            image: options.image.as_ref(),
            history: &history,
        };

        let outcome = self.answerer.answer(&input).await?;

        let audit = if outcome.is_refused() {
            AuditReport::default()
        } else {
            audit_answer(outcome.text(), &evidence)
        };
        if !audit.offenders.is_empty() {
            tracing::warn!("{} uncited substantive sentences", audit.offenders.len());
        }

        session.record_exchange(question, outcome.text(), audit.used.clone());
        session.set_last_evidence(evidence.items.clone());

        Ok(TurnOutcome {
            outcome,
            audit,
            evidence,
        })
    }

    /// Full text of an evidence item from the most recent answer
    pub fn snippet(&self, session: &SessionMemory, tag: EvidenceTag) -> Option<EvidenceItem> {
        session
            .last_evidence()
            .iter()
            .find(|item| item.tag == tag)
            .cloned()
    }

    /// Merge uploaded files into the live index without saving them to
    /// the corpus
    ///
    /// Files that fail to extract are skipped with a warning.
    pub async fn add_session_documents(&self, files: &[(String, Vec<u8>)]) -> Result<AddReport> {
        let mut documents = Vec::new();
        for (name, bytes) in files {
            match self.loader.load_document(bytes, name).await {
                Ok(mut docs) => documents.append(&mut docs),
                Err(e) => tracing::warn!("Skipping session upload {}: {}", name, e),
            }
        }

        let chunks = self.chunker.split_documents(&documents);
        Ok(self.corpus.add(chunks).await?)
    }

    /// Save uploads into the corpus directory
    ///
    /// The persisted index is invalidated; the live index is unchanged
    /// until the next build.
    pub fn save_to_corpus(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<PathBuf>> {
        files
            .iter()
            .map(|(name, bytes)| self.storage.save_to_corpus(name, bytes))
            .collect()
    }
}
