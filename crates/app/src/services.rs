use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use study_rag_core::gemini::DEFAULT_BASE_URL;
use study_rag_core::{
    AdminService, CharacterNgramEmbedder, Embedder, GeminiConfig, GeminiEmbedder,
    GeminiGenerator, Generator, InMemoryVectorStore, IngestionOptions, IngestionPipeline,
    LocalStorage, LopdfExtractor, ObjectStorage, PineconeStore, QdrantStore, QueryOptions,
    QueryPipeline, SupabaseStorage, VectorIndex, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL,
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    Gemini,
    /// Deterministic character n-gram vectors, no API key needed.
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VectorBackend {
    Pinecone,
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    Supabase,
    Local,
}

/// Backend selection and credentials shared by `serve` and `ingest`.
#[derive(Debug, Clone, Args)]
pub struct BackendArgs {
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub gemini_base_url: String,

    #[arg(long, env = "EMBEDDER", value_enum, default_value_t = EmbedderKind::Gemini)]
    pub embedder: EmbedderKind,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    pub embedding_dimensions: usize,

    #[arg(long, env = "GENERATION_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    pub generation_model: String,

    #[arg(long, env = "VECTOR_BACKEND", value_enum, default_value_t = VectorBackend::Pinecone)]
    pub vector_backend: VectorBackend,

    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: Option<String>,

    /// Data-plane host of the index, e.g. `notes-abc123.svc.pinecone.io`.
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pub pinecone_index_host: Option<String>,

    #[arg(long, env = "PINECONE_NAMESPACE")]
    pub pinecone_namespace: Option<String>,

    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,

    #[arg(long, env = "QDRANT_COLLECTION", default_value = "lecture_notes")]
    pub qdrant_collection: String,

    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Supabase)]
    pub storage_backend: StorageBackend,

    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    #[arg(long, env = "SUPABASE_BUCKET", default_value = "course-materials")]
    pub supabase_bucket: String,

    #[arg(long, env = "LOCAL_STORAGE_DIR", default_value = "./uploads")]
    pub local_storage_dir: PathBuf,

    /// Base URL under which locally stored files are linked, e.g. `http://localhost:8000/files`.
    #[arg(long, env = "PUBLIC_FILES_URL")]
    pub public_files_url: Option<String>,

    #[arg(long, env = "UPSERT_BATCH_SIZE", default_value_t = 100,
          value_parser = clap::value_parser!(u16).range(20..=100))]
    pub upsert_batch_size: u16,
}

/// Every long-lived client the server and CLI need, behind trait objects.
#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Services {
    pub async fn from_args(args: &BackendArgs) -> anyhow::Result<Self> {
        let embedder = build_embedder(args)?;
        let index = build_index(args, embedder.dimensions()).await?;
        let storage = build_storage(args)?;

        info!(
            embedder = ?args.embedder,
            vector_backend = index.backend_name(),
            storage = storage.provider_name(),
            "backends ready"
        );

        Ok(Self {
            embedder,
            index,
            storage,
        })
    }

    pub fn ingestion(&self, args: &BackendArgs) -> anyhow::Result<IngestionPipeline> {
        let options = IngestionOptions {
            upsert_batch_size: usize::from(args.upsert_batch_size),
            ..IngestionOptions::default()
        };
        Ok(IngestionPipeline::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            Arc::clone(&self.storage),
            Arc::new(LopdfExtractor),
            options,
        )?)
    }

    pub fn query(&self, generator: Arc<dyn Generator>, options: QueryOptions) -> QueryPipeline {
        QueryPipeline::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            generator,
            options,
        )
    }

    pub fn admin(&self, secret: Option<String>) -> AdminService {
        AdminService::new(Arc::clone(&self.index), Arc::clone(&self.storage), secret)
    }
}

fn gemini_config(args: &BackendArgs) -> anyhow::Result<GeminiConfig> {
    let key = args
        .google_api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .context("GOOGLE_API_KEY is required for Gemini embeddings and generation")?;
    Ok(GeminiConfig::new(key).with_base_url(&args.gemini_base_url))
}

pub fn build_embedder(args: &BackendArgs) -> anyhow::Result<Arc<dyn Embedder>> {
    Ok(match args.embedder {
        EmbedderKind::Gemini => Arc::new(
            GeminiEmbedder::new(gemini_config(args)?)
                .with_model(&args.embedding_model, args.embedding_dimensions),
        ),
        EmbedderKind::Offline => Arc::new(CharacterNgramEmbedder {
            dimensions: args.embedding_dimensions,
        }),
    })
}

pub fn build_generator(args: &BackendArgs) -> anyhow::Result<Arc<dyn Generator>> {
    Ok(Arc::new(
        GeminiGenerator::new(gemini_config(args)?).with_model(&args.generation_model),
    ))
}

async fn build_index(args: &BackendArgs, dimensions: usize) -> anyhow::Result<Arc<dyn VectorIndex>> {
    Ok(match args.vector_backend {
        VectorBackend::Pinecone => {
            let (Some(api_key), Some(host)) = (&args.pinecone_api_key, &args.pinecone_index_host)
            else {
                bail!("PINECONE_API_KEY and PINECONE_INDEX_HOST are required for the pinecone backend");
            };
            let mut store = PineconeStore::new(host, api_key);
            if let Some(namespace) = &args.pinecone_namespace {
                store = store.with_namespace(namespace);
            }
            Arc::new(store)
        }
        VectorBackend::Qdrant => {
            let store = QdrantStore::new(&args.qdrant_url, &args.qdrant_collection, dimensions);
            store
                .ensure_collection()
                .await
                .with_context(|| format!("preparing qdrant collection {}", args.qdrant_collection))?;
            Arc::new(store)
        }
        VectorBackend::Memory => Arc::new(InMemoryVectorStore::new()),
    })
}

fn build_storage(args: &BackendArgs) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    Ok(match args.storage_backend {
        StorageBackend::Supabase => {
            let (Some(url), Some(key)) = (&args.supabase_url, &args.supabase_key) else {
                bail!("SUPABASE_URL and SUPABASE_KEY are required for the supabase backend");
            };
            Arc::new(SupabaseStorage::new(url, key, &args.supabase_bucket)?)
        }
        StorageBackend::Local => {
            let mut storage = LocalStorage::new(&args.local_storage_dir);
            if let Some(url) = &args.public_files_url {
                storage = storage.with_public_base_url(url);
            }
            Arc::new(storage)
        }
    })
}
