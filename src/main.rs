use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use verity_core::{
    analysis, api,
    config::Config,
    corpus_dir::DirectoryCorpus,
    ingest, persistence,
    service::{self, RegistryHandle},
    verifier, RegistryError,
};

#[derive(Parser)]
#[command(name = "verity", about = "Exact-match invoice authenticity registry")]
struct Cli {
    /// 指纹库主文件路径 (默认读取 REGISTRY_PATH)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// 语料库目录 (默认读取 CORPUS_DIR)
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 启动 HTTP 服务 (先加载指纹库，不存在则从语料库构建)
    Serve,
    /// 从语料库重新构建指纹库并保存
    Ingest,
    /// 验证一张本地图片
    Verify { image: PathBuf },
    /// 打印指纹库统计
    Stats,
    /// 输出指纹库分布报告
    Analyze {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // ----------------------------------------------------------------
    // 0. 加载配置
    // ----------------------------------------------------------------
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(path) = cli.registry {
        config.registry_path = path;
    }
    if let Some(dir) = cli.corpus {
        config.corpus_dir = dir;
    }
    info!(
        registry = %config.registry_path.display(),
        corpus = %config.corpus_dir.display(),
        "⚙️  配置加载完成"
    );

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Ingest => {
            let report = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
                let corpus = open_corpus(&config)?;
                let (_, report) = ingest::ingest(&corpus, &config.registry_path)?;
                Ok(report)
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Verify { image } => {
            let registry = persistence::load(&config.registry_path)
                .context("registry must exist before verifying; run `verity ingest` first")?;
            let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let verdict = verifier::verify_encoded(&bytes, &registry);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(())
        }
        Command::Stats => {
            let registry = match persistence::load(&config.registry_path) {
                Ok(registry) => registry,
                Err(RegistryError::NotFound(_)) => Default::default(),
                Err(e) => return Err(e.into()),
            };
            let handle = RegistryHandle::new(registry, config.registry_path.clone());
            println!("{}", serde_json::to_string_pretty(&handle.get_stats())?);
            Ok(())
        }
        Command::Analyze { out } => {
            let registry = persistence::load(&config.registry_path)?;
            let report = serde_json::to_string_pretty(&analysis::analyze(&registry))?;
            match out {
                Some(path) => {
                    std::fs::write(&path, report).with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "analysis report saved");
                }
                None => println!("{report}"),
            }
            Ok(())
        }
    }
}

fn open_corpus(config: &Config) -> Result<DirectoryCorpus, RegistryError> {
    DirectoryCorpus::open(&config.corpus_dir, config.corpus_source.clone())
        .map_err(|e| RegistryError::CorpusAccess(e.0))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("🛡️ 真票指纹库服务启动中...");

    // ----------------------------------------------------------------
    // 1. 加载或构建指纹库
    // ----------------------------------------------------------------
    let init_config = config.clone();
    let registry = tokio::task::spawn_blocking(move || {
        service::initialize(&init_config.registry_path, || open_corpus(&init_config))
    })
    .await?
    .context("failed to initialize registry")?;
    info!(fingerprints = registry.size(), "📚 指纹库就绪");

    // ----------------------------------------------------------------
    // 2. 状态共享容器
    // ----------------------------------------------------------------
    let state = Arc::new(api::AppState {
        registry: Arc::new(RegistryHandle::new(registry, config.registry_path.clone())),
        max_upload_bytes: config.max_upload_bytes,
    });

    // ----------------------------------------------------------------
    // 3. 启动 HTTP 服务
    // ----------------------------------------------------------------
    let app = api::app(state);
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("🚀 API 服务已运行在: http://{addr}");
    info!("   - POST /verify  : 上传发票图片进行真伪验证");
    info!("   - GET  /stats   : 指纹库统计");
    info!("   - GET  /health  : 健康检查");
    info!("   - POST /reload  : 从磁盘重新加载指纹库");

    axum::serve(listener, app).await?;
    Ok(())
}
