//! searchcast 命令行入口
//!
//! 运行一个带搜索工具的回合，流式打印输出；Ctrl-C 触发协作式取消

use anyhow::{bail, Context, Result};
use clap::Parser;
use searchcast::agent::tools::prompt::system_prompt_or_default;
use searchcast::agent::{
    AgentMessage, AgentOrchestrator, GenerationParams, HttpSearchClient, OpenAIBackend,
    SearchClient, ToolEnablement, ToolExecutor, TurnPhase,
};
use searchcast::logger::init_logging;
use searchcast::Config;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "searchcast")]
#[command(about = "Search-augmented answers from a chat-completion endpoint")]
struct Args {
    /// 用户问题
    prompt: Option<String>,

    /// Provider API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// 搜索服务 API key
    #[arg(long, env = "SEARCH_API_KEY", hide_env_values = true)]
    search_api_key: Option<String>,

    /// Provider base URL
    #[arg(long)]
    base_url: Option<String>,

    /// 模型名称
    #[arg(long)]
    model: Option<String>,

    /// 配置文件路径（默认 ~/.searchcast/config.yaml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 自定义系统提示词
    #[arg(long)]
    system: Option<String>,

    /// 禁用搜索工具
    #[arg(long)]
    no_search: bool,

    /// 列出可用模型后退出
    #[arg(long)]
    list_models: bool,
}

impl Args {
    /// 命令行参数覆盖配置文件
    fn apply(&self, config: &mut Config) {
        if let Some(key) = &self.api_key {
            config.provider.api_key = Some(key.clone());
        }
        if let Some(key) = &self.search_api_key {
            config.search.api_key = Some(key.clone());
        }
        if let Some(url) = &self.base_url {
            config.provider.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.provider.model = model.clone();
        }
        if self.no_search {
            config.agent.search_enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    args.apply(&mut config);
    config.validate()?;
    init_logging(&config.logging)?;

    let backend = Arc::new(
        OpenAIBackend::new(&config.provider, &config.timeouts).context("初始化推理后端失败")?,
    );

    if args.list_models {
        for model in backend.list_models().await? {
            println!("{}", model);
        }
        return Ok(());
    }

    let Some(prompt) = args.prompt.as_deref().filter(|p| !p.trim().is_empty()) else {
        bail!("缺少问题，用法: searchcast \"<prompt>\"");
    };

    let search: Option<Arc<dyn SearchClient>> = if config.agent.search_enabled {
        match HttpSearchClient::new(&config.search) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("[searchcast] 搜索不可用: {}", e);
                None
            }
        }
    } else {
        None
    };

    let orchestrator = Arc::new(AgentOrchestrator::new(
        backend,
        ToolExecutor::new(search, config.search.include_highlights),
        GenerationParams::from(&config.provider),
        &config.agent,
    ));

    let printer = spawn_printer(&orchestrator);

    let history = vec![AgentMessage::user(prompt)];
    let system_prompt = system_prompt_or_default(args.system.as_deref());
    let tools = if config.agent.search_enabled {
        ToolEnablement::with_search()
    } else {
        ToolEnablement::none()
    };

    let turn = orchestrator.generate(&history, Some(system_prompt), tools);
    tokio::pin!(turn);
    let outcome = loop {
        tokio::select! {
            result = &mut turn => break result?,
            _ = tokio::signal::ctrl_c() => orchestrator.cancel(),
        }
    };

    let streamed = printer.await.unwrap_or_default();
    if outcome.output != streamed {
        println!("\n\n{}", outcome.output);
    } else {
        println!();
    }

    debug!(
        "[searchcast] iterations={} tokens={}",
        outcome.iterations,
        outcome.usage.total()
    );

    match outcome.state {
        TurnPhase::Cancelled => eprintln!("[已取消]"),
        TurnPhase::Failed => match outcome.error {
            Some(e) => bail!("生成失败 [{}]: {}", e.status_code(), e),
            None => bail!("生成失败: 未知错误"),
        },
        _ if outcome.output.trim().is_empty() => bail!("模型没有返回任何内容"),
        _ => {}
    }

    Ok(())
}

/// 订阅进度并把增量输出打印到 stdout，返回已打印的文本
fn spawn_printer(orchestrator: &AgentOrchestrator) -> tokio::task::JoinHandle<String> {
    let mut rx = orchestrator.subscribe();
    tokio::spawn(async move {
        let mut streamed = String::new();
        let mut last_query: Option<String> = None;

        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();

            if snapshot.active_search_query != last_query {
                if let Some(query) = &snapshot.active_search_query {
                    eprintln!("\n[search] {}", query);
                }
                last_query = snapshot.active_search_query.clone();
            }

            if let Some(delta) = snapshot.partial_output.strip_prefix(streamed.as_str()) {
                if !delta.is_empty() {
                    print!("{}", delta);
                    let _ = std::io::stdout().flush();
                    streamed.push_str(delta);
                }
            }

            if !snapshot.running && snapshot.phase.is_terminal() {
                break;
            }
        }

        streamed
    })
}
