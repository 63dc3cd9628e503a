//! 工具调用编排器
//!
//! 回合级状态机：构建请求、消费流事件、分发工具、执行预算与取消。
//!
//! 每次迭代结束后的决策顺序：
//! 1. 出现有效的 `finalize_answer` 调用：以其答案结束回合
//! 2. 有工具调用且预算未耗尽：执行全部工具，结果写入日志后继续
//! 3. 有工具调用但预算耗尽：追加强制作答指令，发起一次不带工具的请求
//! 4. 无工具调用：累积文本即为最终输出

use super::budget::AgentBudget;
use super::parsers::{OpenAISSEParser, ToolCallAccumulator};
use super::progress::GenerationProgress;
use super::protocols::{GenerationParams, InferenceBackend, OpenAIProtocol};
use super::tools::prompt::FORCE_ANSWER_INSTRUCTION;
use super::tools::types::{FinalAnswer, ToolResult};
use super::tools::{search_tool_manifest, ToolExecutor, ToolInvocation};
use super::types::{AgentMessage, MessageLog, StreamEvent, TokenUsage, ToolCall, TurnPhase};
use crate::config::AgentSettings;
use crate::error::AgentError;
use crate::models::openai::ChatCompletionRequest;
use crate::resilience::CancellationToken;
use futures::StreamExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// 本回合启用的工具
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolEnablement {
    pub search: bool,
}

impl ToolEnablement {
    pub fn none() -> Self {
        Self { search: false }
    }

    pub fn with_search() -> Self {
        Self { search: true }
    }
}

/// 回合结果
///
/// 回合内的失败不以 `Err` 返回，而是记录在 `error` 中并保留已累积的输出
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// 回合 ID
    pub turn_id: String,
    /// 终止状态：Done / Cancelled / Failed
    pub state: TurnPhase,
    pub output: String,
    pub final_answer: Option<FinalAnswer>,
    #[serde(skip)]
    pub error: Option<AgentError>,
    /// 完成的工具迭代次数
    pub iterations: u32,
    pub budget: AgentBudget,
    /// 本回合追加到消息日志的消息
    pub new_messages: Vec<AgentMessage>,
    pub usage: TokenUsage,
}

/// 单次迭代的流式结果
enum StreamOutcome {
    Completed { text: String, tool_calls: Vec<ToolCall> },
    Cancelled,
    Failed(AgentError),
}

/// 单个事件处理后的流程控制
enum EventFlow {
    Continue,
    Done,
    Failed(AgentError),
}

/// 回合内状态，只由当前回合持有
struct TurnState<'a> {
    turn_id: String,
    system_prompt: Option<&'a str>,
    search_enabled: bool,
    log: MessageLog,
    history_len: usize,
    budget: AgentBudget,
    output: String,
    usage: TokenUsage,
    executed_queries: HashSet<String>,
}

/// 回合占用标记，离开作用域时释放
struct TurnGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> TurnGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Result<Self, AgentError> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AgentError::Busy)?;
        Ok(Self { busy })
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// 工具调用编排器
///
/// 一个编排器对应一个会话，同一时刻只允许一个回合运行
pub struct AgentOrchestrator {
    backend: Arc<dyn InferenceBackend>,
    executor: ToolExecutor,
    params: GenerationParams,
    base_limit: u32,
    hard_limit: u32,
    busy: AtomicBool,
    cancel_token: CancellationToken,
    progress: watch::Sender<GenerationProgress>,
}

impl AgentOrchestrator {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        executor: ToolExecutor,
        params: GenerationParams,
        settings: &AgentSettings,
    ) -> Self {
        let (progress, _) = watch::channel(GenerationProgress::default());
        Self {
            backend,
            executor,
            params,
            base_limit: settings.base_iteration_limit,
            hard_limit: settings.hard_iteration_limit,
            busy: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
            progress,
        }
    }

    /// 订阅进度快照
    pub fn subscribe(&self) -> watch::Receiver<GenerationProgress> {
        self.progress.subscribe()
    }

    /// 请求取消当前回合
    pub fn cancel(&self) {
        info!("[AgentOrchestrator] 收到取消请求");
        self.cancel_token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 是否有回合正在运行
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// 运行一个回合
    ///
    /// 已有回合运行时立即返回 `Err(AgentError::Busy)`，不会影响正在运行的回合
    pub async fn generate(
        &self,
        history: &[AgentMessage],
        system_prompt: Option<&str>,
        tools: ToolEnablement,
    ) -> Result<TurnOutcome, AgentError> {
        let _guard = match TurnGuard::acquire(&self.busy) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("[AgentOrchestrator] 已有回合在运行，拒绝新的请求");
                return Err(e);
            }
        };

        self.cancel_token.reset();
        self.progress.send_replace(GenerationProgress::started());

        let turn_id = uuid::Uuid::new_v4().to_string();
        let search_enabled = tools.search && self.executor.has_search();
        info!(
            "[AgentOrchestrator] 回合开始: turn_id={}, history_len={}, search_enabled={}, limits={}/{}",
            turn_id,
            history.len(),
            search_enabled,
            self.base_limit,
            self.hard_limit
        );

        let mut state = TurnState {
            turn_id,
            system_prompt,
            search_enabled,
            log: MessageLog::from_history(history),
            history_len: history.len(),
            budget: AgentBudget::new(self.base_limit, self.hard_limit),
            output: String::new(),
            usage: TokenUsage::default(),
            executed_queries: HashSet::new(),
        };

        Ok(self.run_turn(&mut state).await)
    }

    async fn run_turn(&self, state: &mut TurnState<'_>) -> TurnOutcome {
        loop {
            if self.cancel_token.is_cancelled() {
                return self.finish(state, TurnPhase::Cancelled, None, None);
            }

            let iteration = state.budget.used_iterations();
            self.set_phase(TurnPhase::Requesting, iteration);

            let tools = state.search_enabled.then(search_tool_manifest);
            let request =
                OpenAIProtocol::build_request(state.system_prompt, state.log.as_slice(), &self.params, tools);

            let (text, tool_calls) = match self.run_stream(state, &request).await {
                StreamOutcome::Completed { text, tool_calls } => (text, tool_calls),
                StreamOutcome::Cancelled => {
                    return self.finish(state, TurnPhase::Cancelled, None, None);
                }
                StreamOutcome::Failed(e) => {
                    return self.finish(state, TurnPhase::Failed, None, Some(e));
                }
            };

            if tool_calls.is_empty() {
                debug!("[AgentOrchestrator] 无工具调用，回合结束");
                if !text.is_empty() {
                    state.log.push(AgentMessage::assistant(text));
                }
                let output = state.output.clone();
                return self.finish_with_output(state, output, None);
            }

            let invocations: Vec<ToolInvocation> = tool_calls.iter().map(ToolInvocation::decode).collect();

            // 有效的 finalize_answer 优先于同批次的其他调用
            let mut precomputed: HashMap<usize, ToolResult> = HashMap::new();
            for (i, (call, invocation)) in tool_calls.iter().zip(&invocations).enumerate() {
                if !matches!(invocation, ToolInvocation::FinalizeAnswer(_)) {
                    continue;
                }
                let result = self.executor.execute_invocation(call, invocation.clone()).await;
                if let Some(answer) = result.final_answer.clone() {
                    info!(
                        "[AgentOrchestrator] finalize_answer 结束回合: iteration={}, other_calls={}",
                        iteration,
                        tool_calls.len() - 1
                    );
                    state
                        .log
                        .push(AgentMessage::assistant_tool_calls(&text, vec![call.clone()]));
                    state.log.push(result.message);
                    let output = answer.answer_markdown.clone();
                    return self.finish_with_output(state, output, Some(answer));
                }
                precomputed.insert(i, result);
            }

            if !state.budget.has_remaining() {
                let has_new_search = invocations.iter().any(|inv| {
                    inv.search_query()
                        .map(|q| !state.executed_queries.contains(&q))
                        .unwrap_or(false)
                });
                state.budget.maybe_extend(has_new_search);
            }

            if !state.budget.has_remaining() {
                info!(
                    "[AgentOrchestrator] 迭代预算耗尽: used={}, extended={}",
                    state.budget.used_iterations(),
                    state.budget.is_extended()
                );
                return self.force_answer(state).await;
            }

            self.set_phase(TurnPhase::ToolDispatch, iteration);
            let mut results = Vec::with_capacity(tool_calls.len());
            for (i, (call, invocation)) in tool_calls.iter().zip(invocations).enumerate() {
                if self.cancel_token.is_cancelled() {
                    info!("[AgentOrchestrator] 工具分发期间被取消");
                    return self.finish(state, TurnPhase::Cancelled, None, None);
                }
                let result = match precomputed.remove(&i) {
                    Some(result) => result,
                    None => self.dispatch(state, call, invocation).await,
                };
                if result.is_error() {
                    debug!("[AgentOrchestrator] 工具返回错误结果: call_id={}", call.id);
                }
                results.push(result);
            }

            state.log.push(AgentMessage::assistant_tool_calls(&text, tool_calls));
            for result in results {
                state.log.push(result.message);
            }
            state.budget.record_iteration();
            debug!(
                "[AgentOrchestrator] 迭代完成: used={}, limit={}",
                state.budget.used_iterations(),
                state.budget.allowed_limit()
            );
        }
    }

    /// 执行单个工具，搜索期间发布当前查询
    async fn dispatch(&self, state: &mut TurnState<'_>, call: &ToolCall, invocation: ToolInvocation) -> ToolResult {
        let query = match &invocation {
            ToolInvocation::Search(args) => args.query().map(str::to_string),
            _ => None,
        };
        let normalized = invocation.search_query();

        if let Some(q) = &query {
            self.progress.send_modify(|p| p.active_search_query = Some(q.clone()));
        }
        let result = self.executor.execute_invocation(call, invocation).await;
        if query.is_some() {
            self.progress.send_modify(|p| p.active_search_query = None);
        }

        if let Some(q) = normalized {
            state.executed_queries.insert(q);
        }
        result
    }

    /// 预算耗尽：追加指令并发起一次不带工具的请求
    async fn force_answer(&self, state: &mut TurnState<'_>) -> TurnOutcome {
        info!(
            "[AgentOrchestrator] 迭代预算耗尽 ({}), 强制生成最终答案",
            state.budget.allowed_limit()
        );
        self.set_phase(TurnPhase::Finalizing, state.budget.used_iterations());
        state.log.push(AgentMessage::user(FORCE_ANSWER_INSTRUCTION));

        let request =
            OpenAIProtocol::build_request(state.system_prompt, state.log.as_slice(), &self.params, None);

        match self.run_stream(state, &request).await {
            StreamOutcome::Completed { text, tool_calls } => {
                if !tool_calls.is_empty() {
                    warn!(
                        "[AgentOrchestrator] 强制作答请求仍返回 {} 个工具调用，已忽略",
                        tool_calls.len()
                    );
                }
                if !text.is_empty() {
                    state.log.push(AgentMessage::assistant(text.clone()));
                }
                self.finish_with_output(state, text, None)
            }
            StreamOutcome::Cancelled => self.finish(state, TurnPhase::Cancelled, None, None),
            StreamOutcome::Failed(e) => self.finish(state, TurnPhase::Failed, None, Some(e)),
        }
    }

    /// 发送请求并消费一次响应流
    async fn run_stream(&self, state: &mut TurnState<'_>, request: &ChatCompletionRequest) -> StreamOutcome {
        let mut lines = match self.backend.stream_chat(request).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("[AgentOrchestrator] 请求失败: {}", e);
                return StreamOutcome::Failed(e);
            }
        };

        self.set_phase(TurnPhase::Streaming, state.budget.used_iterations());
        let mut parser = OpenAISSEParser::new();
        let mut accumulator = ToolCallAccumulator::new();
        let mut text = String::new();

        'read: loop {
            // 上游停止发送时也要能响应取消
            let next = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => None,
                next = lines.next() => Some(next),
            };
            let line = match next {
                None => {
                    info!("[AgentOrchestrator] 等待响应时被取消，中止请求");
                    return StreamOutcome::Cancelled;
                }
                Some(None) => break 'read,
                Some(Some(line)) => line,
            };

            if self.cancel_token.is_cancelled() {
                info!("[AgentOrchestrator] 流读取中被取消，中止请求");
                return StreamOutcome::Cancelled;
            }

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("[AgentOrchestrator] 流读取失败: {}", e);
                    return StreamOutcome::Failed(e);
                }
            };

            for event in parser.parse_line(&line) {
                match self.apply_event(state, event, &mut accumulator, &mut text) {
                    EventFlow::Continue => {}
                    EventFlow::Done => break 'read,
                    EventFlow::Failed(e) => return StreamOutcome::Failed(e),
                }
            }
        }
        drop(lines);

        if text.is_empty() && accumulator.is_empty() && parser.has_fallback() {
            debug!("[AgentOrchestrator] 结构化解析无结果，尝试解析原始响应体");
            for event in parser.fallback_events() {
                match self.apply_event(state, event, &mut accumulator, &mut text) {
                    EventFlow::Continue | EventFlow::Done => {}
                    EventFlow::Failed(e) => return StreamOutcome::Failed(e),
                }
            }
        }

        StreamOutcome::Completed {
            text,
            tool_calls: accumulator.build_tool_calls(),
        }
    }

    fn apply_event(
        &self,
        state: &mut TurnState<'_>,
        event: StreamEvent,
        accumulator: &mut ToolCallAccumulator,
        text: &mut String,
    ) -> EventFlow {
        match event {
            StreamEvent::TextDelta(delta) => {
                text.push_str(&delta);
                state.output.push_str(&delta);
                self.progress
                    .send_modify(|p| p.partial_output.push_str(&delta));
                EventFlow::Continue
            }
            StreamEvent::ToolCallDelta(delta) => {
                accumulator.append(delta);
                EventFlow::Continue
            }
            StreamEvent::Usage(usage) => {
                state.usage.accumulate(&usage);
                EventFlow::Continue
            }
            StreamEvent::Error(message) => {
                warn!("[AgentOrchestrator] Provider 返回错误: {}", message);
                EventFlow::Failed(AgentError::Provider(message))
            }
            StreamEvent::Done => EventFlow::Done,
        }
    }

    fn set_phase(&self, phase: TurnPhase, iteration: u32) {
        self.progress.send_modify(|p| {
            p.phase = phase;
            p.iteration = iteration;
        });
    }

    fn finish_with_output(
        &self,
        state: &TurnState<'_>,
        output: String,
        final_answer: Option<FinalAnswer>,
    ) -> TurnOutcome {
        self.progress.send_modify(|p| p.partial_output = output.clone());
        let mut outcome = self.finish(state, TurnPhase::Done, final_answer, None);
        outcome.output = output;
        outcome
    }

    /// 生成终止结果并发布最终快照
    fn finish(
        &self,
        state: &TurnState<'_>,
        phase: TurnPhase,
        final_answer: Option<FinalAnswer>,
        error: Option<AgentError>,
    ) -> TurnOutcome {
        match &error {
            Some(e) if e.is_http() => error!(
                "[AgentOrchestrator] 回合失败: turn_id={}, status={}, {}",
                state.turn_id,
                e.status_code(),
                e
            ),
            Some(e) => warn!("[AgentOrchestrator] 回合失败: turn_id={}, {}", state.turn_id, e),
            None => info!(
                "[AgentOrchestrator] 回合结束: turn_id={}, state={:?}, iterations={}, messages={}, output_len={}",
                state.turn_id,
                phase,
                state.budget.used_iterations(),
                state.log.len(),
                state.output.len()
            ),
        }

        self.progress.send_modify(|p| {
            p.running = false;
            p.phase = phase;
            p.active_search_query = None;
        });

        TurnOutcome {
            turn_id: state.turn_id.clone(),
            state: phase,
            output: state.output.clone(),
            final_answer,
            error,
            iterations: state.budget.used_iterations(),
            budget: state.budget.clone(),
            new_messages: state.log.appended_since(state.history_len),
            usage: state.usage,
        }
    }
}
