//! The Orchestrator (C6): the six-phase iteration loop, pathology detector,
//! context injector, and termination rules.
//!
//! Structurally this keeps the teacher's shape for `orchestrator.rs` — a
//! config/builder pair plus a driving loop with an explicit escape-hatch for
//! re-prompting on a stuck turn — but the body is rewritten entirely: the
//! teacher's `FallbackLoop<S: Signature>` drives bounded recursive LLM
//! sub-calls, while this loop drives the fixed P0-P6 reconnaissance pipeline
//! against a single target per mission.

use crate::agents::{
    filter_allow_listed, handbook_query, looks_like_vulnerability_filename,
    synthesize_steps_from_tactical_plan, CleanedData, CleanedPayload, DataCleaner, Evaluator,
    ExecutionContext, Executor, ExecutorPlan, Profiler, RagMemory, Reasoner, ReasonerOutput,
    VulnLookup,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::intelligence::{
    analysis_fingerprint, command_signature, merge_services, merge_vulnerabilities,
    DiscoveredService, IntelligenceContext, SessionStep, StepOutcome, TacticalPlanObject,
    TargetProfile, TrainingPair, VulnerabilityInfo,
};
use crate::persistence::{ArtefactPaths, ArtefactWriter, FinalProfileFile, IterationIntelligenceFile};
use crate::retry::{classify, retry_with_backoff, ClassifiableError, ErrorClass};
use crate::trajectory::{LogEntry, Phase};
use crate::transport::{ToolTransport, RAG_RECALL_WARNINGS_TOOL, RAG_SEARCH_HANDBOOK_TOOL};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Base delay for a rate-limited retry, mirroring `retry_with_backoff`'s own
/// constant — P1 can't use that combinator directly (see `reason_with_retry`)
/// but still backs off on the same schedule.
const RATE_LIMITED_BASE_DELAY: Duration = Duration::from_secs(30);

/// Negative phrases that, when every cleaned result's summary matches one
/// case-insensitively, trigger the database-exhaustion pathology block.
const EXHAUSTION_PHRASES: &[&str] = &[
    "no exploits found",
    "0 results",
    "no matches",
    "not found",
    "0 shellcodes",
    "0 exploits",
    "no relevant warnings",
    "no relevant playbooks",
];

fn generate_session_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let unix_ms = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("session_{}_{}", unix_ms, suffix)
}

/// Session state (orchestrator-scoped, recreated per `reconnaissance` call).
/// Exclusively owned by one logical invocation; never mutated concurrently
/// across iterations.
#[derive(Debug, Default)]
pub struct Session {
    pub session_id: String,
    pub analysed_fingerprints: HashSet<String>,
    pub command_history: HashMap<String, u32>,
    pub services: Vec<DiscoveredService>,
    pub intelligence: Option<IntelligenceContext>,
    pub tactical_plans: Vec<TacticalPlanObject>,
    pub aggregated_results: Vec<CleanedData>,
    pub file_parsed_vulns: Vec<VulnerabilityInfo>,
    pub iteration: u32,
    pub step_index: u32,
    pub training_pairs: Vec<TrainingPair>,
    /// Count of P4 passes that analysed at least one new service — the
    /// numbering source for iteration-intelligence files, distinct from
    /// `iteration` (the mission loop counter).
    pub enrichment_count: u32,
}

impl Session {
    fn new() -> Self {
        Self {
            session_id: generate_session_id(),
            ..Default::default()
        }
    }
}

/// Result of one `reconnaissance` mission.
#[derive(Debug, Clone)]
pub struct ReconResult {
    pub session_id: String,
    pub iterations: u32,
    pub results: Vec<CleanedData>,
    pub discovered_services: Vec<DiscoveredService>,
    pub tactical_plans: Vec<TacticalPlanObject>,
    pub intelligence: Option<IntelligenceContext>,
}

/// Everything P6 needs from one iteration's tool-execution pass.
struct IterationOutcome {
    results: Vec<CleanedData>,
    failures: Vec<(String, String)>,
    repeated_commands: Vec<String>,
}

/// The reconnaissance orchestrator. Construct via `OrchestratorBuilder`.
pub struct Orchestrator {
    config: Config,
    transport: ToolTransport,
    reasoner: Box<dyn Reasoner>,
    executor: Box<dyn Executor>,
    cleaner: Box<dyn DataCleaner>,
    profiler: Box<dyn Profiler>,
    vuln_lookup: Box<dyn VulnLookup>,
    rag: Option<Box<dyn RagMemory>>,
    evaluator: Option<Box<dyn Evaluator>>,
    writer: ArtefactWriter,
    initialised: bool,
}

/// Builds an `Orchestrator` from its configuration and agent collaborators,
/// mirroring the teacher's chained `with_*` construction style.
pub struct OrchestratorBuilder {
    config: Config,
    transport: Option<ToolTransport>,
    reasoner: Option<Box<dyn Reasoner>>,
    executor: Option<Box<dyn Executor>>,
    cleaner: Option<Box<dyn DataCleaner>>,
    profiler: Option<Box<dyn Profiler>>,
    vuln_lookup: Option<Box<dyn VulnLookup>>,
    rag: Option<Box<dyn RagMemory>>,
    evaluator: Option<Box<dyn Evaluator>>,
}

impl OrchestratorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            reasoner: None,
            executor: None,
            cleaner: None,
            profiler: None,
            vuln_lookup: None,
            rag: None,
            evaluator: None,
        }
    }

    pub fn with_transport(mut self, transport: ToolTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_reasoner(mut self, reasoner: Box<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn with_executor(mut self, executor: Box<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_cleaner(mut self, cleaner: Box<dyn DataCleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn with_profiler(mut self, profiler: Box<dyn Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn with_vuln_lookup(mut self, vuln_lookup: Box<dyn VulnLookup>) -> Self {
        self.vuln_lookup = Some(vuln_lookup);
        self
    }

    pub fn with_rag_memory(mut self, rag: Box<dyn RagMemory>) -> Self {
        self.rag = Some(rag);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| Error::config("transport is required"))?;
        let reasoner = self
            .reasoner
            .ok_or_else(|| Error::config("reasoner is required"))?;
        let executor = self
            .executor
            .ok_or_else(|| Error::config("executor is required"))?;
        let cleaner = self
            .cleaner
            .ok_or_else(|| Error::config("data cleaner is required"))?;
        let profiler = self
            .profiler
            .ok_or_else(|| Error::config("profiler is required"))?;
        let vuln_lookup = self
            .vuln_lookup
            .ok_or_else(|| Error::config("vuln lookup is required"))?;

        let paths = ArtefactPaths {
            logs_root: std::path::PathBuf::from("logs"),
            tactical_root: std::path::PathBuf::from("Tactical"),
            training_data_path: self.config.training_data_path.clone(),
            session_logs_path: self.config.session_logs_path.clone(),
        };

        Ok(Orchestrator {
            config: self.config,
            transport,
            reasoner,
            executor,
            cleaner,
            profiler,
            vuln_lookup,
            rag: self.rag,
            evaluator: self.evaluator,
            writer: ArtefactWriter::new(paths),
            initialised: false,
        })
    }
}

impl Orchestrator {
    fn log(&self, entry: LogEntry) {
        entry.emit_tracing();
        if let Some(sink) = &self.config.on_log {
            sink(&entry);
        }
    }

    /// Load skills, connect transports, discover remote tools. Idempotent.
    pub async fn initialise(&mut self) -> Result<()> {
        if self.initialised {
            return Ok(());
        }
        let tools = self.transport.list_kali_tools().await?;
        self.log(LogEntry::info(
            Phase::McpAgent,
            format!("discovered {} tools", tools.len()),
        ));
        self.initialised = true;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        self.transport.shutdown().await;
        self.initialised = false;
    }

    /// Drive a full reconnaissance mission against `target`.
    pub async fn reconnaissance(&mut self, target: &str) -> Result<ReconResult> {
        if !self.initialised {
            self.initialise().await?;
        }

        let mut session = Session::new();
        self.reasoner.reset();
        self.log(LogEntry::info(
            Phase::Orchestrator,
            format!("session {} started against {}", session.session_id, target),
        ));

        let mut observation = format!("Begin reconnaissance against {}.", target);
        let mut completed = false;

        'iteration: while session.iteration < self.config.max_iterations {
            session.iteration += 1;

            // P0 — RAG anti-pattern recall
            if self.config.enable_rag_memory && !self.config.debug_skip_rag_recall_injection {
                if let Some(rag) = &self.rag {
                    match rag.recall_internal_warnings(&observation).await {
                        Ok(recall) if !recall.formatted_text.is_empty() => {
                            self.reasoner.inject_anti_pattern_context(recall.formatted_text);
                        }
                        Ok(_) => {}
                        Err(e) => self.log(LogEntry::warn(Phase::RagMemory, format!("recall failed: {e}"))),
                    }
                }
            }

            // P1 — Strategic reasoning, wrapped in C4 retry.
            let reasoner_output = match self.reason_with_retry(&observation).await {
                Some(output) => output,
                None => {
                    self.log(LogEntry::error(
                        Phase::Reasoner,
                        "reasoner failed after exhausting retries; aborting mission",
                    ));
                    return Err(Error::reasoner_failed("reasoner exhausted retries"));
                }
            };

            if let Some(plan) = &reasoner_output.tactical_plan {
                session.tactical_plans.push(plan.clone());
            }

            if reasoner_output.is_complete {
                completed = true;
                break 'iteration;
            }

            // P2 — Execution planning. If the tactical plan already names
            // a-priori tools, bypass the Executor/LLM entirely and
            // synthesise steps straight from the attack vectors.
            let plan = if let Some(steps) = synthesize_steps_from_tactical_plan(&reasoner_output) {
                ExecutorPlan { steps, current_step: 0, status: None }
            } else {
                let exec_ctx = ExecutionContext {
                    target: target.to_string(),
                    open_ports: distinct_ports(&session.services),
                };
                match self.executor.plan_execution(&reasoner_output, &exec_ctx).await {
                    Ok(plan) if !plan.is_empty() => plan,
                    Ok(_) => {
                        observation = "No executable steps were produced. Reassess available tools and intelligence.".to_string();
                        self.reasoner.add_observation(&observation);
                        continue 'iteration;
                    }
                    Err(e) => {
                        self.log(LogEntry::warn(Phase::Executor, format!("malformed plan: {e}")));
                        observation = "No executable steps were produced. Reassess available tools and intelligence.".to_string();
                        self.reasoner.add_observation(&observation);
                        continue 'iteration;
                    }
                }
            };

            // Allow-list is the transport's discovered set plus the two
            // well-known memory tool names, which `list_kali_tools` never
            // enumerates since the memory endpoint is queried directly.
            let mut allow_list = self.transport.discovered_tools().to_vec();
            allow_list.push(RAG_RECALL_WARNINGS_TOOL.to_string());
            allow_list.push(RAG_SEARCH_HANDBOOK_TOOL.to_string());
            let (steps, dropped) = filter_allow_listed(plan.steps.clone(), &allow_list);
            for tool in &dropped {
                self.log(LogEntry::warn(Phase::Executor, format!("dropped hallucinated tool '{tool}'")));
            }

            // P3 — Tool execution loop (sequential)
            let iteration_outcome = self.run_tool_steps(&mut session, &steps).await;

            // P4 — Intelligence enrichment (parallel, incremental)
            let newly_analysed_services = self.enrich_intelligence(&mut session).await;

            // P4b — RAG playbook recall
            let mut playbooks: Vec<String> = Vec::new();
            if self.config.enable_rag_memory {
                if let Some(rag) = &self.rag {
                    let os_family = session
                        .intelligence
                        .as_ref()
                        .and_then(|ctx| ctx.target_profile.as_ref())
                        .and_then(|p| p.os_family.clone());
                    let query = handbook_query(&session.services, os_family);
                    match rag.search_handbook(&query).await {
                        Ok(recall) => {
                            playbooks = recall.playbooks;
                            let capped = cap_playbook_text(&recall.formatted_text, self.config.playbook_char_cap);
                            self.reasoner.inject_playbook_context(capped);
                        }
                        Err(e) => self.log(LogEntry::warn(Phase::RagMemory, format!("handbook search failed: {e}"))),
                    }
                }
            }

            // P5 — Evaluation (optional)
            if self.config.enable_evaluation {
                if let Some(plan) = reasoner_output.tactical_plan.clone() {
                    self.run_evaluation(&mut session, &plan).await;
                }
            }
            self.log_session_step(&session, &observation, &reasoner_output, &iteration_outcome).await;

            if let Some(new_services) = &newly_analysed_services {
                self.persist_iteration_intelligence(&session, &playbooks, new_services).await;
            }

            // P6 — Next-observation synthesis
            observation = self.build_next_observation(&iteration_outcome, &session);
            self.reasoner.add_observation(&observation);

            session.aggregated_results.extend(iteration_outcome.results);

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        // COMPLETION
        if completed {
            if self.config.enable_rag_memory && !session.services.is_empty() {
                if let Some(rag) = &self.rag {
                    let os_family = session
                        .intelligence
                        .as_ref()
                        .and_then(|ctx| ctx.target_profile.as_ref())
                        .and_then(|p| p.os_family.clone());
                    let query = handbook_query(&session.services, os_family);
                    if let Ok(recall) = rag.search_handbook(&query).await {
                        let capped = cap_playbook_text(&recall.formatted_text, self.config.playbook_char_cap);
                        self.reasoner.inject_playbook_context(capped);
                    }
                }
            }

            if session.tactical_plans.is_empty() {
                let forcing = "You now have full playbook context injected. You MUST produce a tactical_plan before the mission can conclude.";
                if let Ok(output) = self.reasoner.reason(forcing).await {
                    if let Some(plan) = output.tactical_plan {
                        session.tactical_plans.push(plan);
                    }
                }
            }
        }

        self.flush_training_pairs(&session).await;

        if let Some(plan) = session.tactical_plans.last() {
            if let Err(e) = self.writer.write_tactical_plan(&session.session_id, plan).await {
                self.log(LogEntry::warn(Phase::TacticalPlan, format!("write failed: {e}")));
            }
        }

        if completed {
            self.write_final_profile(&session).await;
        }

        Ok(ReconResult {
            session_id: session.session_id,
            iterations: session.iteration,
            results: session.aggregated_results,
            discovered_services: session.services,
            tactical_plans: session.tactical_plans,
            intelligence: session.intelligence,
        })
    }

    /// P1's retry wrapper. Can't use `retry_with_backoff` here: `reason`
    /// takes `&mut self.reasoner`, and a closure handed to a generic
    /// `FnMut() -> Fut` combinator can't return a future borrowing a
    /// captured mutable reference without that borrow escaping the closure
    /// body. Hand-rolled, but the same classify/backoff schedule as C4.
    async fn reason_with_retry(&mut self, observation: &str) -> Option<ReasonerOutput> {
        let max_retries = 2;
        let initial_delay = Duration::from_secs(1);
        let mut attempt: u32 = 0;
        loop {
            match self.reasoner.reason(observation).await {
                Ok(output) => return Some(output),
                Err(e) => {
                    let class = classify(e.status_code(), &e.message());
                    if class == ErrorClass::ContextTooLong || attempt >= max_retries {
                        return None;
                    }
                    let base = match class {
                        ErrorClass::RateLimited => RATE_LIMITED_BASE_DELAY,
                        _ => initial_delay,
                    };
                    tokio::time::sleep(base * 2u32.pow(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_tool_steps(&mut self, session: &mut Session, steps: &[crate::transport::ToolStep]) -> IterationOutcome {
        let mut results = Vec::new();
        let mut failures = Vec::new();
        let mut repeated_commands = Vec::new();

        for step in steps {
            let signature = command_signature(&step.tool, &step.arguments);
            let count = session.command_history.entry(signature.clone()).or_insert(0);
            *count += 1;
            if *count >= self.config.duplicate_command_warn_threshold as u32 {
                repeated_commands.push(signature.clone());
                self.log(LogEntry::warn(
                    Phase::Orchestrator,
                    format!("repeated command signature: {signature}"),
                ));
            }

            let tool_result = self.transport.execute_tool(step).await;
            session.step_index += 1;

            if tool_result.success {
                self.log(LogEntry::step(Phase::McpAgent, format!("{} succeeded", step.tool)));
                let cleaned = match self.cleaner.clean(&tool_result.output, &step.tool).await {
                    Ok(cleaned) => cleaned,
                    Err(e) => {
                        self.log(LogEntry::warn(Phase::DataCleaner, format!("parse failed: {e}")));
                        CleanedData {
                            r#type: "unknown".into(),
                            data: CleanedPayload::Unknown { raw: tool_result.output.clone() },
                            summary: "parse failure, raw data retained".into(),
                        }
                    }
                };

                if let Some(services) = cleaned.services() {
                    let merge = merge_services(&session.services, services);
                    for svc in &merge.newly_added {
                        self.log(LogEntry::result(
                            Phase::Intelligence,
                            format!("new service {}:{} ({})", svc.host, svc.port, svc.service),
                        ));
                    }
                    session.services = merge.merged;
                }

                if looks_like_vulnerability_filename(&step.description) {
                    match self.cleaner.parse_vulnerability_report(&tool_result.output).await {
                        Ok(vulns) => session.file_parsed_vulns.extend(vulns),
                        Err(e) => self.log(LogEntry::warn(Phase::DataCleaner, format!("vuln report parse failed: {e}"))),
                    }
                }

                results.push(cleaned);
            } else {
                let error = tool_result.error.unwrap_or_else(|| "unknown error".to_string());
                self.log(LogEntry::warn(Phase::McpAgent, format!("{} failed: {error}", step.tool)));
                failures.push((step.tool.clone(), error));
            }
        }

        IterationOutcome { results, failures, repeated_commands }
    }

    /// Returns the services newly analysed this pass (and bumps
    /// `session.enrichment_count`), or `None` if P4 didn't run because
    /// there was nothing unanalysed.
    async fn enrich_intelligence(&mut self, session: &mut Session) -> Option<Vec<DiscoveredService>> {
        if session.services.is_empty() {
            return None;
        }
        let new_services: Vec<DiscoveredService> = session
            .services
            .iter()
            .filter(|svc| !session.analysed_fingerprints.contains(&analysis_fingerprint(svc)))
            .cloned()
            .collect();
        if new_services.is_empty() {
            return None;
        }

        let profiler = &self.profiler;
        let vuln_lookup = &self.vuln_lookup;
        let svc_for_profile = new_services.clone();
        let svc_for_vulns = new_services.clone();

        let (profile_outcome, vuln_outcome) = tokio::join!(
            retry_with_backoff(|| { let s = svc_for_profile.clone(); async move { profiler.profile(&s).await } }, 2, Duration::from_secs(1)),
            retry_with_backoff(|| { let s = svc_for_vulns.clone(); async move { vuln_lookup.lookup(&s).await } }, 2, Duration::from_secs(1)),
        );

        for svc in &new_services {
            session.analysed_fingerprints.insert(analysis_fingerprint(svc));
        }
        session.enrichment_count += 1;

        let new_profile: Option<TargetProfile> = if profile_outcome.ok {
            profile_outcome.value.flatten()
        } else {
            self.log(LogEntry::warn(Phase::Profiler, "degraded: profiler exhausted retries"));
            None
        };
        let new_vulns: Vec<VulnerabilityInfo> = if vuln_outcome.ok {
            vuln_outcome.value.unwrap_or_default()
        } else {
            self.log(LogEntry::warn(Phase::VulnLookup, "degraded: vuln lookup exhausted retries"));
            Vec::new()
        };

        let previous_profile = session.intelligence.as_ref().and_then(|ctx| ctx.target_profile.clone());
        let previous_vulns = session.intelligence.as_ref().map(|ctx| ctx.vulnerabilities.clone()).unwrap_or_default();

        let mut ctx = IntelligenceContext {
            services: session.services.clone(),
            target_profile: new_profile.or(previous_profile),
            vulnerabilities: merge_vulnerabilities(&previous_vulns, &new_vulns),
            poc_findings: Vec::new(),
        };
        ctx.derive_poc_findings();
        self.reasoner.set_intelligence_context(ctx.clone());
        session.intelligence = Some(ctx);
        Some(new_services)
    }

    async fn run_evaluation(&mut self, session: &mut Session, plan: &TacticalPlanObject) {
        for vector in &plan.attack_vectors {
            let step = crate::transport::ToolStep {
                tool: vector.action.tool_name.clone(),
                arguments: vector.action.parameters.clone(),
                description: vector.prediction_metrics.hypothesis.clone(),
            };
            let tool_result = self.transport.execute_tool(&step).await;

            let evaluation = if tool_result.success {
                match &self.evaluator {
                    Some(evaluator) => {
                        match evaluator
                            .evaluate(&vector.vector_id, &vector.prediction_metrics, &tool_result.output)
                            .await
                        {
                            Ok(eval) => Some(eval),
                            Err(e) => {
                                self.log(LogEntry::warn(Phase::EvaluationLoop, format!("evaluation failed: {e}")));
                                None
                            }
                        }
                    }
                    None => None,
                }
            } else {
                None
            };

            let pair = TrainingPair {
                session_id: session.session_id.clone(),
                iteration: session.iteration,
                intelligence_snapshot: session.intelligence.clone().unwrap_or_default(),
                reasoner_prompt_synopsis: vector.prediction_metrics.hypothesis.clone(),
                tactical_plan: plan.clone(),
                execution_output: tool_result.output.clone(),
                execution_success: tool_result.success,
                evaluation,
                created_at: chrono::Utc::now(),
                model_version: "unspecified".to_string(),
            };
            session.training_pairs.push(pair);
        }
        self.flush_training_pairs(session).await;
    }

    async fn flush_training_pairs(&mut self, session: &Session) {
        if session.training_pairs.is_empty() {
            return;
        }
        let unix_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        if let Err(e) = self
            .writer
            .flush_training_pairs(&session.session_id, &session.training_pairs, unix_ms)
            .await
        {
            self.log(LogEntry::warn(Phase::TrainingData, format!("flush failed: {e}")));
        }
    }

    async fn log_session_step(&mut self, session: &Session, observation: &str, output: &ReasonerOutput, outcome: &IterationOutcome) {
        if self.config.session_logs_path.is_none() {
            return;
        }
        let outcome_label = if !outcome.failures.is_empty() && outcome.results.is_empty() {
            StepOutcome::Failed
        } else if !outcome.failures.is_empty() {
            StepOutcome::Partial
        } else {
            StepOutcome::Success
        };
        let step = SessionStep {
            session_id: session.session_id.clone(),
            iteration: session.iteration,
            step_index: session.step_index,
            timestamp: chrono::Utc::now(),
            observation: observation.to_string(),
            thought: output.thought.clone(),
            action: output.action.clone(),
            result_summary: format!("{} results, {} failures", outcome.results.len(), outcome.failures.len()),
            outcome: outcome_label,
        };
        if let Err(e) = self.writer.append_session_step(&step).await {
            self.log(LogEntry::warn(Phase::SessionLogging, format!("append failed: {e}")));
        }
    }

    async fn persist_iteration_intelligence(
        &mut self,
        session: &Session,
        playbooks: &[String],
        new_services: &[DiscoveredService],
    ) {
        let ctx = session.intelligence.clone().unwrap_or_default();
        let file = IterationIntelligenceFile {
            session_id: session.session_id.clone(),
            iteration: session.enrichment_count,
            timestamp: chrono::Utc::now(),
            new_services: new_services.to_vec(),
            target_profile: ctx.target_profile,
            vulnerabilities: ctx.vulnerabilities,
            rag_playbooks: playbooks.to_vec(),
        };
        if let Err(e) = self.writer.write_iteration_intelligence(&file).await {
            self.log(LogEntry::warn(Phase::Intelligence, format!("write failed: {e}")));
        }
    }

    async fn write_final_profile(&mut self, session: &Session) {
        let ctx = session.intelligence.clone().unwrap_or_default();
        let vulnerabilities = merge_vulnerabilities(&ctx.vulnerabilities, &session.file_parsed_vulns);
        let file = FinalProfileFile {
            session_id: session.session_id.clone(),
            iterations: session.iteration,
            results_count: session.aggregated_results.len(),
            services: session.services.clone(),
            target_profile: ctx.target_profile,
            vulnerabilities,
            last_tactical_plan: session.tactical_plans.last().cloned(),
        };
        if let Err(e) = self.writer.write_final_profile(&file).await {
            self.log(LogEntry::warn(Phase::Intelligence, format!("final profile write failed: {e}")));
        }
    }

    fn build_next_observation(&self, outcome: &IterationOutcome, session: &Session) -> String {
        let mut observation = String::new();

        if outcome.results.is_empty() && outcome.failures.is_empty() {
            let families = tool_families(self.transport.discovered_tools());
            observation.push_str(&format!(
                "No tool output was produced this iteration. Reassess — available tool families: {}.",
                families.join(", ")
            ));
        } else {
            if !outcome.failures.is_empty() {
                observation.push_str(&format!("WARNING — {} tool(s) FAILED:\n", outcome.failures.len()));
                for (tool, error) in &outcome.failures {
                    observation.push_str(&format!("  {}: {}\n", tool, error));
                }
                observation.push_str("Do NOT assume their results are available.\n");
            }
            if !outcome.results.is_empty() {
                observation.push_str("Results:\n");
                for (i, result) in outcome.results.iter().enumerate() {
                    observation.push_str(&format!("{}. [{}] {}\n", i + 1, result.r#type, result.summary));
                }
                if let Some(ctx) = &session.intelligence {
                    observation.push_str(&intelligence_summary_block(ctx));
                }
            }
        }

        if !outcome.repeated_commands.is_empty() {
            observation.push_str(LOOP_DETECTED_BLOCK);
        }

        if !outcome.results.is_empty() && all_results_exhausted(&outcome.results) {
            observation.push_str(DATABASE_EXHAUSTION_BLOCK);
        }

        observation
    }
}

fn distinct_ports(services: &[DiscoveredService]) -> Vec<u16> {
    let mut ports: Vec<u16> = services.iter().map(|s| s.port).collect();
    ports.sort_unstable();
    ports.dedup();
    ports
}

fn tool_families(tools: &[String]) -> Vec<String> {
    let mut families: Vec<String> = tools
        .iter()
        .map(|t| t.split('_').next().unwrap_or(t).to_string())
        .collect();
    families.sort();
    families.dedup();
    families
}

fn cap_playbook_text(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let truncated: String = text.chars().take(cap).collect();
    format!("{}\n[TRUNCATED — playbook text exceeded {} characters]", truncated, cap)
}

fn intelligence_summary_block(ctx: &IntelligenceContext) -> String {
    let mut block = String::new();
    block.push_str(&format!("\nIntelligence summary: {} services known.\n", ctx.services.len()));
    if let Some(profile) = &ctx.target_profile {
        block.push_str(&format!(
            "Target profile: os={:?}, posture={:?}, risk={:?}\n",
            profile.os_family, profile.security_posture, profile.risk_level
        ));
    }
    let mut cves: Vec<&str> = ctx.vulnerabilities.iter().map(|v| v.cve_id.as_str()).collect();
    cves.truncate(3);
    if !cves.is_empty() {
        block.push_str(&format!("Top CVEs: {}\n", cves.join(", ")));
    }
    block.push_str(&format!("Vulnerability count: {}\n", ctx.vulnerabilities.len()));
    block
}

fn all_results_exhausted(results: &[CleanedData]) -> bool {
    results.iter().all(|r| {
        let lower = r.summary.to_ascii_lowercase();
        EXHAUSTION_PHRASES.iter().any(|phrase| lower.contains(phrase))
    })
}

const LOOP_DETECTED_BLOCK: &str = "\n[SYSTEM INTERVENTION - LOOP DETECTED]\n\
1. STOP repeating the same command — it has already run and its result is known.\n\
2. Re-evaluate the tools actually available before choosing the next action.\n\
3. Pivot strategy: target a different service, port, or vulnerability class.\n\
4. Do not re-ask for details already present in the intelligence context.\n";

const DATABASE_EXHAUSTION_BLOCK: &str = "\n[SYSTEM ADVICE - DATABASE EXHAUSTION]\n\
The exploit/vulnerability databases returned no further matches. Stop searching them, \
apply general security principles to the discovered services, and pivot to active \
verification of candidate weaknesses instead of further lookups.\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_ports_dedupes_and_sorts() {
        let services = vec![
            DiscoveredService::new("h", 443, "tcp", "https"),
            DiscoveredService::new("h", 80, "tcp", "http"),
            DiscoveredService::new("h", 80, "tcp", "http"),
        ];
        assert_eq!(distinct_ports(&services), vec![80, 443]);
    }

    #[test]
    fn cap_playbook_text_appends_visible_marker_when_truncated() {
        let text = "x".repeat(100);
        let capped = cap_playbook_text(&text, 10);
        assert!(capped.contains("TRUNCATED"));
        assert!(capped.starts_with(&"x".repeat(10)));
    }

    #[test]
    fn cap_playbook_text_is_noop_under_cap() {
        let text = "short playbook";
        assert_eq!(cap_playbook_text(text, 1000), text);
    }

    #[test]
    fn tool_families_groups_by_prefix() {
        let tools = vec!["nmap_scan".to_string(), "nmap_version".to_string(), "searchsploit_search".to_string()];
        assert_eq!(tool_families(&tools), vec!["nmap".to_string(), "searchsploit".to_string()]);
    }

    #[test]
    fn all_results_exhausted_requires_every_result_to_match() {
        let results = vec![
            CleanedData {
                r#type: "scan".into(),
                data: CleanedPayload::Unknown { raw: String::new() },
                summary: "0 exploits found".into(),
            },
            CleanedData {
                r#type: "scan".into(),
                data: CleanedPayload::Unknown { raw: String::new() },
                summary: "found 1 service".into(),
            },
        ];
        assert!(!all_results_exhausted(&results));
    }

    #[test]
    fn all_results_exhausted_true_when_every_summary_matches() {
        let results = vec![CleanedData {
            r#type: "scan".into(),
            data: CleanedPayload::Unknown { raw: String::new() },
            summary: "No matches for this CVE class".into(),
        }];
        assert!(all_results_exhausted(&results));
    }

    #[test]
    fn session_new_generates_unique_prefixed_ids() {
        let a = Session::new();
        let b = Session::new();
        assert!(a.session_id.starts_with("session_"));
        assert_ne!(a.session_id, b.session_id);
    }
}
