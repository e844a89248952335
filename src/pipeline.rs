//! Orchestrator for one question: schema fetch, query synthesis, validation,
//! execution and answer synthesis, strictly in that order.
//!
//! Each stage returns a typed `Result`; the first failure is terminal. There
//! is no regeneration after a validation failure and no retry after an
//! execution failure.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::{
    backend::GraphStore,
    errors::{PipelineError, TemplateError},
    executor::{DEFAULT_QUERY_TIMEOUT, QueryExecutor},
    llm::TextGenerator,
    prompt::PromptTemplate,
    result_set::ResultSet,
    schema::SchemaSnapshot,
    schema_provider::SchemaProvider,
    synthesizer::{AnswerSynthesizer, DEFAULT_MAX_CONTEXT_ROWS, GeneratedQuery, QuerySynthesizer},
    validator::{QueryValidator, ValidationReport, WritePolicy},
};

pub const DEFAULT_SCHEMA_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_SCHEMA_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    SchemaFetch,
    Synthesize,
    Validate,
    Execute,
    AnswerSynthesize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOptions {
    pub query_timeout: Duration,
    pub schema_ttl: Duration,
    pub schema_timeout: Duration,
    pub max_context_rows: usize,
    pub write_policy: WritePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            schema_ttl: DEFAULT_SCHEMA_TTL,
            schema_timeout: DEFAULT_SCHEMA_TIMEOUT,
            max_context_rows: DEFAULT_MAX_CONTEXT_ROWS,
            write_policy: WritePolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    pub stage: PipelineStage,
    pub elapsed: Duration,
}

/// Everything a successful invocation produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub question: String,
    pub query: String,
    pub answer: String,
    pub rows: usize,
    pub mutating: bool,
    pub trace: Vec<StageTiming>,
}

/// Result of [`run_checked_query`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckedQuery {
    pub report: ValidationReport,
    pub results: ResultSet,
}

enum Step {
    SchemaFetch,
    Synthesize(Arc<SchemaSnapshot>),
    Validate(Arc<SchemaSnapshot>, GeneratedQuery),
    Execute(GeneratedQuery, ValidationReport),
    AnswerSynthesize(GeneratedQuery, ValidationReport, ResultSet),
}

enum Transition {
    Next(Step),
    Done(PipelineOutcome),
}

impl Step {
    fn stage(&self) -> PipelineStage {
        match self {
            Step::SchemaFetch => PipelineStage::SchemaFetch,
            Step::Synthesize(_) => PipelineStage::Synthesize,
            Step::Validate(..) => PipelineStage::Validate,
            Step::Execute(..) => PipelineStage::Execute,
            Step::AnswerSynthesize(..) => PipelineStage::AnswerSynthesize,
        }
    }
}

/// Store and generator are injected at construction and shared by every
/// invocation; `answer` may be called concurrently.
pub struct Pipeline<S, G> {
    generator: Arc<G>,
    provider: SchemaProvider<Arc<S>>,
    synthesizer: QuerySynthesizer<Arc<G>>,
    validator: QueryValidator,
    executor: QueryExecutor<Arc<S>>,
    answerer: AnswerSynthesizer<Arc<G>>,
    max_context_rows: usize,
}

impl<S: GraphStore, G: TextGenerator> Pipeline<S, G> {
    pub fn new(store: S, generator: G, options: PipelineOptions) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(generator), options)
    }

    pub fn from_shared(store: Arc<S>, generator: Arc<G>, options: PipelineOptions) -> Self {
        Self {
            provider: SchemaProvider::new(
                Arc::clone(&store),
                options.schema_ttl,
                options.schema_timeout,
            ),
            synthesizer: QuerySynthesizer::new(Arc::clone(&generator)),
            validator: QueryValidator::new(options.write_policy),
            executor: QueryExecutor::new(store, options.query_timeout),
            answerer: AnswerSynthesizer::new(Arc::clone(&generator), options.max_context_rows),
            max_context_rows: options.max_context_rows,
            generator,
        }
    }

    pub fn with_query_template(mut self, template: PromptTemplate) -> Result<Self, TemplateError> {
        self.synthesizer = QuerySynthesizer::with_template(Arc::clone(&self.generator), template)?;
        Ok(self)
    }

    pub fn with_answer_template(mut self, template: PromptTemplate) -> Result<Self, TemplateError> {
        self.answerer = AnswerSynthesizer::with_template(
            Arc::clone(&self.generator),
            template,
            self.max_context_rows,
        )?;
        Ok(self)
    }

    pub fn schema(&self) -> Result<Arc<SchemaSnapshot>, PipelineError> {
        self.provider.get_schema()
    }

    pub fn provider(&self) -> &SchemaProvider<Arc<S>> {
        &self.provider
    }

    pub fn answer(&self, question: &str) -> Result<PipelineOutcome, PipelineError> {
        let span = info_span!("pipeline", question_chars = question.chars().count());
        let _entered = span.enter();
        let started = Instant::now();
        let question = question.trim();
        if question.is_empty() {
            warn!("empty question rejected");
            return Err(PipelineError::synthesis("question is empty"));
        }

        let mut trace = Vec::new();
        let mut step = Step::SchemaFetch;
        let outcome = loop {
            let stage = step.stage();
            let stage_started = Instant::now();
            let transition = self.advance(question, step);
            let elapsed = stage_started.elapsed();
            trace.push(StageTiming { stage, elapsed });
            match transition {
                Ok(Transition::Next(next)) => {
                    debug!(?stage, elapsed_ms = elapsed.as_millis() as u64, "stage complete");
                    step = next;
                }
                Ok(Transition::Done(mut outcome)) => {
                    debug!(?stage, elapsed_ms = elapsed.as_millis() as u64, "stage complete");
                    outcome.trace = trace;
                    break outcome;
                }
                Err(err) => {
                    warn!(?stage, kind = err.kind_name(), error = %err, "pipeline failed");
                    return Err(err);
                }
            }
        };
        info!(
            rows = outcome.rows,
            mutating = outcome.mutating,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "question answered"
        );
        Ok(outcome)
    }

    fn advance(&self, question: &str, step: Step) -> Result<Transition, PipelineError> {
        let next = match step {
            Step::SchemaFetch => Step::Synthesize(self.provider.get_schema()?),
            Step::Synthesize(schema) => {
                let query = self.synthesizer.synthesize(question, &schema)?;
                debug!(query = %query, "query synthesized");
                Step::Validate(schema, query)
            }
            Step::Validate(schema, query) => {
                let report = self.validator.validate(&query, &schema)?;
                Step::Execute(query, report)
            }
            Step::Execute(query, report) => {
                let results = self.executor.execute(&query)?;
                if report.mutating || !results.stats.is_empty() {
                    self.provider.invalidate();
                }
                Step::AnswerSynthesize(query, report, results)
            }
            Step::AnswerSynthesize(query, report, results) => {
                let answer = self.answerer.synthesize_answer(question, &results)?;
                return Ok(Transition::Done(PipelineOutcome {
                    question: question.to_string(),
                    query: query.into_inner(),
                    answer,
                    rows: results.len(),
                    mutating: report.mutating,
                    trace: Vec::new(),
                }));
            }
        };
        Ok(Transition::Next(next))
    }
}

/// Runs a caller-supplied query through schema fetch, validation and
/// execution, skipping both synthesis stages.
pub fn run_checked_query<S: GraphStore>(
    provider: &SchemaProvider<S>,
    validator: &QueryValidator,
    executor: &QueryExecutor<S>,
    query: &GeneratedQuery,
) -> Result<CheckedQuery, PipelineError> {
    let schema = provider.get_schema()?;
    let report = validator.validate(query, &schema)?;
    let results = executor.execute(query)?;
    if report.mutating || !results.stats.is_empty() {
        provider.invalidate();
    }
    Ok(CheckedQuery { report, results })
}
