use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use graphqa::{
    CypherError, ExecutionErrorKind, GenerationError, GraphStoreError, PipelineError, ResultSet,
    SchemaSnapshot, TextGenerator, TimeoutSource, ValidationErrorKind,
    backend::{GraphStore, SqliteGraphStore},
    graph::NodeSpec,
    pipeline::{Pipeline, PipelineOptions, PipelineStage},
    service::{QaService, QuestionRequest},
    validator::WritePolicy,
};
use parking_lot::Mutex;
use serde_json::json;

/// Replays completions in order.
struct Scripted {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

impl TextGenerator for Scripted {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().push(prompt.to_string());
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| GenerationError::request("script exhausted"))
    }
}

/// Answers by prompt kind so it can serve concurrent invocations.
struct ByRole {
    query: &'static str,
    answer: &'static str,
}

impl TextGenerator for ByRole {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if prompt.contains("Helpful Answer:") {
            Ok(self.answer.to_string())
        } else {
            Ok(self.query.to_string())
        }
    }
}

enum RunBehaviour {
    Rows(ResultSet),
    Timeout,
}

struct MockStore {
    schema: Result<SchemaSnapshot, GraphStoreError>,
    behaviour: RunBehaviour,
    fetches: AtomicUsize,
    runs: AtomicUsize,
}

impl MockStore {
    fn new(behaviour: RunBehaviour) -> Self {
        Self {
            schema: Ok(SchemaSnapshot::new()
                .with_label("Contract", ["name", "text"])
                .with_relationship("HAS_CLAUSE", Vec::<String>::new())),
            behaviour,
            fetches: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }

    fn failing_schema(err: GraphStoreError) -> Self {
        let mut store = Self::new(RunBehaviour::Rows(ResultSet::default()));
        store.schema = Err(err);
        store
    }
}

impl GraphStore for MockStore {
    fn fetch_schema(&self, _timeout: Duration) -> Result<SchemaSnapshot, GraphStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.schema {
            Ok(schema) => Ok(schema.clone()),
            Err(GraphStoreError::Timeout(d)) => Err(GraphStoreError::Timeout(*d)),
            Err(other) => Err(GraphStoreError::connection(other.to_string())),
        }
    }

    fn run(&self, _query: &str, timeout: Duration) -> Result<ResultSet, CypherError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            RunBehaviour::Rows(rows) => Ok(rows.clone()),
            RunBehaviour::Timeout => Err(CypherError::Store(GraphStoreError::Timeout(timeout))),
        }
    }
}

fn contract_store() -> SqliteGraphStore {
    let store = SqliteGraphStore::in_memory().expect("store");
    store.with_graph(|graph| {
        graph
            .insert_node(
                &NodeSpec::new(["Contract"])
                    .property("name", json!("Contract"))
                    .property("text", json!("A legally binding agreement between parties.")),
            )
            .expect("node");
        graph
            .insert_node(&NodeSpec::new(["Contract"]).property("name", json!("Lease")))
            .expect("node");
    });
    store
}

#[test]
fn test_scenario_a_answers_from_graph() {
    let generator = Scripted::new(&[
        "```cypher\nMATCH (n) WHERE n.name = \"Contract\" RETURN n\n```",
        "A contract is a legally binding agreement between parties.",
    ]);
    let pipeline = Pipeline::new(contract_store(), &generator, PipelineOptions::default());
    let outcome = pipeline
        .answer("What is the definition of contract?")
        .expect("answer");
    assert_eq!(outcome.query, "MATCH (n) WHERE n.name = \"Contract\" RETURN n");
    assert_eq!(outcome.rows, 1);
    assert!(!outcome.answer.is_empty());
    assert!(!outcome.mutating);
    let stages: Vec<PipelineStage> = outcome.trace.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::SchemaFetch,
            PipelineStage::Synthesize,
            PipelineStage::Validate,
            PipelineStage::Execute,
            PipelineStage::AnswerSynthesize,
        ]
    );
    let prompts = generator.prompts.lock();
    assert!(prompts[0].contains("Contract {name, text}"));
    assert!(prompts[1].contains("legally binding agreement"));
    assert!(prompts[1].contains("What is the definition of contract?"));
}

#[test]
fn test_scenario_b_empty_question_fails_fast() {
    let store = MockStore::new(RunBehaviour::Rows(ResultSet::default()));
    let generator = Scripted::new(&["MATCH (n) RETURN n", "answer"]);
    let pipeline = Pipeline::new(&store, &generator, PipelineOptions::default());
    let err = pipeline.answer("").unwrap_err();
    assert!(matches!(err, PipelineError::SynthesisFailed(_)));
    assert_eq!(generator.calls(), 0);
    assert_eq!(store.runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_fenced_prose_never_reaches_the_store() {
    let store = MockStore::new(RunBehaviour::Rows(ResultSet::default()));
    let generator = Scripted::new(&["```\nI cannot answer that.\n```", "unused"]);
    let pipeline = Pipeline::new(&store, &generator, PipelineOptions::default());
    let err = pipeline.answer("Who signed the lease?").unwrap_err();
    assert!(matches!(err, PipelineError::SynthesisFailed(_)), "{err:?}");
    assert_eq!(store.runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_scenario_c_unknown_relationship_stops_before_execution() {
    let store = MockStore::new(RunBehaviour::Rows(ResultSet::default()));
    let generator = Scripted::new(&["MATCH (c:Contract)-[:FOO]->(d) RETURN d", "unused"]);
    let pipeline = Pipeline::new(&store, &generator, PipelineOptions::default());
    match pipeline.answer("Which contracts foo?").unwrap_err() {
        PipelineError::Validation(err) => {
            assert_eq!(err.kind, ValidationErrorKind::UnknownRelationship);
            assert_eq!(err.identifier, "FOO");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(store.runs.load(Ordering::SeqCst), 0);
    assert_eq!(generator.calls(), 1);
}

#[test]
fn test_scenario_d_execution_timeout_is_timeout() {
    let store = MockStore::new(RunBehaviour::Timeout);
    let generator = Scripted::new(&["MATCH (c:Contract) RETURN c.name", "unused"]);
    let pipeline = Pipeline::new(&store, &generator, PipelineOptions::default());
    let err = pipeline.answer("List contracts").unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Timeout {
            source_call: TimeoutSource::Execution,
            ..
        }
    ));
    assert_eq!(err.kind_name(), "Timeout");
    assert_eq!(generator.calls(), 1);
}

#[test]
fn test_scenario_d_against_sqlite_store() {
    let generator = Scripted::new(&["MATCH (c:Contract) RETURN c.name", "unused"]);
    let options = PipelineOptions {
        query_timeout: Duration::ZERO,
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(contract_store(), &generator, options);
    let err = pipeline.answer("List contracts").unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Timeout {
            source_call: TimeoutSource::Execution,
            ..
        }
    ));
}

#[test]
fn test_unreachable_store_is_backend_unavailable() {
    let store = MockStore::failing_schema(GraphStoreError::connection("refused"));
    let generator = Scripted::new(&[]);
    let pipeline = Pipeline::new(&store, &generator, PipelineOptions::default());
    let err = pipeline.answer("anything").unwrap_err();
    assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    assert_eq!(generator.calls(), 0);
}

#[test]
fn test_schema_fetch_timeout_is_timeout() {
    let store = MockStore::failing_schema(GraphStoreError::Timeout(Duration::from_millis(5)));
    let generator = Scripted::new(&[]);
    let pipeline = Pipeline::new(&store, &generator, PipelineOptions::default());
    let err = pipeline.answer("anything").unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Timeout {
            source_call: TimeoutSource::SchemaFetch,
            ..
        }
    ));
}

#[test]
fn test_execution_errors_are_classified() {
    let generator = Scripted::new(&["MATCH (c:Contract) RETURN c.name / 2", "unused"]);
    let pipeline = Pipeline::new(contract_store(), &generator, PipelineOptions::default());
    match pipeline.answer("Halve the names").unwrap_err() {
        PipelineError::Execution(err) => assert_eq!(err.kind, ExecutionErrorKind::Type),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_schema_cached_between_invocations() {
    let store = MockStore::new(RunBehaviour::Rows(ResultSet::default()));
    let generator = ByRole {
        query: "MATCH (c:Contract) RETURN c.name",
        answer: "None found.",
    };
    let pipeline = Pipeline::new(&store, &generator, PipelineOptions::default());
    pipeline.answer("first").expect("first");
    pipeline.answer("second").expect("second");
    assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(store.runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_zero_ttl_fetches_every_time() {
    let store = MockStore::new(RunBehaviour::Rows(ResultSet::default()));
    let generator = ByRole {
        query: "MATCH (c:Contract) RETURN c.name",
        answer: "None found.",
    };
    let options = PipelineOptions {
        schema_ttl: Duration::ZERO,
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(&store, &generator, options);
    pipeline.answer("first").expect("first");
    pipeline.answer("second").expect("second");
    assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
}

#[test]
fn test_write_policy_reject_blocks_generated_writes() {
    let store = MockStore::new(RunBehaviour::Rows(ResultSet::default()));
    let generator = Scripted::new(&["MATCH (c:Contract) DETACH DELETE c", "unused"]);
    let options = PipelineOptions {
        write_policy: WritePolicy::Reject,
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(&store, &generator, options);
    match pipeline.answer("Remove every contract").unwrap_err() {
        PipelineError::Validation(err) => assert_eq!(err.kind, ValidationErrorKind::MutatingQuery),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(store.runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_mutating_query_runs_under_warn_and_refreshes_schema() {
    let generator = Scripted::new(&[
        "MATCH (c:Contract {name: 'Lease'}) SET c.text = 'Rental agreement' RETURN c.text",
        "Updated.",
    ]);
    let pipeline = Pipeline::new(contract_store(), &generator, PipelineOptions::default());
    let outcome = pipeline.answer("Describe the lease").expect("answer");
    assert!(outcome.mutating);
    assert_eq!(outcome.rows, 1);
    let schema = pipeline.schema().expect("schema");
    assert!(schema.label_has_property("Contract", "text"));
}

#[test]
fn test_concurrent_invocations_share_pipeline() {
    let generator = ByRole {
        query: "MATCH (c:Contract) RETURN c.name AS name ORDER BY name",
        answer: "Contract and Lease.",
    };
    let pipeline = Pipeline::new(contract_store(), generator, PipelineOptions::default());
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pipeline = &pipeline;
                scope.spawn(move || pipeline.answer(&format!("question {i}")))
            })
            .collect();
        for handle in handles {
            let outcome = handle.join().expect("thread").expect("answer");
            assert_eq!(outcome.rows, 2);
        }
    });
}

#[test]
fn test_service_maps_errors_to_status_500() {
    let store = MockStore::new(RunBehaviour::Rows(ResultSet::default()));
    let generator = Scripted::new(&[]);
    let service = QaService::new(Pipeline::new(&store, &generator, PipelineOptions::default()));
    let err = service
        .answer_question(&QuestionRequest {
            question: " ".into(),
        })
        .unwrap_err();
    assert_eq!(err.status, 500);
    assert_eq!(err.kind, "SynthesisFailed");
}

#[test]
fn test_service_returns_question_and_answer() {
    let generator = ByRole {
        query: "MATCH (c:Contract) RETURN count(c) AS total",
        answer: "There are two contracts.",
    };
    let service = QaService::new(Pipeline::new(
        contract_store(),
        generator,
        PipelineOptions::default(),
    ));
    let response = service
        .answer_question(&QuestionRequest {
            question: "How many contracts are there?".into(),
        })
        .expect("answer");
    assert_eq!(response.question, "How many contracts are there?");
    assert_eq!(response.answer, "There are two contracts.");
}
