use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    backend::GraphStore,
    errors::PipelineError,
    llm::TextGenerator,
    pipeline::{Pipeline, PipelineOutcome},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub question: String,
    pub answer: String,
}

/// Error body for a failed invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub kind: String,
    pub detail: String,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            status: err.status_code(),
            kind: err.kind_name().to_string(),
            detail: err.to_string(),
        }
    }
}

impl From<&PipelineOutcome> for AnswerResponse {
    fn from(outcome: &PipelineOutcome) -> Self {
        Self {
            question: outcome.question.clone(),
            answer: outcome.answer.clone(),
        }
    }
}

/// The single inbound operation, independent of any transport.
pub struct QaService<S, G> {
    pipeline: Pipeline<S, G>,
}

impl<S: GraphStore, G: TextGenerator> QaService<S, G> {
    pub fn new(pipeline: Pipeline<S, G>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline<S, G> {
        &self.pipeline
    }

    pub fn answer_question(&self, request: &QuestionRequest) -> Result<AnswerResponse, ErrorResponse> {
        match self.pipeline.answer(&request.question) {
            Ok(outcome) => Ok(AnswerResponse::from(&outcome)),
            Err(err) => {
                error!(kind = err.kind_name(), error = %err, "question failed");
                Err(ErrorResponse::from(&err))
            }
        }
    }
}
