use crate::{
    error::{ErrorBody, PredictionError},
    server::SharedState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

const ROUTE: &str = "/api/questions";

#[derive(Deserialize)]
pub struct QuestionRequest {
    #[serde(default)]
    disease_name: Option<String>,
    #[serde(default)]
    questions: Option<String>,
}

#[derive(Serialize)]
pub struct QuestionResponse {
    response: String,
}

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Missing required data: disease_name or questions")]
    MissingInput,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("advisor is not configured")]
    NotConfigured,
    #[error("text generation failed: {0}")]
    Upstream(#[from] PredictionError),
}

impl IntoResponse for AdvisorError {
    fn into_response(self) -> Response {
        match self {
            AdvisorError::MissingInput => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(self.to_string()))).into_response()
            }
            _ => {
                tracing::error!("Error generating response: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new("Failed to generate response")),
                )
                    .into_response()
            }
        }
    }
}

fn required(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn build_prompt(disease_name: &str, question: &str) -> String {
    format!(
        "You are a friendly and knowledgeable plant doctor, here to help a mango farmer care for their trees.

The mango leaf has been diagnosed with: **'{disease_name}'**

Start by helping the farmer understand the issue:
1. What is this disease? Explain it clearly and simply.
2. What are the typical symptoms to look out for?
3. What treatments can help? Focus on organic or easily available solutions when possible.
4. What are one or two useful tips to prevent this disease in the future?

Now, the farmer has a specific question: **'{question}'**

If the question is related to the disease, answer it in detail using the information above. \
If it is about something else, give the most useful answer you can from your plant health expertise.

Keep your tone warm, supportive, and easy to understand. Use bullet points or short paragraphs."
    )
}

#[instrument(skip(state, payload))]
pub async fn ask(
    State(state): State<SharedState>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<QuestionResponse>, AdvisorError> {
    state.metrics.record_request(ROUTE);

    let Json(request) = payload.map_err(|rejection| AdvisorError::InvalidBody(rejection.body_text()))?;
    let (disease_name, question) = match (required(request.disease_name), required(request.questions)) {
        (Some(disease_name), Some(question)) => (disease_name, question),
        _ => return Err(AdvisorError::MissingInput),
    };

    let advisor = state.advisor.as_ref().ok_or(AdvisorError::NotConfigured)?;
    let prompt = build_prompt(&disease_name, &question);

    let response = state
        .prediction_service
        .generate_text(advisor, &prompt)
        .await?;

    tracing::info!(disease = %disease_name, "Generated advisor response");
    Ok(Json(QuestionResponse { response }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_mentions_disease_and_question() {
        let prompt = build_prompt("Die Back", "How often should I prune?");
        assert!(prompt.contains("**'Die Back'**"));
        assert!(prompt.contains("**'How often should I prune?'**"));
    }

    #[test]
    fn test_required_rejects_blank_values() {
        assert_eq!(required(None), None);
        assert_eq!(required(Some("   ".into())), None);
        assert_eq!(required(Some(" Healthy ".into())), Some("Healthy".to_string()));
    }
}
