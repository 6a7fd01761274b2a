use crate::config::{AdvisorConfig, WatsonConfig};
use crate::error::PredictionError;
use crate::preprocess::ImageTensor;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::instrument;

const TOKEN_SERVICE: &str = "token service";
const PREDICTION_SERVICE: &str = "prediction service";
const TEXT_GENERATION_SERVICE: &str = "text generation service";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Serialize)]
struct ScoringRequest<'a> {
    input_data: [ScoringInput<'a>; 1],
}

#[derive(Serialize)]
struct ScoringInput<'a> {
    values: &'a ImageTensor,
}

#[derive(Deserialize)]
struct ScoringResponse {
    #[serde(default)]
    predictions: Vec<ScoringValues>,
}

#[derive(Deserialize)]
struct ScoringValues {
    #[serde(default)]
    values: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct TextGenerationRequest<'a> {
    model_id: &'a str,
    input: &'a str,
    project_id: &'a str,
    parameters: TextGenerationParameters,
}

#[derive(Serialize)]
struct TextGenerationParameters {
    decoding_method: &'static str,
    max_new_tokens: u32,
}

#[derive(Deserialize)]
struct TextGenerationResponse {
    #[serde(default)]
    results: Vec<GeneratedText>,
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}

/// Client for the hosted model. Every call authenticates from scratch.
pub struct PredictionService {
    http: reqwest::Client,
    watson: WatsonConfig,
}

impl PredictionService {
    pub fn new(watson: &WatsonConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(watson.request_timeout())
            .build()?;

        Ok(Self {
            http,
            watson: watson.clone(),
        })
    }

    fn transport_error(
        &self,
        err: reqwest::Error,
        service: &'static str,
        wrap: fn(String) -> PredictionError,
    ) -> PredictionError {
        if err.is_timeout() {
            PredictionError::UpstreamTimeout {
                service,
                timeout_ms: self.watson.request_timeout_ms,
            }
        } else if err.is_decode() {
            wrap(format!("malformed response from {}: {}", service, err))
        } else {
            wrap(format!("{} request failed: {}", service, err))
        }
    }

    async fn read_failure(response: reqwest::Response, service: &str) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("{} returned {}: {}", service, status, body.trim())
    }

    #[instrument(skip(self))]
    pub async fn fetch_token(&self) -> Result<String, PredictionError> {
        let response = self
            .http
            .post(&self.watson.iam_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("apikey", self.watson.api_key.as_str()),
                ("grant_type", self.watson.grant_type.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.transport_error(e, TOKEN_SERVICE, PredictionError::Auth))?;

        if !response.status().is_success() {
            let reason = Self::read_failure(response, TOKEN_SERVICE).await;
            return Err(PredictionError::Auth(reason));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e, TOKEN_SERVICE, PredictionError::Auth))?;

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PredictionError::Auth("token response has no access_token".into()))
    }

    #[instrument(skip(self, token, tensor))]
    async fn request_scores(
        &self,
        token: &str,
        tensor: &ImageTensor,
    ) -> Result<Vec<f64>, PredictionError> {
        let body = ScoringRequest {
            input_data: [ScoringInput { values: tensor }],
        };

        let response = self
            .http
            .post(self.watson.prediction_url())
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e, PREDICTION_SERVICE, PredictionError::Inference))?;

        if !response.status().is_success() {
            let reason = Self::read_failure(response, PREDICTION_SERVICE).await;
            return Err(PredictionError::Inference(reason));
        }

        let scoring: ScoringResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e, PREDICTION_SERVICE, PredictionError::Inference))?;

        let scores = scoring
            .predictions
            .into_iter()
            .next()
            .and_then(|p| p.values.into_iter().next())
            .ok_or_else(|| {
                PredictionError::Inference("response contains no prediction values".into())
            })?;

        tracing::debug!("Received {} class scores", scores.len());
        Ok(scores)
    }

    /// Authenticates, then scores the tensor on the configured deployment.
    pub async fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f64>, PredictionError> {
        let token = self.fetch_token().await?;
        self.request_scores(&token, tensor).await
    }

    #[instrument(skip(self, advisor, prompt), fields(model = %advisor.model_id))]
    pub async fn generate_text(
        &self,
        advisor: &AdvisorConfig,
        prompt: &str,
    ) -> Result<String, PredictionError> {
        let token = self.fetch_token().await?;

        let body = TextGenerationRequest {
            model_id: &advisor.model_id,
            input: prompt,
            project_id: &advisor.project_id,
            parameters: TextGenerationParameters {
                decoding_method: "greedy",
                max_new_tokens: advisor.max_new_tokens,
            },
        };

        let response = self
            .http
            .post(advisor.text_generation_url(&self.watson.ml_base_url))
            .bearer_auth(&token)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.transport_error(e, TEXT_GENERATION_SERVICE, PredictionError::Inference)
            })?;

        if !response.status().is_success() {
            let reason = Self::read_failure(response, TEXT_GENERATION_SERVICE).await;
            return Err(PredictionError::Inference(reason));
        }

        let generated: TextGenerationResponse = response.json().await.map_err(|e| {
            self.transport_error(e, TEXT_GENERATION_SERVICE, PredictionError::Inference)
        })?;

        generated
            .results
            .into_iter()
            .next()
            .map(|r| r.generated_text.trim().to_string())
            .ok_or_else(|| PredictionError::Inference("response contains no generated text".into()))
    }
}
