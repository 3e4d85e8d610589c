use futures::future::BoxFuture;
use reqwest::Client;
use tracing::debug;

use cardforge_core::config::LlmConfig;
use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::traits::TextGenerator;
use cardforge_core::types::GenerateRequest;

use super::openai::{http_client, send_and_collect, ChatRequest};

/// Azure OpenAI client. Uses the same wire format as OpenAI but different
/// endpoint structure and `api-key` header instead of Bearer token.
pub struct AzureGenerator {
    http: Client,
    endpoint: String,
    deployment: Option<String>,
    api_version: String,
    api_key: String,
}

impl AzureGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = match (&config.base_url, &config.azure_resource) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(resource)) => format!("https://{}.openai.azure.com", resource),
            (None, None) => {
                return Err(CardforgeError::Config(
                    "Azure: either base_url or azure_resource is required".into(),
                ))
            }
        };
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| CardforgeError::Config("Azure: api_key is required".into()))?;

        Ok(Self {
            http: http_client(config.timeout_secs)?,
            endpoint,
            deployment: config.azure_deployment.clone(),
            api_version: config.azure_api_version.clone(),
            api_key,
        })
    }

    /// Chat completions URL. Without a configured deployment, the
    /// request's model name is used as the deployment name.
    fn url(&self, model: &str) -> String {
        let deployment = self.deployment.as_deref().unwrap_or(model);
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, deployment, self.api_version
        )
    }
}

impl TextGenerator for AzureGenerator {
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = self.url(&request.model);
            debug!(model = %request.model, url = %url, "Sending Azure chat completion");

            // Reuse OpenAI wire format; the deployment pins the model.
            let body = ChatRequest::streaming(&request, false);

            let req = self
                .http
                .post(&url)
                .header("api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(&body);

            send_and_collect(req, "llm").await
        })
    }
}
