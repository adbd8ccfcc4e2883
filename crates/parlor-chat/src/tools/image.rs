//! The `create_img` tool: model resolution, provider invocation and the
//! three-stage safety pipeline (validation, provider-error classification,
//! model-refusal detection).

use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;

use parlor_llm::{
    ImageError, ImageGenerationRequest, ImageGenerator, ImageModelCatalog, Tool,
};
use parlor_persist::ChatThread;

use crate::collaborators::ImageBlobStore;
use crate::error::ToolError;
use crate::safety::diagnostic::{content_filter_block, model_refusal_block};
use crate::safety::lexical::RiskClassifier;

pub const CREATE_IMG: &str = "create_img";

const MAX_PROMPT_CHARS: usize = 4000;

/// Tool definition sent to the model, with the parameter schema enumerating
/// the currently configured image models.
pub fn create_img_tool(catalog: &ImageModelCatalog) -> Tool {
    Tool::new(
        CREATE_IMG,
        format!(
            "You must only use this tool if the user asks you to create an image. You must only use this tool once per message. Images must be displayed inline. Available models: {}",
            catalog.describe()
        ),
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string" },
                "model": {
                    "type": "string",
                    "enum": catalog.ids(),
                    "description": "The image generation model to use. If not specified, uses the chat thread's default image model."
                },
            },
            "required": ["prompt"]
        }),
    )
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateImageArgs {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateImageOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
    pub url: String,
}

pub struct ImageToolExecutor {
    generator: Arc<dyn ImageGenerator>,
    store: Arc<dyn ImageBlobStore>,
    catalog: Arc<ImageModelCatalog>,
    classifier: Arc<dyn RiskClassifier>,
}

impl ImageToolExecutor {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        store: Arc<dyn ImageBlobStore>,
        catalog: Arc<ImageModelCatalog>,
        classifier: Arc<dyn RiskClassifier>,
    ) -> Self {
        Self {
            generator,
            store,
            catalog,
            classifier,
        }
    }

    /// Run one `create_img` invocation for a thread.
    ///
    /// The prompt sent to the provider is the verbatim user message, not
    /// any model-rewritten tool argument. Product rule: the model may try
    /// to expand the prompt in its tool call; that rewrite is ignored.
    pub async fn execute(
        &self,
        thread: &ChatThread,
        user_message: &str,
        args: &CreateImageArgs,
    ) -> Result<CreateImageOutput, ToolError> {
        let prompt = if !user_message.trim().is_empty() {
            user_message.trim().to_string()
        } else {
            args.prompt.as_deref().unwrap_or("").trim().to_string()
        };

        if prompt.is_empty() {
            return Err(ToolError::Validation("No prompt provided".to_string()));
        }

        if prompt.chars().count() >= MAX_PROMPT_CHARS {
            return Err(ToolError::Validation(
                "Prompt is too long, it must be less than 4000 characters".to_string(),
            ));
        }

        // Precedence: thread selection beats the tool-call argument, so
        // the user's UI choice always wins over the model's.
        let mut selected = thread
            .image_model_id
            .clone()
            .or_else(|| args.model.clone());

        if selected.is_none() {
            selected = self.catalog.first().map(|m| m.id.clone());
        }

        let selected = selected.ok_or_else(|| {
            ToolError::Validation("No image generation models are available".to_string())
        })?;

        let model = self.catalog.get(&selected).ok_or_else(|| {
            ToolError::Validation(format!(
                "Invalid image model: {}. Available models: {}",
                selected,
                self.catalog.ids().join(", ")
            ))
        })?;

        tracing::info!(model = %model.id, thread_id = %thread.id, "generating image");

        let mut request = ImageGenerationRequest::new(prompt.clone());
        request.response_format = Some("b64_json".to_string());

        let response = match self.generator.generate(model, &request).await {
            Ok(response) => response,
            Err(error) => return Err(self.classify_provider_error(&prompt, error)),
        };

        // A success-shaped response without image data is reclassified as
        // a safety block; this is the only path that does so.
        let image = response.data.first();
        let encoded = match image.and_then(|i| i.b64_json.as_deref()) {
            Some(encoded) => encoded,
            None => {
                let (message, payload) = model_refusal_block(&prompt);
                return Err(ToolError::Safety {
                    message,
                    payload: Box::new(payload),
                });
            }
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                ToolError::Storage(format!(
                    "There was an error storing the image: {e} Please try again or contact support if the issue persists."
                ))
            })?;

        let filename = format!("{}.png", uuid::Uuid::new_v4());
        self.store
            .upload(&thread.id, &filename, &bytes)
            .await
            .map_err(|e| {
                ToolError::Storage(format!(
                    "There was an error storing the image: {e} Please try again or contact support if the issue persists."
                ))
            })?;

        Ok(CreateImageOutput {
            revised_prompt: image.and_then(|i| i.revised_prompt.clone()),
            url: self.store.url_for(&thread.id, &filename),
        })
    }

    fn classify_provider_error(&self, prompt: &str, error: ImageError) -> ToolError {
        if error.is_content_filtered() {
            let (provider_message, request_id, filter_results) = match &error {
                ImageError::Api {
                    message,
                    request_id,
                    content_filter,
                    ..
                } => (
                    Some(message.as_str()),
                    request_id.as_deref(),
                    content_filter.as_ref(),
                ),
                ImageError::Http(_) => (None, None, None),
            };

            let hits = self.classifier.classify(prompt);
            let (message, payload) =
                content_filter_block(prompt, provider_message, request_id, filter_results, &hits);

            return ToolError::Safety {
                message,
                payload: Box::new(payload),
            };
        }

        ToolError::Provider(format!(
            "There was an error creating the image: {error} Return this message to the user and halt execution."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use base64::Engine as _;

    use parlor_llm::{
        ContentFilterResult, ContentFilterResults, GeneratedImage, ImageGenerationResponse,
        ImageModelConfig, ImageProvider,
    };
    use parlor_types::BlockSource;

    use crate::safety::lexical::LexicalClassifier;

    fn model_config(id: &str) -> ImageModelConfig {
        ImageModelConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: String::new(),
            provider: ImageProvider::DallE3,
            api_key: "key".to_string(),
            instance_name: "resource".to_string(),
            deployment_name: format!("{id}-deploy"),
            api_version: "2024-10-21".to_string(),
        }
    }

    fn thread_with_image_model(image_model_id: Option<&str>) -> ChatThread {
        let mut thread = ChatThread::new("user-1", "Test User", None);
        thread.image_model_id = image_model_id.map(str::to_string);
        thread
    }

    struct MockGenerator {
        called: AtomicBool,
        called_with_model: Mutex<Option<String>>,
        result: Mutex<Option<Result<ImageGenerationResponse, ImageError>>>,
    }

    impl MockGenerator {
        fn returning(result: Result<ImageGenerationResponse, ImageError>) -> Arc<Self> {
            Arc::new(Self {
                called: AtomicBool::new(false),
                called_with_model: Mutex::new(None),
                result: Mutex::new(Some(result)),
            })
        }

        fn success_with_b64() -> Arc<Self> {
            let encoded = base64::engine::general_purpose::STANDARD.encode(b"png-bytes");
            Self::returning(Ok(ImageGenerationResponse {
                data: vec![GeneratedImage {
                    url: None,
                    b64_json: Some(encoded),
                    revised_prompt: Some("a revised cat".to_string()),
                }],
                created: 0,
            }))
        }

        fn was_called(&self) -> bool {
            self.called.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageGenerator for MockGenerator {
        async fn generate(
            &self,
            model: &ImageModelConfig,
            _request: &ImageGenerationRequest,
        ) -> Result<ImageGenerationResponse, ImageError> {
            self.called.store(true, Ordering::SeqCst);
            *self.called_with_model.lock().unwrap() = Some(model.id.clone());
            self.result
                .lock()
                .unwrap()
                .take()
                .expect("generator called more than once")
        }
    }

    struct MockStore {
        fail: bool,
        uploads: Mutex<Vec<(String, String)>>,
    }

    impl MockStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                uploads: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                uploads: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ImageBlobStore for MockStore {
        async fn upload(
            &self,
            thread_id: &str,
            filename: &str,
            _bytes: &[u8],
        ) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            self.uploads
                .lock()
                .unwrap()
                .push((thread_id.to_string(), filename.to_string()));
            Ok(())
        }

        fn url_for(&self, thread_id: &str, filename: &str) -> String {
            format!("/threads/{thread_id}/images/{filename}")
        }
    }

    fn executor(
        generator: Arc<MockGenerator>,
        store: Arc<MockStore>,
        models: Vec<ImageModelConfig>,
    ) -> ImageToolExecutor {
        ImageToolExecutor::new(
            generator,
            store,
            Arc::new(ImageModelCatalog::new(models)),
            Arc::new(LexicalClassifier::new()),
        )
    }

    #[tokio::test]
    async fn long_prompt_fails_before_provider_call() {
        let generator = MockGenerator::success_with_b64();
        let exec = executor(
            generator.clone(),
            MockStore::new(),
            vec![model_config("dall-e-3")],
        );
        let thread = thread_with_image_model(None);

        let long_prompt = "x".repeat(4000);
        let result = exec
            .execute(&thread, &long_prompt, &CreateImageArgs::default())
            .await;

        assert!(matches!(result, Err(ToolError::Validation(_))));
        assert!(!generator.was_called());
    }

    #[tokio::test]
    async fn empty_prompt_fails_before_provider_call() {
        let generator = MockGenerator::success_with_b64();
        let exec = executor(
            generator.clone(),
            MockStore::new(),
            vec![model_config("dall-e-3")],
        );
        let thread = thread_with_image_model(None);

        let result = exec.execute(&thread, "   ", &CreateImageArgs::default()).await;

        assert!(matches!(result, Err(ToolError::Validation(_))));
        assert!(!generator.was_called());
    }

    #[tokio::test]
    async fn thread_model_beats_conflicting_tool_argument() {
        let generator = MockGenerator::success_with_b64();
        let exec = executor(
            generator.clone(),
            MockStore::new(),
            vec![model_config("dall-e-3"), model_config("gpt-image-1")],
        );
        let thread = thread_with_image_model(Some("dall-e-3"));

        let args = CreateImageArgs {
            prompt: None,
            model: Some("gpt-image-1".to_string()),
        };
        exec.execute(&thread, "a cat", &args).await.unwrap();

        assert_eq!(
            generator.called_with_model.lock().unwrap().as_deref(),
            Some("dall-e-3")
        );
    }

    #[tokio::test]
    async fn falls_back_to_first_configured_model() {
        let generator = MockGenerator::success_with_b64();
        let exec = executor(
            generator.clone(),
            MockStore::new(),
            vec![model_config("gpt-image-1"), model_config("dall-e-3")],
        );
        let thread = thread_with_image_model(None);

        exec.execute(&thread, "a cat", &CreateImageArgs::default())
            .await
            .unwrap();

        assert_eq!(
            generator.called_with_model.lock().unwrap().as_deref(),
            Some("gpt-image-1")
        );
    }

    #[tokio::test]
    async fn no_configured_models_is_a_validation_error() {
        let generator = MockGenerator::success_with_b64();
        let exec = executor(generator.clone(), MockStore::new(), vec![]);
        let thread = thread_with_image_model(None);

        let result = exec
            .execute(&thread, "a cat", &CreateImageArgs::default())
            .await;

        assert!(matches!(result, Err(ToolError::Validation(_))));
        assert!(!generator.was_called());
    }

    #[tokio::test]
    async fn unknown_model_id_names_the_invalid_id() {
        let generator = MockGenerator::success_with_b64();
        let exec = executor(
            generator.clone(),
            MockStore::new(),
            vec![model_config("dall-e-3")],
        );
        let thread = thread_with_image_model(Some("gone-model"));

        let result = exec
            .execute(&thread, "a cat", &CreateImageArgs::default())
            .await;

        match result {
            Err(ToolError::Validation(message)) => {
                assert!(message.contains("Invalid image model: gone-model"));
                assert!(message.contains("dall-e-3"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!generator.was_called());
    }

    #[tokio::test]
    async fn missing_b64_payload_is_a_model_refusal() {
        let generator = MockGenerator::returning(Ok(ImageGenerationResponse {
            data: vec![GeneratedImage {
                url: Some("https://example/img.png".to_string()),
                b64_json: None,
                revised_prompt: None,
            }],
            created: 0,
        }));
        let exec = executor(generator, MockStore::new(), vec![model_config("dall-e-3")]);
        let thread = thread_with_image_model(None);

        let result = exec
            .execute(&thread, "a grim scene", &CreateImageArgs::default())
            .await;

        match result {
            Err(ToolError::Safety { payload, .. }) => {
                assert_eq!(payload.source, BlockSource::ModelRefusal);
            }
            other => panic!("expected a safety block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_data_is_a_model_refusal() {
        let generator = MockGenerator::returning(Ok(ImageGenerationResponse {
            data: vec![],
            created: 0,
        }));
        let exec = executor(generator, MockStore::new(), vec![model_config("dall-e-3")]);
        let thread = thread_with_image_model(None);

        let result = exec
            .execute(&thread, "a grim scene", &CreateImageArgs::default())
            .await;

        assert!(matches!(result, Err(ToolError::Safety { .. })));
    }

    #[tokio::test]
    async fn content_filter_error_builds_rich_diagnostic() {
        let mut results = ContentFilterResults::new();
        results.insert(
            "violence".to_string(),
            ContentFilterResult {
                filtered: true,
                severity: Some("high".to_string()),
            },
        );

        let generator = MockGenerator::returning(Err(ImageError::Api {
            status: 400,
            code: Some("contentFilter".to_string()),
            message: "content blocked".to_string(),
            request_id: Some("req-9".to_string()),
            content_filter: Some(results),
        }));
        let exec = executor(generator, MockStore::new(), vec![model_config("dall-e-3")]);
        let thread = thread_with_image_model(None);

        let result = exec
            .execute(&thread, "a bloody battle", &CreateImageArgs::default())
            .await;

        match result {
            Err(ToolError::Safety { message, payload }) => {
                assert!(message.contains("Image blocked by Azure Content Safety"));
                assert_eq!(payload.source, BlockSource::ApiContentFilter);
                assert_eq!(payload.request_id.as_deref(), Some("req-9"));
                assert_eq!(payload.blocked_categories, vec!["violence:high".to_string()]);
                assert_eq!(payload.retry_allowed, Some(false));
                assert!(payload.token_summary.contains_key("violence"));
            }
            other => panic!("expected a safety block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_filter_provider_error_is_plain() {
        let generator = MockGenerator::returning(Err(ImageError::Api {
            status: 503,
            code: Some("serviceUnavailable".to_string()),
            message: "down for maintenance".to_string(),
            request_id: None,
            content_filter: None,
        }));
        let exec = executor(generator, MockStore::new(), vec![model_config("dall-e-3")]);
        let thread = thread_with_image_model(None);

        let result = exec
            .execute(&thread, "a cat", &CreateImageArgs::default())
            .await;

        match result {
            Err(ToolError::Provider(message)) => {
                assert!(message.contains("down for maintenance"));
                assert!(message.contains("halt execution"));
            }
            other => panic!("expected a provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn storage_failure_is_a_storage_error() {
        let generator = MockGenerator::success_with_b64();
        let exec = executor(generator, MockStore::failing(), vec![model_config("dall-e-3")]);
        let thread = thread_with_image_model(None);

        let result = exec
            .execute(&thread, "a cat", &CreateImageArgs::default())
            .await;

        match result {
            Err(ToolError::Storage(message)) => {
                assert!(message.contains("error storing the image"));
            }
            other => panic!("expected a storage error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_uploads_and_returns_url() {
        let generator = MockGenerator::success_with_b64();
        let store = MockStore::new();
        let exec = executor(generator, store.clone(), vec![model_config("dall-e-3")]);
        let thread = thread_with_image_model(None);

        let output = exec
            .execute(&thread, "a cat", &CreateImageArgs::default())
            .await
            .unwrap();

        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, thread.id);
        assert!(uploads[0].1.ends_with(".png"));
        assert!(output.url.contains(&uploads[0].1));
        assert_eq!(output.revised_prompt.as_deref(), Some("a revised cat"));
    }

    #[test]
    fn tool_definition_enumerates_configured_models() {
        let catalog = ImageModelCatalog::new(vec![
            model_config("dall-e-3"),
            model_config("gpt-image-1"),
        ]);
        let tool = create_img_tool(&catalog);

        assert_eq!(tool.name(), CREATE_IMG);
        let schema = &tool.function.parameters;
        assert_eq!(schema["required"][0], "prompt");
        assert_eq!(schema["properties"]["model"]["enum"][0], "dall-e-3");
        assert_eq!(schema["properties"]["model"]["enum"][1], "gpt-image-1");
    }
}
