use super::Pipeline;
use crate::aggregate::Framing;
use crate::error::Result;
use crate::generate::{GenerationRequest, TextGenerator};
use crate::output::safe_file_stem;
use crate::types::{Payload, WorkItem};
use async_trait::async_trait;
use std::sync::Arc;

/// Output category of generated scripts
pub const SCRIPTS_CATEGORY: &str = "scripts";

/// File name of the combined podcast script for a run date
pub fn script_file_name(run_date: &str) -> String {
    format!("podcast_script_{run_date}.txt")
}

/// Generates one podcast segment per paper and joins them into an episode script
#[derive(Clone)]
pub struct ScriptPipeline {
    generator: Arc<dyn TextGenerator>,
    system_instruction: String,
    prompt_template: String,
    podcast_title: String,
}

impl ScriptPipeline {
    /// Create the pipeline
    ///
    /// `prompt_template` must contain `{id}`, which is replaced with each
    /// paper's identifier.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        system_instruction: impl Into<String>,
        prompt_template: impl Into<String>,
        podcast_title: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            system_instruction: system_instruction.into(),
            prompt_template: prompt_template.into(),
            podcast_title: podcast_title.into(),
        }
    }

    /// Prompt sent for one item
    pub fn prompt_for(&self, item: &WorkItem) -> String {
        self.prompt_template.replace("{id}", item.id.as_str())
    }
}

impl std::fmt::Debug for ScriptPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptPipeline")
            .field("model", &self.generator.model())
            .field("podcast_title", &self.podcast_title)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Pipeline for ScriptPipeline {
    fn name(&self) -> &str {
        "script"
    }

    fn category(&self) -> &str {
        SCRIPTS_CATEGORY
    }

    fn item_file_name(&self, item: &WorkItem) -> String {
        format!("{}_content.txt", safe_file_stem(item.id.as_str()))
    }

    fn combined_file_name(&self, run_date: &str) -> String {
        script_file_name(run_date)
    }

    fn framing(&self) -> Framing {
        Framing::podcast(&self.podcast_title)
    }

    fn combined_fragment(&self, _item: &WorkItem, payload: &Payload) -> String {
        let text = String::from_utf8_lossy(payload.as_bytes());
        format!("{}\n\n", text.trim())
    }

    async fn process(&self, item: &WorkItem) -> Result<Payload> {
        let request =
            GenerationRequest::new(self.prompt_for(item)).with_system(&self.system_instruction);
        let text = self.generator.generate(request).await?;
        Ok(Payload::Text(text))
    }

    fn throttled(&self) -> bool {
        true
    }
}
