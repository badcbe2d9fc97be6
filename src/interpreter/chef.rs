//! Recipe suggestions from whatever is in the fridge

use std::sync::Arc;

use tracing::warn;

use super::TextGenerator;

const NO_IDEAS: &str = "Sem ideias no momento.";
const CHEF_UNAVAILABLE: &str = "Erro ao consultar o Chef.";

/// Asks the generative service for a quick recipe idea
#[derive(Clone)]
pub struct ChefAdvisor {
    generator: Arc<dyn TextGenerator>,
}

impl ChefAdvisor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn prompt(ingredients: &str) -> String {
        format!(
            "Você é um chef experiente e objetivo. Sugira uma receita ou ideia rápida \
             com estes ingredientes ou neste pedido: \"{}\". \
             Responda em português, de forma direta e curta.",
            ingredients.trim()
        )
    }

    /// Always returns something displayable
    pub async fn ask(&self, ingredients: &str) -> String {
        match self.generator.generate(&Self::prompt(ingredients)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => NO_IDEAS.to_string(),
            Err(e) => {
                warn!(error = %e, "chef request failed");
                CHEF_UNAVAILABLE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::InterpretError;
    use async_trait::async_trait;

    struct Fixed(Result<&'static str, InterpretError>);

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn generate(&self, prompt: &str) -> Result<String, InterpretError> {
            assert!(prompt.contains("\"ovos e tomate\""));
            self.0.clone().map(str::to_string)
        }
    }

    fn chef(reply: Result<&'static str, InterpretError>) -> ChefAdvisor {
        ChefAdvisor::new(Arc::new(Fixed(reply)))
    }

    #[tokio::test]
    async fn test_suggestion() {
        let answer = chef(Ok(" Omelete com tomate. ")).ask(" ovos e tomate ").await;
        assert_eq!(answer, "Omelete com tomate.");
    }

    #[tokio::test]
    async fn test_empty_suggestion() {
        assert_eq!(chef(Ok("")).ask("ovos e tomate").await, NO_IDEAS);
    }

    #[tokio::test]
    async fn test_failure() {
        let answer = chef(Err(InterpretError::EmptyResponse)).ask("ovos e tomate").await;
        assert_eq!(answer, CHEF_UNAVAILABLE);
    }
}
