//! Engine configuration.

use novel_assistant::RetryPolicy;

/// Sent as the first message of every new thread.
pub const KICKOFF_PROMPT: &str = "Начни с шага '0. Инициализация:' и спроси моё имя.";

/// Sent instead of the player's first answer, which is their name.
/// `{name}` is replaced with that answer.
pub const NAME_TURN_PROMPT: &str = "Теперь представь персонажей, строго следуя формату из сценария, и только после этого начни первую сцену.

ВАЖНО: Замени все упоминания \"Игрок\", \"Саша\" и подобные на имя игрока \"{name}\". История должна быть полностью персонализирована под это имя.

Каждый персонаж должен быть представлен с фотографией на отдельной строке в формате [AI отправляет фото: ![название](ссылка)]";

/// Fixed prompts the engine sends on the player's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    /// Opening prompt of a fresh thread.
    pub kickoff: String,
    /// Template of the name-collection turn.
    pub name_turn: String,
}

impl Prompts {
    /// Render the name-collection prompt for a player name.
    pub fn name_turn(&self, name: &str) -> String {
        self.name_turn.replace("{name}", name.trim())
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            kickoff: KICKOFF_PROMPT.to_string(),
            name_turn: NAME_TURN_PROMPT.to_string(),
        }
    }
}

/// Everything the engine needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Assistant that runs every thread.
    pub assistant_id: String,
    /// Retries for thread creation.
    pub thread_retry: RetryPolicy,
    /// Retries for whole runs.
    pub run_retry: RetryPolicy,
    /// Prompts sent on the player's behalf.
    pub prompts: Prompts,
}

impl EngineConfig {
    /// Configuration with default retry policies and prompts.
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            thread_retry: RetryPolicy::thread_creation(),
            run_retry: RetryPolicy::runs(),
            prompts: Prompts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_turn_substitution() {
        let prompt = Prompts::default().name_turn(" Алиса \n");
        assert!(prompt.contains("имя игрока \"Алиса\""));
        assert!(!prompt.contains("{name}"));
        assert!(prompt.contains("[AI отправляет фото: ![название](ссылка)]"));
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("asst_1");
        assert_eq!(config.assistant_id, "asst_1");
        assert_eq!(config.thread_retry.attempts, 3);
        assert_eq!(config.run_retry.attempts, 3);
        assert_eq!(config.prompts.kickoff, KICKOFF_PROMPT);
    }
}
