#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chatrelay::chat::store::{CURRENT_SESSION_KEY, SESSIONS_KEY};
    use chatrelay::chat::{
        ChatApi, ChatController, ChatSettings, ClientError, FileStore, Message, SettingsPatch,
        StateStore,
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    struct EchoApi;

    #[async_trait]
    impl ChatApi for EchoApi {
        async fn send(&self, messages: &[Message], _settings: &ChatSettings) -> Result<String, ClientError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(format!("echo: {}", last))
        }
    }

    fn open(dir: &std::path::Path) -> ChatController<Arc<dyn StateStore>, EchoApi> {
        let store: Arc<dyn StateStore> = Arc::new(FileStore::open(dir).unwrap());
        ChatController::new(store, EchoApi)
    }

    #[tokio::test]
    async fn history_and_settings_survive_restart() {
        let dir = tempdir().unwrap();

        let session_id = {
            let mut chat = open(dir.path());
            chat.update_settings(SettingsPatch {
                model: Some("local/model".to_string()),
                temperature: Some(0.2),
                ..Default::default()
            });
            chat.send_message("remember me").await.unwrap();
            chat.current_session_id().unwrap().to_string()
        };

        let chat = open(dir.path());
        assert_eq!(chat.current_session_id(), Some(session_id.as_str()));
        assert_eq!(chat.settings().model, "local/model");
        assert_eq!(chat.settings().temperature, Some(0.2));

        let session = chat.current_session().unwrap();
        assert_eq!(session.title, "remember me");
        let contents: Vec<_> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["remember me", "echo: remember me"]);
    }

    #[test]
    fn deleting_last_session_clears_pointer_on_disk() {
        let dir = tempdir().unwrap();
        {
            let mut chat = open(dir.path());
            let session = chat.create_session();
            assert!(chat.delete_session(&session.id));
        }

        let store = FileStore::open(dir.path()).unwrap();
        let current: Option<String> = store.get(CURRENT_SESSION_KEY, Some("sentinel".to_string()));
        assert_eq!(current, None);
        let sessions: Vec<serde_json::Value> = store.get(SESSIONS_KEY, vec![serde_json::json!(1)]);
        assert!(sessions.is_empty());
    }

    #[test]
    fn corrupt_records_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("chat-sessions.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("chat-settings.json"), r#"{"model":"kept/model"}"#).unwrap();

        let chat = open(dir.path());
        assert!(chat.sessions().is_empty());
        assert!(chat.current_session_id().is_none());
        assert_eq!(chat.settings().model, "kept/model");
        assert_eq!(chat.settings().system_prompt, ChatSettings::default().system_prompt);
    }
}
