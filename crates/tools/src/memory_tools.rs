use crate::traits::{parse_input, Tool, ToolError};
use async_trait::async_trait;
use deskmate_memory::{MemoryStore, UserProfileStore};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
struct SaveMemoryInput {
    content: String,
}

pub struct SaveAiMemoryTool {
    store: Arc<MemoryStore>,
}

impl SaveAiMemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveAiMemoryTool {
    fn name(&self) -> &str {
        "save_ai_memory"
    }

    fn description(&self) -> &str {
        "用完整的新内容替换 AI 记忆文档（Markdown）。先用 get_ai_memory 读取，修改后整体保存，保留原有的章节结构"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "完整的记忆文档内容"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: SaveMemoryInput = parse_input(input)?;
        if input.content.trim().is_empty() {
            return Err(ToolError::Validation("记忆内容不能为空".into()));
        }
        self.store.put(&input.content).await?;
        Ok("✅ 记忆已保存".to_string())
    }
}

pub struct GetAiMemoryTool {
    store: Arc<MemoryStore>,
}

impl GetAiMemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetAiMemoryTool {
    fn name(&self) -> &str {
        "get_ai_memory"
    }

    fn description(&self) -> &str {
        "读取当前的 AI 记忆文档"
    }

    fn schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: serde_json::Value) -> Result<String, ToolError> {
        Ok(self.store.get().await)
    }
}

#[derive(Deserialize)]
struct SaveUserInfoInput {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct GetUserInfoInput {
    #[serde(default)]
    key: Option<String>,
}

pub struct SaveUserInfoTool {
    profile: Arc<UserProfileStore>,
}

impl SaveUserInfoTool {
    pub fn new(profile: Arc<UserProfileStore>) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl Tool for SaveUserInfoTool {
    fn name(&self) -> &str {
        "save_user_info"
    }

    fn description(&self) -> &str {
        "保存一条用户信息（如姓名、城市、常用目录），同名键会被覆盖"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "信息名称，如 name" },
                "value": { "type": "string", "description": "信息内容" }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: SaveUserInfoInput = parse_input(input)?;
        let key = input.key.trim();
        if key.is_empty() {
            return Err(ToolError::Validation("key 不能为空".into()));
        }
        self.profile.save(key, &input.value).await?;
        Ok(format!("✅ 已保存用户信息: {}", key))
    }
}

pub struct GetUserInfoTool {
    profile: Arc<UserProfileStore>,
}

impl GetUserInfoTool {
    pub fn new(profile: Arc<UserProfileStore>) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl Tool for GetUserInfoTool {
    fn name(&self) -> &str {
        "get_user_info"
    }

    fn description(&self) -> &str {
        "读取已保存的用户信息。提供 key 时只返回该项，否则返回全部"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "信息名称（可选）" }
            }
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let input: GetUserInfoInput = parse_input(input)?;
        match input.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Ok(match self.profile.get(key).await? {
                Some(value) => format!("{}: {}", key, value),
                None => format!("未找到用户信息: {}", key),
            }),
            None => {
                let profile = self.profile.load().await?;
                if profile.is_empty() {
                    return Ok("暂无用户信息".to_string());
                }
                Ok(profile
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskmate_memory::LocalMemory;
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_tools_share_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(
            "device:test",
            LocalMemory::new(dir.path()),
            None,
            Duration::from_secs(60),
        ));
        let save = SaveAiMemoryTool::new(store.clone());
        let get = GetAiMemoryTool::new(store);

        assert!(get.execute(json!({})).await.unwrap().contains("用户偏好"));
        assert_eq!(
            save.execute(json!({"content": "# 记忆\n- 喜欢深色模式"})).await.unwrap(),
            "✅ 记忆已保存"
        );
        assert_eq!(get.execute(json!({})).await.unwrap(), "# 记忆\n- 喜欢深色模式");
        assert!(matches!(
            save.execute(json!({"content": "  "})).await,
            Err(ToolError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_user_info_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Arc::new(UserProfileStore::new(dir.path().join("user_info.json")));
        let save = SaveUserInfoTool::new(profile.clone());
        let get = GetUserInfoTool::new(profile);

        assert_eq!(get.execute(json!({})).await.unwrap(), "暂无用户信息");
        save.execute(json!({"key": "name", "value": "小王"})).await.unwrap();
        save.execute(json!({"key": "city", "value": "杭州"})).await.unwrap();

        assert_eq!(get.execute(json!({"key": "name"})).await.unwrap(), "name: 小王");
        assert_eq!(get.execute(json!({})).await.unwrap(), "city: 杭州\nname: 小王");
        assert!(get
            .execute(json!({"key": "email"}))
            .await
            .unwrap()
            .starts_with("未找到"));
    }
}
