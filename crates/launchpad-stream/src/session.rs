//! 연결 ID 세션 저장소.
//!
//! 재연결 시 서버가 세션을 이어갈 수 있도록 마지막 연결 ID를 고정 키로 보관합니다.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StreamError, StreamResult};

/// 연결 ID를 저장하는 키.
pub const CONNECTION_ID_KEY: &str = "ws_connection_id";

/// 키-값 세션 저장소.
pub trait SessionStore: Send + 'static {
    fn get(&self, key: &str) -> StreamResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> StreamResult<()>;
    fn remove(&mut self, key: &str) -> StreamResult<()>;
}

/// 프로세스 메모리 저장소.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    values: HashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> StreamResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StreamResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StreamResult<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// JSON 파일 저장소.
///
/// 같은 터미널 세션에서 CLI를 다시 실행해도 연결 ID를 재사용할 수 있습니다.
/// 파일이 없으면 빈 저장소로 취급합니다.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StreamResult<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            StreamError::SessionStore(format!("{}: {}", self.path.display(), e))
        })
    }

    fn save(&self, values: &HashMap<String, String>) -> StreamResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        debug!(path = %self.path.display(), "Session file written");
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> StreamResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> StreamResult<()> {
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn remove(&mut self, key: &str) -> StreamResult<()> {
        let mut values = self.load()?;
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}
