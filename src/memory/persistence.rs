//! 时间线持久化
//!
//! 导出到 history 目录下的 JSON 文件（默认文件名带时间），或从任意路径加载。

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::core::HistoryError;
use crate::memory::HistoryStore;

/// 单目录 JSON 文件持久化
#[derive(Debug, Clone)]
pub struct HistoryPersistence {
    dir: PathBuf,
}

impl HistoryPersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 目标文件路径：未给名字时用 history_MMDD_HHMM.json；缺少扩展名时补 .json
    pub fn target_path(&self, name: Option<&str>) -> PathBuf {
        let file = match name {
            Some(n) if n.ends_with(".json") => n.to_string(),
            Some(n) => format!("{}.json", n),
            None => format!("history_{}.json", Local::now().format("%m%d_%H%M")),
        };
        self.dir.join(file)
    }

    /// 导出时间线；目录不存在时自动创建，返回写入的路径
    pub async fn save(&self, store: &HistoryStore, name: Option<&str>) -> Result<PathBuf, HistoryError> {
        let path = self.target_path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, store.export()?).await?;
        tracing::info!(path = %path.display(), turns = store.len(), "history exported");
        Ok(path)
    }

    /// 读取并解析文件，返回新的时间线（调用方决定是否替换）
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<HistoryStore, HistoryError> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(HistoryError::NotFound(path.to_path_buf()));
        }
        let data = tokio::fs::read_to_string(path).await?;
        let mut store = HistoryStore::new();
        store.import(&data)?;
        tracing::info!(path = %path.display(), turns = store.len(), "history loaded");
        Ok(store)
    }
}
