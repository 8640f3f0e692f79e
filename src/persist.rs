//! 会话持久化
//!
//! 只持久化窗口结束时间（单文件 JSON），倒计时重启后从墙钟重新推导，
//! 进度基线在恢复时重新捕获，从不持久化总量。

use std::path::Path;

/// 单文件 JSON 持久化：保存/读取托管窗口的结束时间
#[derive(Debug)]
pub struct SessionPersistence {
    path: std::path::PathBuf,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SerSession {
    end_ms: i64,
}

impl SessionPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 读取持久化的结束时间；文件不存在时返回 None
    pub fn load(&self) -> anyhow::Result<Option<i64>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let session: SerSession = serde_json::from_str(&data)?;
        Ok(Some(session.end_ms))
    }

    /// 写入结束时间；父目录不存在时自动创建
    pub fn save(&self, end_ms: i64) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&SerSession { end_ms })?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    /// 会话结束后清掉持久化状态
    pub fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
