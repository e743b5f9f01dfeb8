// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::pipeline::stage::{Stage, StageArtifact};

/// 工作目录错误类型
#[derive(Error, Debug)]
pub enum WorkdirError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 任务工作目录
///
/// 每个任务独占一个目录，按阶段追加产物文件；
/// 报告编译器只读取这些文件，任务删除时整个目录一并删除。
#[derive(Debug, Clone)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// 为任务创建全新的工作目录
    ///
    /// 目录名由清洗后的目标名和任务ID前缀组成，
    /// 保证可读且不冲突。
    pub async fn create(root: &str, target: &str, job_id: Uuid) -> Result<Self, WorkdirError> {
        let safe_target: String = target
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
            .collect::<String>()
            .trim()
            .replace(' ', "_");

        let id_prefix: String = job_id.simple().to_string().chars().take(8).collect();
        let path = Path::new(root).join(format!("research_{}_{}", safe_target, id_prefix));

        fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    /// 打开既有工作目录（用于删除或读取）
    pub fn open(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
        }
    }

    /// 工作目录路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 写入阶段产物
    pub async fn write_stage(&self, artifact: &StageArtifact) -> Result<PathBuf, WorkdirError> {
        let path = self.path.join(artifact.stage.artifact_name());
        let body = serde_json::to_vec_pretty(artifact)?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&body).await?;
        file.flush().await?;
        Ok(path)
    }

    /// 读取阶段产物，文件缺失或损坏时返回None
    ///
    /// 缺失的阶段是常态（数据可用性因目标而异），调用方
    /// 不应把None当作错误。
    pub async fn read_stage(&self, stage: Stage) -> Option<StageArtifact> {
        let path = self.path.join(stage.artifact_name());
        let body = fs::read(&path).await.ok()?;
        serde_json::from_slice(&body).ok()
    }

    /// 写入文本文件（报告产物）
    pub async fn write_text(&self, name: &str, content: &str) -> Result<PathBuf, WorkdirError> {
        let path = self.path.join(name);
        let mut file = fs::File::create(&path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }

    /// 判断文件是否存在
    pub async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.path.join(name)).await.unwrap_or(false)
    }

    /// 删除整个工作目录及其全部产物
    pub async fn remove(&self) -> Result<(), WorkdirError> {
        if fs::try_exists(&self.path).await.unwrap_or(false) {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::record::Record;

    fn artifact(stage: Stage) -> StageArtifact {
        StageArtifact::success(
            stage,
            "OpenAI",
            vec![Record::new(
                "t".into(),
                "https://e.x/1".into(),
                "s".into(),
                "test",
            )],
        )
    }

    #[tokio::test]
    async fn test_create_sanitizes_target() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_str().unwrap();

        let workdir = WorkDir::create(root, "Acme / Słün & Co", Uuid::new_v4())
            .await
            .unwrap();

        let dir_name = workdir.path().file_name().unwrap().to_str().unwrap();
        assert!(dir_name.starts_with("research_Acme__Słün__Co_"));
        assert!(!dir_name.contains('/'));
        assert!(!dir_name.contains('&'));
    }

    #[tokio::test]
    async fn test_write_and_read_stage_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = WorkDir::create(tmp.path().to_str().unwrap(), "Acme", Uuid::new_v4())
            .await
            .unwrap();

        workdir.write_stage(&artifact(Stage::Search)).await.unwrap();

        let read = workdir.read_stage(Stage::Search).await.unwrap();
        assert!(read.success);
        assert_eq!(read.num_records, 1);
        assert!(workdir.read_stage(Stage::News).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_deletes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let workdir = WorkDir::create(tmp.path().to_str().unwrap(), "Acme", Uuid::new_v4())
            .await
            .unwrap();
        workdir.write_stage(&artifact(Stage::Search)).await.unwrap();
        workdir.write_text("DOSSIER.md", "# hi").await.unwrap();

        workdir.remove().await.unwrap();
        assert!(!fs::try_exists(workdir.path()).await.unwrap());
    }
}
