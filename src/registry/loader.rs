//! 注册表加载器
//!
//! 从声明目录加载 `*_agent.json` / `*_agent.toml`，按文件名字典序构建 CapabilityRegistry。
//! 任何读取、解析、类型名错误都视为启动期致命错误。

use std::path::{Path, PathBuf};

use crate::core::RegistryError;
use crate::registry::{AgentDeclaration, CapabilityRegistry};

/// 注册表加载器
pub struct RegistryLoader {
    dir: PathBuf,
}

impl RegistryLoader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 从默认位置创建（config/agents 或 ../config/agents）
    pub fn from_default() -> Self {
        let dirs = [PathBuf::from("config/agents"), PathBuf::from("../config/agents")];
        let dir = dirs
            .into_iter()
            .find(|d| d.exists())
            .unwrap_or_else(|| PathBuf::from("config/agents"));
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 声明文件列表（字典序）
    fn declaration_files(&self) -> Result<Vec<PathBuf>, RegistryError> {
        let mut files = Vec::new();
        for ext in ["json", "toml"] {
            let pattern = self.dir.join(format!("*_agent.{ext}"));
            let pattern = pattern.to_string_lossy();
            let paths = glob::glob(&pattern).map_err(|e| RegistryError::Pattern(e.to_string()))?;
            files.extend(paths.flatten());
        }
        files.sort();
        Ok(files)
    }

    fn load_declaration(path: &Path) -> Result<AgentDeclaration, RegistryError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: display.clone(),
            source,
        })?;
        let parsed = if path.extension().is_some_and(|e| e == "toml") {
            toml::from_str::<AgentDeclaration>(&text).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<AgentDeclaration>(&text).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| RegistryError::Parse {
            path: display,
            message,
        })
    }

    /// 加载全部声明
    pub fn load(&self) -> Result<CapabilityRegistry, RegistryError> {
        let files = self.declaration_files()?;
        if files.is_empty() {
            return Err(RegistryError::Empty(self.dir.display().to_string()));
        }
        let mut specs = Vec::with_capacity(files.len());
        for path in &files {
            let decl = Self::load_declaration(path)?;
            specs.push(decl.into_spec(&path.display().to_string())?);
        }
        let registry = CapabilityRegistry::from_specs(specs)?;
        tracing::info!(
            dir = %self.dir.display(),
            agents = registry.len(),
            "Loaded capability registry"
        );
        Ok(registry)
    }
}

/// 便捷函数：从给定目录加载
pub fn load_registry(dir: impl AsRef<Path>) -> Result<CapabilityRegistry, RegistryError> {
    RegistryLoader::new(dir).load()
}
