use async_trait::async_trait;
use kanshi_core::common::Symbol;
use kanshi_core::market::entity::IndicatorReading;
use kanshi_core::market::error::ProviderError;
use kanshi_core::market::port::IndicatorSource;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// # Summary
/// 从目录中读取预先计算好的指标读数，每个标的一个 `<SYMBOL>.json` 文件。
///
/// # Invariants
/// - 每次 `fetch` 都重新读取文件，外部进程可随时覆盖文件更新读数。
/// - 只接受由字母、数字、`.`、`-`、`_`、`^` 组成的代码，拒绝任何路径穿越。
///
/// 文件内容即 `IndicatorReading` 的 JSON 形式：
///
/// ```json
/// {
///   "price": 187.2,
///   "sub_scores": { "fundamental": 0.8, "technical": 0.7, "sentiment": { "unavailable": "no news" } },
///   "metrics": { "volatility": 0.031, "news_impact": 0.45 }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, symbol: &Symbol) -> Result<PathBuf, ProviderError> {
        let name = symbol.as_str();
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^'));
        if !valid {
            return Err(ProviderError::NotFound(format!("unsupported symbol {:?}", name)));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

#[async_trait]
impl IndicatorSource for JsonFileSource {
    async fn fetch(&self, symbol: &Symbol) -> Result<IndicatorReading, ProviderError> {
        let path = self.path_for(symbol)?;
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProviderError::NotFound(path.display().to_string()),
            _ => ProviderError::Unknown(format!("{}: {}", path.display(), e)),
        })?;

        let reading: IndicatorReading =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Parse(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded reading for {} from {}", symbol, path.display());
        Ok(reading)
    }
}
