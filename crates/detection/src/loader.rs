//! 룰 파일 로더 -- 디스크에서 탐지 룰을 읽습니다.
//!
//! 다음 세 가지 형태를 지원합니다.
//! - 룰 목록을 담은 JSON 파일 (`config/detection_rules.json`)
//! - 룰 하나를 담은 YAML/JSON 파일
//! - `.yml`/`.yaml`/`.json` 파일이 있는 디렉토리
//!
//! 개별 항목이나 파일의 실패는 경고 로그를 남기고 건너뛰며,
//! 건너뛴 사유는 [`LoadedRules::rejected`]에 모읍니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use graphwarden_core::error::RuleError;
use serde_json::Value;
use tracing::{info, warn};

use crate::rule::{Rule, RuleRecord};

/// 룰 파일 최대 크기
pub const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
/// 한 번에 로드할 수 있는 최대 룰 수
pub const MAX_RULES_COUNT: usize = 10_000;

/// 로딩 결과
#[derive(Debug, Default)]
pub struct LoadedRules {
    /// 검증을 통과한 룰 (중복 ID 제외)
    pub rules: Vec<Rule>,
    /// 건너뛴 항목
    pub rejected: Vec<RuleError>,
}

impl LoadedRules {
    fn accept(&mut self, rule: Rule, seen_ids: &mut HashSet<String>, source: &str) {
        if !seen_ids.insert(rule.rule_id.clone()) {
            warn!(rule_id = %rule.rule_id, path = source, "duplicate rule id, skipping");
            self.rejected.push(RuleError::Load {
                path: source.to_owned(),
                reason: format!("duplicate rule id '{}'", rule.rule_id),
            });
            return;
        }
        self.rules.push(rule);
    }

    fn reject(&mut self, error: RuleError) {
        warn!(error = %error, "rule rejected, skipping");
        self.rejected.push(error);
    }
}

/// 룰 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 파일 또는 디렉토리에서 룰을 로드합니다.
    ///
    /// # Errors
    /// - 경로를 읽을 수 없는 경우
    /// - 단일 파일이 크기 제한을 넘거나 파싱할 수 없는 경우
    /// - 룰 수가 [`MAX_RULES_COUNT`]를 초과하는 경우
    pub async fn load_path(path: impl AsRef<Path>) -> Result<LoadedRules, RuleError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_error(path, format!("failed to read metadata: {e}")))?;

        if metadata.is_dir() {
            Self::load_directory(path).await
        } else {
            let mut loaded = LoadedRules::default();
            let mut seen_ids = HashSet::new();
            Self::load_file_into(path, &mut loaded, &mut seen_ids).await?;
            check_count(path, &loaded)?;
            info!(path = %path.display(), count = loaded.rules.len(), "loaded detection rules");
            Ok(loaded)
        }
    }

    /// 디렉토리의 룰 파일을 이름 순으로 로드합니다.
    ///
    /// 읽을 수 없는 파일은 경고 후 건너뜁니다.
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<LoadedRules, RuleError> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| load_error(dir, format!("failed to read directory: {e}")))?;

        let mut files: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| load_error(dir, format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_rule_file = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml" || ext == "json");
            if is_rule_file {
                files.push(path);
            }
        }
        // 중복 ID가 있을 때 어느 쪽이 남을지 결정적이어야 함
        files.sort();

        let mut loaded = LoadedRules::default();
        let mut seen_ids = HashSet::new();
        for path in &files {
            if let Err(e) = Self::load_file_into(path, &mut loaded, &mut seen_ids).await {
                loaded.reject(e);
            }
            check_count(dir, &loaded)?;
        }

        info!(
            dir = %dir.display(),
            files = files.len(),
            count = loaded.rules.len(),
            rejected = loaded.rejected.len(),
            "loaded detection rules"
        );
        Ok(loaded)
    }

    /// 단일 파일의 룰을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<LoadedRules, RuleError> {
        let path = path.as_ref();
        let mut loaded = LoadedRules::default();
        Self::load_file_into(path, &mut loaded, &mut HashSet::new()).await?;
        check_count(path, &loaded)?;
        Ok(loaded)
    }

    async fn load_file_into(
        path: &Path,
        loaded: &mut LoadedRules,
        seen_ids: &mut HashSet<String>,
    ) -> Result<(), RuleError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_error(path, format!("failed to read file metadata: {e}")))?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(load_error(
                path,
                format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            ));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_error(path, format!("failed to read file: {e}")))?;

        let source = path.display().to_string();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        Self::parse_into(&content, is_json, &source, loaded, seen_ids)
    }

    /// 문자열에서 룰을 파싱합니다. `is_json`이 거짓이면 YAML로 읽습니다.
    pub fn parse_str(content: &str, is_json: bool, source: &str) -> Result<LoadedRules, RuleError> {
        let mut loaded = LoadedRules::default();
        Self::parse_into(content, is_json, source, &mut loaded, &mut HashSet::new())?;
        Ok(loaded)
    }

    fn parse_into(
        content: &str,
        is_json: bool,
        source: &str,
        loaded: &mut LoadedRules,
        seen_ids: &mut HashSet<String>,
    ) -> Result<(), RuleError> {
        let document: Value = if is_json {
            serde_json::from_str(content).map_err(|e| RuleError::Load {
                path: source.to_owned(),
                reason: format!("JSON parse error: {e}"),
            })?
        } else {
            serde_yaml::from_str(content).map_err(|e| RuleError::Load {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?
        };

        match document {
            Value::Array(items) => {
                for (index, item) in items.into_iter().enumerate() {
                    match parse_record(item, &format!("{source}[{index}]")) {
                        Ok(rule) => loaded.accept(rule, seen_ids, source),
                        Err(e) => loaded.reject(e),
                    }
                }
            }
            single => {
                let rule = parse_record(single, source)?;
                loaded.accept(rule, seen_ids, source);
            }
        }
        Ok(())
    }
}

fn parse_record(value: Value, source: &str) -> Result<Rule, RuleError> {
    let record: RuleRecord = serde_json::from_value(value).map_err(|e| RuleError::Load {
        path: source.to_owned(),
        reason: format!("invalid rule definition: {e}"),
    })?;
    record.into_rule()
}

fn check_count(path: &Path, loaded: &LoadedRules) -> Result<(), RuleError> {
    if loaded.rules.len() > MAX_RULES_COUNT {
        return Err(load_error(
            path,
            format!("too many rules: max {MAX_RULES_COUNT}"),
        ));
    }
    Ok(())
}

fn load_error(path: &Path, reason: String) -> RuleError {
    RuleError::Load {
        path: path.display().to_string(),
        reason,
    }
}
