//! 스키마 레지스트리 -- 정규 이벤트 스키마 로딩과 검증
//!
//! [`SchemaDefinition`]은 점 표기 경로별 타입/필수 여부/범위를 선언합니다.
//! 내장 `canonical_event` 정의가 항상 등록되어 있으며,
//! [`SchemaRegistry::load_directory`]로 추가 정의를 읽어 들일 수 있습니다.
//!
//! 검증은 첫 번째 위반에서 멈추지 않고 모든 위반을 모아 반환합니다.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use chrono::DateTime;
use graphwarden_core::error::{FieldViolation, SchemaError};
use serde::{Deserialize, Serialize};

/// 내장 정규 이벤트 스키마 이름
pub const CANONICAL_EVENT: &str = "canonical_event";

/// 스키마 정의 파일 최대 크기 (1 MiB)
const MAX_SCHEMA_FILE_SIZE: u64 = 1024 * 1024;

/// 필드 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Bool,
    Object,
    List,
    /// RFC 3339 문자열
    Timestamp,
    /// IPv4/IPv6 주소 문자열
    Ip,
}

impl FieldType {
    fn matches(self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (Self::String, Value::String(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, Value::Number(_)) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            (Self::List, Value::Array(_)) => true,
            (Self::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            (Self::Ip, Value::String(s)) => s.parse::<IpAddr>().is_ok(),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::List => "list",
            Self::Timestamp => "RFC 3339 timestamp",
            Self::Ip => "IP address",
        };
        f.write_str(name)
    }
}

/// 필드 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// 점 표기 경로 (예: `metadata.product.name`)
    pub path: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// 숫자 최소값 (포함)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// 숫자 최대값 (포함)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FieldSpec {
    fn new(path: &str, field_type: FieldType, required: bool) -> Self {
        Self {
            path: path.to_owned(),
            field_type,
            required,
            min: None,
            max: None,
        }
    }

    fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// 스키마 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// 파일에서 로드할 때는 파일 이름(확장자 제외)으로 덮어씁니다.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub fields: Vec<FieldSpec>,
}

impl SchemaDefinition {
    /// 내장 정규 이벤트 스키마
    pub fn canonical_event(version: &str) -> Self {
        use FieldType as T;
        let endpoint = |prefix: &str| {
            vec![
                FieldSpec::new(prefix, T::Object, false),
                FieldSpec::new(&format!("{prefix}.ip"), T::Ip, false),
                FieldSpec::new(&format!("{prefix}.hostname"), T::String, false),
                FieldSpec::new(&format!("{prefix}.port"), T::Integer, false)
                    .bounded(0.0, 65535.0),
            ]
        };

        let mut fields = vec![
            FieldSpec::new("class_uid", T::String, true),
            FieldSpec::new("category_uid", T::String, false),
            FieldSpec::new("time", T::Timestamp, true),
            FieldSpec::new("severity", T::Integer, false).bounded(0.0, 10.0),
            FieldSpec::new("message", T::String, false),
            FieldSpec::new("metadata", T::Object, true),
            FieldSpec::new("metadata.version", T::String, true),
            FieldSpec::new("metadata.product", T::Object, true),
            FieldSpec::new("metadata.product.name", T::String, true),
            FieldSpec::new("metadata.product.version", T::String, false),
            FieldSpec::new("metadata.vendor_name", T::String, false),
            FieldSpec::new("metadata.uid", T::String, false),
            FieldSpec::new("principal", T::Object, false),
            FieldSpec::new("resources", T::List, false),
            FieldSpec::new("extensions", T::Object, false),
        ];
        fields.extend(endpoint("src"));
        fields.extend(endpoint("dst"));

        Self {
            name: CANONICAL_EVENT.to_owned(),
            version: version.to_owned(),
            fields,
        }
    }

    /// 초안(draft) 문서를 검증하고 모든 위반을 반환합니다.
    pub fn check(&self, draft: &serde_json::Value) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        for spec in &self.fields {
            match lookup(draft, &spec.path) {
                None | Some(serde_json::Value::Null) => {
                    if spec.required {
                        violations.push(violation(&spec.path, "missing required field"));
                    }
                }
                Some(value) => {
                    if !spec.field_type.matches(value) {
                        violations.push(violation(
                            &spec.path,
                            &format!("expected {}, got {}", spec.field_type, json_type(value)),
                        ));
                        continue;
                    }
                    if spec.required && value.as_str().is_some_and(|s| s.trim().is_empty()) {
                        violations.push(violation(&spec.path, "must not be empty"));
                        continue;
                    }
                    if let Some(n) = value.as_f64() {
                        if spec.min.is_some_and(|min| n < min) || spec.max.is_some_and(|max| n > max)
                        {
                            violations.push(violation(
                                &spec.path,
                                &format!(
                                    "value {n} out of range {}-{}",
                                    spec.min.map_or("-inf".to_owned(), |v| v.to_string()),
                                    spec.max.map_or("inf".to_owned(), |v| v.to_string())
                                ),
                            ));
                        }
                    }
                }
            }
        }
        violations
    }
}

/// 스키마 레지스트리
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: String,
    schemas: HashMap<String, SchemaDefinition>,
}

impl SchemaRegistry {
    /// 내장 정의만 가진 레지스트리를 생성합니다.
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        let mut schemas = HashMap::new();
        schemas.insert(
            CANONICAL_EVENT.to_owned(),
            SchemaDefinition::canonical_event(&version),
        );
        Self { version, schemas }
    }

    /// 레지스트리의 OCSF 스키마 버전
    pub fn version(&self) -> &str {
        &self.version
    }

    /// 정의를 등록합니다. 같은 이름이 있으면 교체합니다.
    pub fn register(&mut self, definition: SchemaDefinition) {
        self.schemas.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&SchemaDefinition> {
        self.schemas.get(name)
    }

    /// 등록된 스키마 이름 목록 (정렬됨)
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 초안 문서를 이름으로 지정한 스키마로 검증합니다.
    pub fn validate(&self, name: &str, draft: &serde_json::Value) -> Result<(), SchemaError> {
        let definition = self
            .schemas
            .get(name)
            .ok_or_else(|| SchemaError::UnknownSchema(name.to_owned()))?;
        let violations = definition.check(draft);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Violation {
                schema: name.to_owned(),
                violations,
            })
        }
    }

    /// 디렉토리에서 `.json`/`.yaml`/`.yml` 스키마 정의를 로드합니다.
    ///
    /// 정의 이름은 파일 이름(확장자 제외)입니다. 개별 파일 실패는 경고 후 건너뜁니다.
    /// 반환값은 새로 등록된 정의 수입니다.
    pub async fn load_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize, SchemaError> {
        let dir = dir.as_ref();
        let load_err = |reason: String| SchemaError::Load {
            path: dir.display().to_string(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| load_err(format!("failed to read directory: {e}")))?;

        let mut loaded = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| load_err(format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !matches!(ext, "json" | "yaml" | "yml") {
                continue;
            }

            match Self::load_file(&path).await {
                Ok(definition) => {
                    tracing::debug!(
                        schema = %definition.name,
                        fields = definition.fields.len(),
                        "schema definition loaded"
                    );
                    self.register(definition);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load schema file, skipping"
                    );
                }
            }
        }

        tracing::info!(dir = %dir.display(), count = loaded, "loaded schema definitions");
        Ok(loaded)
    }

    /// 단일 스키마 정의 파일을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<SchemaDefinition, SchemaError> {
        let path = path.as_ref();
        let load_err = |reason: String| SchemaError::Load {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_SCHEMA_FILE_SIZE {
            return Err(load_err(format!(
                "file too large: {} bytes (max: {MAX_SCHEMA_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(format!("failed to read file: {e}")))?;

        let mut definition: SchemaDefinition =
            if path.extension().is_some_and(|ext| ext == "json") {
                serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))?
            } else {
                serde_yaml::from_str(&content).map_err(|e| load_err(e.to_string()))?
            };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| load_err("invalid file name".to_owned()))?;
        definition.name = stem.to_owned();

        if definition.fields.iter().any(|f| f.path.trim().is_empty()) {
            return Err(load_err("field path must not be empty".to_owned()));
        }
        Ok(definition)
    }
}

fn lookup<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn violation(field: &str, reason: &str) -> FieldViolation {
    FieldViolation {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
