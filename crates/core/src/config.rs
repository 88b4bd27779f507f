//! 설정 관리 -- graphwarden.toml 파싱 및 런타임 설정
//!
//! [`GraphwardenConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`GRAPHWARDEN_QUEUE_TOPIC=events` 형식)
//! 3. 설정 파일 (`graphwarden.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), graphwarden_core::error::GraphwardenError> {
//! use graphwarden_core::config::GraphwardenConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = GraphwardenConfig::load("graphwarden.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = GraphwardenConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, GraphwardenError};

/// 입력 최대 크기 상한 (16 MiB)
const MAX_INPUT_SIZE_LIMIT: usize = 16 * 1024 * 1024;
/// 커넥션 풀 최대 크기
const MAX_GRAPH_CONNECTIONS: usize = 1024;
/// 파티션 최대 수
const MAX_PARTITIONS: u32 = 1024;
/// 메시지당 최대 로컬 재시도 횟수
const MAX_RETRIES_LIMIT: u32 = 100;
/// 동시 실행 룰 최대 수
const MAX_CONCURRENT_RULES: usize = 256;

/// GraphWarden 통합 설정
///
/// `graphwarden.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphwardenConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스키마/정규화 설정
    #[serde(default)]
    pub schema: SchemaConfig,
    /// 그래프 저장소 설정
    #[serde(default)]
    pub graph: GraphConfig,
    /// 메시지 큐 설정
    #[serde(default)]
    pub queue: QueueConfig,
    /// 수집 경로 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 탐지 엔진 설정
    #[serde(default)]
    pub detection: DetectionConfig,
}

impl GraphwardenConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GraphwardenError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값에 환경변수 오버라이드만 적용해 반환합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, GraphwardenError> {
        match Self::load(path.as_ref()).await {
            Err(GraphwardenError::Config(ConfigError::FileNotFound { path })) => {
                tracing::debug!(path = %path, "config file not found, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, GraphwardenError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GraphwardenError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                GraphwardenError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, GraphwardenError> {
        toml::from_str(toml_str).map_err(|e| {
            GraphwardenError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `GRAPHWARDEN_{SECTION}_{FIELD}`
    /// 예: `GRAPHWARDEN_QUEUE_BOOTSTRAP_SERVERS=kafka:9092`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "GRAPHWARDEN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "GRAPHWARDEN_GENERAL_LOG_FORMAT");
        override_string(
            &mut self.general.environment,
            "GRAPHWARDEN_GENERAL_ENVIRONMENT",
        );

        // Schema
        override_string(&mut self.schema.version, "GRAPHWARDEN_SCHEMA_VERSION");
        override_string(&mut self.schema.schema_path, "GRAPHWARDEN_SCHEMA_SCHEMA_PATH");
        override_string(
            &mut self.schema.severity_policy,
            "GRAPHWARDEN_SCHEMA_SEVERITY_POLICY",
        );
        override_usize(
            &mut self.schema.max_input_size,
            "GRAPHWARDEN_SCHEMA_MAX_INPUT_SIZE",
        );

        // Graph
        override_string(&mut self.graph.uri, "GRAPHWARDEN_GRAPH_URI");
        override_string(&mut self.graph.user, "GRAPHWARDEN_GRAPH_USER");
        override_string(&mut self.graph.password, "GRAPHWARDEN_GRAPH_PASSWORD");
        override_usize(
            &mut self.graph.max_connections,
            "GRAPHWARDEN_GRAPH_MAX_CONNECTIONS",
        );
        override_u64(
            &mut self.graph.acquire_timeout_ms,
            "GRAPHWARDEN_GRAPH_ACQUIRE_TIMEOUT_MS",
        );

        // Queue
        override_string(&mut self.queue.backend, "GRAPHWARDEN_QUEUE_BACKEND");
        override_string(
            &mut self.queue.bootstrap_servers,
            "GRAPHWARDEN_QUEUE_BOOTSTRAP_SERVERS",
        );
        override_string(&mut self.queue.topic, "GRAPHWARDEN_QUEUE_TOPIC");
        override_string(
            &mut self.queue.dead_letter_topic,
            "GRAPHWARDEN_QUEUE_DEAD_LETTER_TOPIC",
        );
        override_string(
            &mut self.queue.consumer_group,
            "GRAPHWARDEN_QUEUE_CONSUMER_GROUP",
        );
        override_u32(&mut self.queue.partitions, "GRAPHWARDEN_QUEUE_PARTITIONS");
        override_u32(&mut self.queue.max_retries, "GRAPHWARDEN_QUEUE_MAX_RETRIES");
        override_u32(
            &mut self.queue.max_redeliveries,
            "GRAPHWARDEN_QUEUE_MAX_REDELIVERIES",
        );
        override_u64(
            &mut self.queue.retry_backoff_ms,
            "GRAPHWARDEN_QUEUE_RETRY_BACKOFF_MS",
        );
        override_u64(
            &mut self.queue.message_timeout_ms,
            "GRAPHWARDEN_QUEUE_MESSAGE_TIMEOUT_MS",
        );
        override_string(
            &mut self.queue.auto_offset_reset,
            "GRAPHWARDEN_QUEUE_AUTO_OFFSET_RESET",
        );

        // Ingest
        override_string(&mut self.ingest.default_mode, "GRAPHWARDEN_INGEST_DEFAULT_MODE");

        // Detection
        override_string(
            &mut self.detection.rules_path,
            "GRAPHWARDEN_DETECTION_RULES_PATH",
        );
        override_usize(
            &mut self.detection.max_concurrent_rules,
            "GRAPHWARDEN_DETECTION_MAX_CONCURRENT_RULES",
        );
        override_u64(
            &mut self.detection.rule_timeout_secs,
            "GRAPHWARDEN_DETECTION_RULE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.detection.refresh_interval_secs,
            "GRAPHWARDEN_DETECTION_REFRESH_INTERVAL_SECS",
        );
        override_u64(
            &mut self.detection.dedup_window_secs,
            "GRAPHWARDEN_DETECTION_DEDUP_WINDOW_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), GraphwardenError> {
        one_of(
            "general.log_level",
            &self.general.log_level,
            &["trace", "debug", "info", "warn", "error"],
        )?;
        one_of(
            "general.log_format",
            &self.general.log_format,
            &["json", "pretty"],
        )?;

        if self.schema.version.trim().is_empty() {
            return Err(invalid("schema.version", "must not be empty"));
        }
        one_of(
            "schema.severity_policy",
            &self.schema.severity_policy,
            &["clamp", "reject"],
        )?;
        if self.schema.max_input_size == 0 || self.schema.max_input_size > MAX_INPUT_SIZE_LIMIT
        {
            return Err(invalid(
                "schema.max_input_size",
                &format!("must be between 1 and {MAX_INPUT_SIZE_LIMIT}"),
            ));
        }

        if self.graph.uri.trim().is_empty() {
            return Err(invalid("graph.uri", "must not be empty"));
        }
        if self.graph.max_connections == 0 || self.graph.max_connections > MAX_GRAPH_CONNECTIONS
        {
            return Err(invalid(
                "graph.max_connections",
                &format!("must be between 1 and {MAX_GRAPH_CONNECTIONS}"),
            ));
        }
        if self.graph.acquire_timeout_ms == 0 {
            return Err(invalid("graph.acquire_timeout_ms", "must be greater than 0"));
        }

        one_of("queue.backend", &self.queue.backend, &["memory", "kafka"])?;
        if self.queue.topic.trim().is_empty() {
            return Err(invalid("queue.topic", "must not be empty"));
        }
        if self.queue.dead_letter_topic == self.queue.topic {
            return Err(invalid(
                "queue.dead_letter_topic",
                "must differ from queue.topic",
            ));
        }
        if self.queue.backend == "kafka" && self.queue.bootstrap_servers.trim().is_empty() {
            return Err(invalid(
                "queue.bootstrap_servers",
                "must not be empty when backend is kafka",
            ));
        }
        if self.queue.partitions == 0 || self.queue.partitions > MAX_PARTITIONS {
            return Err(invalid(
                "queue.partitions",
                &format!("must be between 1 and {MAX_PARTITIONS}"),
            ));
        }
        if self.queue.max_retries == 0 || self.queue.max_retries > MAX_RETRIES_LIMIT {
            return Err(invalid(
                "queue.max_retries",
                &format!("must be between 1 and {MAX_RETRIES_LIMIT}"),
            ));
        }
        if self.queue.message_timeout_ms == 0 {
            return Err(invalid("queue.message_timeout_ms", "must be greater than 0"));
        }
        one_of(
            "queue.auto_offset_reset",
            &self.queue.auto_offset_reset,
            &["earliest", "latest"],
        )?;

        one_of(
            "ingest.default_mode",
            &self.ingest.default_mode,
            &["direct", "queued"],
        )?;

        if self.detection.max_concurrent_rules == 0
            || self.detection.max_concurrent_rules > MAX_CONCURRENT_RULES
        {
            return Err(invalid(
                "detection.max_concurrent_rules",
                &format!("must be between 1 and {MAX_CONCURRENT_RULES}"),
            ));
        }
        if self.detection.rule_timeout_secs == 0 {
            return Err(invalid(
                "detection.rule_timeout_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> GraphwardenError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
    .into()
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), GraphwardenError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            field,
            &format!("must be one of: {}", allowed.join(", ")),
        ))
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 배포 환경 이름
    pub environment: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            environment: "production".to_owned(),
        }
    }
}

/// 스키마/정규화 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// OCSF 스키마 버전 (정규 이벤트의 metadata.version)
    pub version: String,
    /// 추가 스키마 정의 디렉토리 (비어 있으면 내장 정의만 사용)
    pub schema_path: String,
    /// 범위 밖 심각도 처리 정책 (clamp, reject)
    pub severity_policy: String,
    /// 원시 입력 최대 크기 (바이트)
    pub max_input_size: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_owned(),
            schema_path: String::new(),
            severity_policy: "clamp".to_owned(),
            max_input_size: 64 * 1024,
        }
    }
}

/// 그래프 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// 저장소 URI (`memory://`는 인프로세스 저장소)
    pub uri: String,
    /// 사용자명
    pub user: String,
    /// 비밀번호
    pub password: String,
    /// 커넥션 풀 크기
    pub max_connections: usize,
    /// 커넥션 획득 타임아웃 (밀리초)
    pub acquire_timeout_ms: u64,
}

impl GraphConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "memory://".to_owned(),
            user: "neo4j".to_owned(),
            password: String::new(),
            max_connections: 16,
            acquire_timeout_ms: 5_000,
        }
    }
}

/// 메시지 큐 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 브로커 백엔드 (memory, kafka)
    pub backend: String,
    /// Kafka 부트스트랩 서버
    pub bootstrap_servers: String,
    /// 입력 토픽
    pub topic: String,
    /// 데드레터 토픽
    pub dead_letter_topic: String,
    /// 컨슈머 그룹 ID
    pub consumer_group: String,
    /// 파티션 수 (memory 백엔드)
    pub partitions: u32,
    /// 메시지당 로컬 시도 횟수
    pub max_retries: u32,
    /// 일시 장애 메시지의 최대 재전달 횟수
    pub max_redeliveries: u32,
    /// 재시도 간격 기준값 (밀리초, 시도 횟수에 비례)
    pub retry_backoff_ms: u64,
    /// 메시지 처리 타임아웃 (밀리초)
    pub message_timeout_ms: u64,
    /// 오프셋 초기화 정책 (earliest, latest)
    pub auto_offset_reset: String,
}

impl QueueConfig {
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            bootstrap_servers: "localhost:9092".to_owned(),
            topic: "security-events".to_owned(),
            dead_letter_topic: "security-events-dlq".to_owned(),
            consumer_group: "graphwarden-consumer".to_owned(),
            partitions: 4,
            max_retries: 3,
            max_redeliveries: 5,
            retry_backoff_ms: 200,
            message_timeout_ms: 10_000,
            auto_offset_reset: "earliest".to_owned(),
        }
    }
}

/// 수집 경로 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// CLI에서 `--mode`가 없을 때 사용할 모드 (direct, queued)
    pub default_mode: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_mode: "direct".to_owned(),
        }
    }
}

/// 탐지 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 룰 파일 또는 디렉토리 경로
    pub rules_path: String,
    /// 동시에 실행할 최대 룰 수
    pub max_concurrent_rules: usize,
    /// 룰 실행 타임아웃 (초)
    pub rule_timeout_secs: u64,
    /// 활성 룰 스냅샷 캐시 유효 시간 (초)
    pub refresh_interval_secs: u64,
    /// 알림 중복 제거 윈도우 (초, 0이면 비활성화)
    pub dedup_window_secs: u64,
}

impl DetectionConfig {
    pub fn rule_timeout(&self) -> Duration {
        Duration::from_secs(self.rule_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            rules_path: "config/detection_rules.json".to_owned(),
            max_concurrent_rules: 8,
            rule_timeout_secs: 30,
            refresh_interval_secs: 30,
            dedup_window_secs: 0,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
