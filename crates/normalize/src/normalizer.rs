//! 정규화 파사드 -- detect → parse → map → validate
//!
//! Direct 모드의 라우터와 큐 컨슈머가 같은 [`Normalizer`]를 공유하므로
//! 두 경로의 매핑 결과는 항상 동일합니다.

use graphwarden_core::config::SchemaConfig;
use graphwarden_core::error::GraphwardenError;
use graphwarden_core::metrics as m;

use crate::detect::FormatDetector;
use crate::error::NormalizeError;
use crate::mapper::{MappedEvent, OcsfMapper, SeverityPolicy};
use crate::parser::ParserRegistry;
use crate::schema::SchemaRegistry;

/// 정규화 파이프라인
pub struct Normalizer {
    detector: FormatDetector,
    parsers: ParserRegistry,
    mapper: OcsfMapper,
}

impl Normalizer {
    /// 구성 요소를 직접 지정하여 생성합니다.
    ///
    /// 감지기는 파서 레지스트리에 등록된 포맷의 힌트만 신뢰합니다.
    pub fn new(parsers: ParserRegistry, mapper: OcsfMapper) -> Self {
        Self {
            detector: FormatDetector::new(parsers.registered_formats()),
            parsers,
            mapper,
        }
    }

    /// 스키마 설정으로 생성합니다.
    ///
    /// `schema_path`가 지정되면 해당 디렉토리의 추가 스키마 정의를 로드합니다.
    pub async fn from_config(config: &SchemaConfig) -> Result<Self, GraphwardenError> {
        let policy: SeverityPolicy = config.severity_policy.parse()?;
        let mut registry = SchemaRegistry::new(config.version.clone());
        if !config.schema_path.is_empty() {
            let loaded = registry.load_directory(&config.schema_path).await?;
            tracing::info!(path = %config.schema_path, loaded, "schema definitions loaded");
        }

        Ok(Self::new(
            ParserRegistry::with_defaults(config.max_input_size),
            OcsfMapper::new(registry, policy),
        ))
    }

    pub fn schema_version(&self) -> &str {
        self.mapper.registry().version()
    }

    pub fn mapper(&self) -> &OcsfMapper {
        &self.mapper
    }

    /// 원시 입력을 정규 이벤트로 변환합니다.
    ///
    /// 실패 시 부분 결과 없이 타입이 지정된 에러를 반환합니다.
    pub fn normalize(&self, raw: &[u8], hint: Option<&str>) -> Result<MappedEvent, NormalizeError> {
        let result = self.run(raw, hint);
        match &result {
            Ok(mapped) => {
                metrics::counter!(m::EVENTS_NORMALIZED_TOTAL, m::LABEL_FORMAT => mapped.format.as_str())
                    .increment(1);
            }
            Err(e) => {
                metrics::counter!(m::NORMALIZE_ERRORS_TOTAL, m::LABEL_KIND => e.kind().as_str())
                    .increment(1);
                tracing::debug!(error = %e, kind = %e.kind(), "normalization failed");
            }
        }
        result
    }

    fn run(&self, raw: &[u8], hint: Option<&str>) -> Result<MappedEvent, NormalizeError> {
        let format = self.detector.detect(raw, hint)?;
        let fields = self.parsers.parse(format, raw)?;
        let mapped = self.mapper.map(fields, format)?;
        Ok(mapped)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(
            ParserRegistry::with_defaults(crate::parser::DEFAULT_MAX_INPUT_SIZE),
            OcsfMapper::new(SchemaRegistry::new("1.0.0"), SeverityPolicy::Clamp),
        )
    }
}
